//! Wavefront OBJ loading.
//!
//! Only geometry is extracted: `v` records become vertices and `f` records
//! become faces, fan-triangulated when they carry more than three corners.
//! Object and group boundaries are ignored so multi-object exports collapse
//! into one coherent face soup. Normals, texture coordinates, and material
//! statements are skipped.

use std::io::BufRead;

use nalgebra::Point3;

use crate::{MeshError, Triangle};

/// Parse OBJ geometry from a reader into a triangle soup.
pub fn parse_obj<R: BufRead>(reader: R) -> Result<Vec<Triangle>, MeshError> {
    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut triangles: Vec<Triangle> = Vec::new();

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_index + 1;
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let mut coord = [0.0_f64; 3];
                for slot in &mut coord {
                    let field = fields.next().ok_or_else(|| MeshError::Parse {
                        line: line_no,
                        message: "vertex record with fewer than 3 coordinates".into(),
                    })?;
                    *slot = field.parse().map_err(|_| MeshError::Parse {
                        line: line_no,
                        message: format!("invalid vertex coordinate '{}'", field),
                    })?;
                }
                vertices.push(Point3::new(coord[0], coord[1], coord[2]));
            }
            Some("f") => {
                let mut corners: Vec<Point3<f64>> = Vec::with_capacity(4);
                for field in fields {
                    let index = parse_face_index(field, vertices.len(), line_no)?;
                    corners.push(vertices[index]);
                }
                if corners.len() < 3 {
                    return Err(MeshError::Parse {
                        line: line_no,
                        message: "face record with fewer than 3 vertices".into(),
                    });
                }
                // Fan triangulation from the first corner
                for i in 1..corners.len() - 1 {
                    triangles.push(Triangle::new(corners[0], corners[i], corners[i + 1]));
                }
            }
            // o/g/s/vn/vt/usemtl/mtllib, comments, blank lines
            _ => {}
        }
    }

    Ok(triangles)
}

/// Resolve a face corner reference (`i`, `i/t`, `i//n`, or `i/t/n`) to a
/// zero-based vertex index. OBJ indices are one-based; negative indices
/// count back from the most recent vertex.
fn parse_face_index(field: &str, vertex_count: usize, line_no: usize) -> Result<usize, MeshError> {
    let index_part = field.split('/').next().unwrap_or(field);
    let raw: i64 = index_part.parse().map_err(|_| MeshError::Parse {
        line: line_no,
        message: format!("invalid face index '{}'", field),
    })?;

    let resolved = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        vertex_count as i64 + raw
    } else {
        -1
    };
    if resolved < 0 || resolved >= vertex_count as i64 {
        return Err(MeshError::Parse {
            line: line_no,
            message: format!("face index '{}' out of range", field),
        });
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_triangles() {
        let src = "\
# a single face
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
";
        let tris = parse_obj(Cursor::new(src)).unwrap();
        assert_eq!(tris.len(), 1);
        assert_eq!(tris[0].b, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_quad_is_fan_triangulated() {
        let src = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";
        let tris = parse_obj(Cursor::new(src)).unwrap();
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn test_slash_and_negative_indices() {
        let src = "\
v 0 0 0
v 1 0 0
v 0 1 0
f 1/1/1 2//2 -1
";
        let tris = parse_obj(Cursor::new(src)).unwrap();
        assert_eq!(tris.len(), 1);
        assert_eq!(tris[0].c, Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_multiple_objects_merge() {
        let src = "\
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 5
v 1 0 5
v 0 1 5
f 4 5 6
";
        let tris = parse_obj(Cursor::new(src)).unwrap();
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn test_bad_vertex_is_rejected() {
        let err = parse_obj(Cursor::new("v 0 zero 0\n")).unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let src = "v 0 0 0\nf 1 2 3\n";
        let err = parse_obj(Cursor::new(src)).unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 2, .. }));
    }
}
