//! CSV flight log.
//!
//! One row per completed sampling tick, in the field order downstream
//! analysis notebooks expect: timestamp, geodetic position, distance, LOS
//! flag, RSSI, and the packet-success flag. The writer is buffered and
//! must be flushed on every exit path; the driver owns that guarantee.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ulsim_common::time;

/// Column header row.
const HEADER: &str = "timestamp,lat,lon,alt,dist_m,los,rssi_dbm,pdr_success";

/// One link-quality sample, immutable once created.
#[derive(Debug, Clone)]
pub struct LinkSample {
    /// ISO 8601 UTC timestamp of the telemetry fix.
    pub timestamp: String,
    /// Vehicle latitude in degrees.
    pub latitude: f64,
    /// Vehicle longitude in degrees.
    pub longitude: f64,
    /// Vehicle altitude in meters.
    pub altitude_m: f64,
    /// Slant distance gateway-to-vehicle in meters.
    pub distance_m: f64,
    /// Whether the straight path was unobstructed.
    pub los: bool,
    /// Sampled received signal strength in dBm.
    pub rssi_dbm: f64,
    /// Whether the sample cleared the receiver sensitivity.
    pub packet_received: bool,
}

/// Append-only CSV sink for link samples.
pub struct FlightLog<W: Write> {
    writer: W,
}

impl FlightLog<BufWriter<File>> {
    /// Create a timestamped log file `flight_<stamp>.csv` under `dir`,
    /// creating the directory if needed. Returns the log and its path.
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<(Self, PathBuf)> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "flight_{}.csv",
            time::filename_stamp(SystemTime::now())
        ));
        let file = File::create(&path)?;
        Ok((Self::new(BufWriter::new(file))?, path))
    }
}

impl<W: Write> FlightLog<W> {
    /// Wrap a writer and emit the header row.
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "{}", HEADER)?;
        Ok(FlightLog { writer })
    }

    /// Append one complete sample.
    pub fn append(&mut self, sample: &LinkSample) -> io::Result<()> {
        writeln!(
            self.writer,
            "{},{},{},{},{:.2},{},{:.2},{}",
            sample.timestamp,
            sample.latitude,
            sample.longitude,
            sample.altitude_m,
            sample.distance_m,
            sample.los,
            sample.rssi_dbm,
            sample.packet_received,
        )
    }

    /// Flush buffered rows to the underlying sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
