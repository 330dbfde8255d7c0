use super::SinkError;
use crate::common::GazeSample;
use log::info;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

pub const LOG_HEADER: &str = "Timestamp,GazeX,GazeY";

pub trait LogSink: Send {
    fn write_sample(&mut self, sample: &GazeSample) -> Result<(), SinkError>;
    fn close(self: Box<Self>) -> Result<(), SinkError>;
}

/// The gaze log sits next to the video, sharing its file stem.
pub fn log_path_for(video_path: &Path, extension: &str) -> PathBuf {
    video_path.with_extension(extension)
}

/// Comma separated gaze log, one row per sample in arrival order.
///
/// Numbers use Rust's float formatting, which always writes `.` as the decimal
/// point whatever the host locale says.
pub struct CsvGazeLog {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvGazeLog {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let open_err = |source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(open_err)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", LOG_HEADER).map_err(open_err)?;
        info!("Gaze log opened at {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    fn format_row(sample: &GazeSample) -> String {
        format!("{},{},{}\n", sample.timestamp, sample.x, sample.y)
    }
}

impl LogSink for CsvGazeLog {
    fn write_sample(&mut self, sample: &GazeSample) -> Result<(), SinkError> {
        // Whole row in one write so a failure never leaves half a row behind.
        self.writer.write_all(Self::format_row(sample).as_bytes())?;
        self.rows += 1;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        info!("Gaze log {:?} closed with {} rows", self.path, self.rows);
        Ok(())
    }
}
