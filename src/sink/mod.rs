//! Output files of a recording session: the encoded video and the gaze log.

mod gaze_log;
mod video_recorder;

pub use gaze_log::{log_path_for, CsvGazeLog, LogSink, LOG_HEADER};
pub use video_recorder::{FfmpegVideoSink, VideoSink};

use crate::common::ScreenSize;
use crate::config::RecordingConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Cannot open {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to start encoder: {0}")]
    Spawn(std::io::Error),
    #[error("Frame is {got_width}x{got_height}, encoder expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("Write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("Encoder exited with {status}: {stderr}")]
    Encoder { status: String, stderr: String },
}

/// Opens the two sinks of a session.
pub trait SinkFactory: Send + Sync {
    fn open_video(&self, path: &Path, size: ScreenSize) -> Result<Box<dyn VideoSink>, SinkError>;
    fn open_log(&self, path: &Path) -> Result<Box<dyn LogSink>, SinkError>;
}

/// Real files: ffmpeg for video, CSV for gaze.
pub struct FileSinks {
    config: RecordingConfig,
}

impl FileSinks {
    pub fn new(config: RecordingConfig) -> Self {
        Self { config }
    }
}

impl SinkFactory for FileSinks {
    fn open_video(&self, path: &Path, size: ScreenSize) -> Result<Box<dyn VideoSink>, SinkError> {
        Ok(Box::new(FfmpegVideoSink::open(path, size, &self.config)?))
    }

    fn open_log(&self, path: &Path) -> Result<Box<dyn LogSink>, SinkError> {
        Ok(Box::new(CsvGazeLog::create(path)?))
    }
}
