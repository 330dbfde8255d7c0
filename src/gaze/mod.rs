mod trail;
pub mod udp;

pub use trail::{GazeTrail, TrailSnapshot};
pub use udp::UdpGazeDevice;

pub use crate::common::GazeSample;

use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Gaze device unavailable: {0}")]
    Unavailable(String),
    #[error("Gaze device I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Gaze stream thread panicked")]
    StreamPanicked,
}

/// Filtering applied by the device before samples are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeDataMode {
    #[default]
    LightlyFiltered,
    Unfiltered,
}

/// An eye tracker that can be subscribed to for the length of one session.
pub trait GazeDevice: Send + Sync {
    /// Acquires the device and starts delivering samples into `samples`.
    ///
    /// Samples arrive one at a time, in device order, from a thread owned by the
    /// stream. Dropping the sender without a `close` call means the device went away.
    fn open_stream(
        &self,
        mode: GazeDataMode,
        samples: Sender<GazeSample>,
    ) -> Result<Box<dyn GazeStream>, DeviceError>;
}

/// A live subscription. No sample is sent after `close` returns.
pub trait GazeStream: Send {
    fn close(self: Box<Self>) -> Result<(), DeviceError>;
}
