//! Screen recording with an eye-gaze overlay and a synchronized gaze log.
//!
//! A [`Recorder`] captures the primary screen on a fixed clock, draws the recent
//! gaze trail onto every frame and hands it to a video encoder, while every gaze
//! sample the tracker reports is appended to a CSV file next to the video.

pub mod common;
pub mod config;
pub mod frame_clock;
pub mod gaze;
pub mod overlay;
pub mod recorder;
pub mod screen_capture;
pub mod sink;

pub use common::{GazeSample, ScreenSize};
pub use config::Config;
pub use recorder::{Recorder, RecorderError, SessionSummary};
