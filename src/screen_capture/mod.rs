mod capturer;
mod frame;

pub use capturer::{CaptureError, FrameSource, ScrapScreen, ScreenSource};
pub use frame::rgba_from_bgra;

// Common types used by both modules
pub(crate) use crate::common::{BgraBuffer, RgbaBuffer, ScreenSize};
