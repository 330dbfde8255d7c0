use serde::{Deserialize, Serialize};

pub type BgraBuffer = Vec<u8>;
pub type RgbaBuffer = Vec<u8>;

/// Pixel dimensions of the captured screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn to_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One observation from the eye tracker.
///
/// `timestamp` is passed through exactly as the device reported it; the unit
/// belongs to the device. Coordinates are screen space and are never clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
}

impl GazeSample {
    pub fn new(timestamp: f64, x: f64, y: f64) -> Self {
        Self { timestamp, x, y }
    }

    pub fn point(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}
