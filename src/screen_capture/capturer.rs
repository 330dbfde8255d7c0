use super::{rgba_from_bgra, BgraBuffer, ScreenSize};
use image::RgbaImage;
use log::{debug, error, info};
use scrap::{Capturer, Display};
use std::io::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No primary display found: {0}")]
    NoDisplay(String),
    #[error("Failed to initialize capture: {0}")]
    InitError(String),
    #[error("Frame not ready and no previous frame to reuse")]
    NotReady,
    #[error("Failed to grab frame: {0}")]
    FrameError(String),
    #[error("Malformed frame buffer: {width}x{height} from {len} bytes")]
    BadFrame { width: u32, height: u32, len: usize },
}

/// The screen being recorded.
///
/// Shared across threads; pixel access goes through a [`FrameSource`] opened on the
/// thread that will use it, since platform capturers are usually bound to their thread.
pub trait ScreenSource: Send + Sync {
    fn size(&self) -> Result<ScreenSize, CaptureError>;
    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError>;
}

pub trait FrameSource {
    /// Full-screen snapshot at call time.
    fn snapshot(&mut self) -> Result<RgbaImage, CaptureError>;
}

/// Primary display captured through `scrap`.
#[derive(Debug, Default)]
pub struct ScrapScreen;

impl ScrapScreen {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenSource for ScrapScreen {
    fn size(&self) -> Result<ScreenSize, CaptureError> {
        let display = primary_display()?;
        let size = ScreenSize::new(display.width() as u32, display.height() as u32);
        debug!("Primary display dimensions: {}x{}", size.width, size.height);
        Ok(size)
    }

    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        let mut source = ScrapFrameSource {
            capturer: None,
            size: ScreenSize::default(),
            last: None,
        };
        source.init()?;
        Ok(Box::new(source))
    }
}

struct ScrapFrameSource {
    capturer: Option<Capturer>,
    size: ScreenSize,
    last: Option<RgbaImage>,
}

impl ScrapFrameSource {
    fn init(&mut self) -> Result<(), CaptureError> {
        let display = primary_display()?;
        self.size = ScreenSize::new(display.width() as u32, display.height() as u32);
        let capturer =
            Capturer::new(display).map_err(|e| CaptureError::InitError(e.to_string()))?;
        info!("Screen capturer ready at {}x{}", self.size.width, self.size.height);
        self.capturer = Some(capturer);
        Ok(())
    }

    fn reset_capture(&mut self) {
        self.capturer = None;
    }
}

impl FrameSource for ScrapFrameSource {
    fn snapshot(&mut self) -> Result<RgbaImage, CaptureError> {
        if self.capturer.is_none() {
            self.init()?;
        }
        let Some(capturer) = self.capturer.as_mut() else {
            return Err(CaptureError::NotReady);
        };

        let grabbed = capturer.frame().map(|raw_frame| -> BgraBuffer { raw_frame.to_vec() });

        match grabbed {
            Ok(raw) => {
                let image = rgba_from_bgra(&raw, self.size.width, self.size.height)?;
                self.last = Some(image.clone());
                Ok(image)
            }
            Err(e) => match e.kind() {
                // The screen has not changed since the previous grab.
                ErrorKind::WouldBlock => {
                    debug!("Frame not ready; reusing previous snapshot.");
                    self.last.clone().ok_or(CaptureError::NotReady)
                }
                ErrorKind::ConnectionReset => {
                    error!("Capture reset: {e}. Reinitializing capturer on next tick.");
                    self.reset_capture();
                    Err(CaptureError::FrameError(e.to_string()))
                }
                _ => Err(CaptureError::FrameError(e.to_string())),
            },
        }
    }
}

fn primary_display() -> Result<Display, CaptureError> {
    Display::primary().map_err(|e| CaptureError::NoDisplay(e.to_string()))
}
