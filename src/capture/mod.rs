//! Frame Capture Layer
//!
//! Rasterizes the newest frame of the live camera stream into a static,
//! PNG-encoded snapshot that the recognizer can consume.

pub mod frame;

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

use crate::camera::CameraSession;

pub use frame::{CapturedFrame, FrameId};

/// Frame could not be captured
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The stream has not decoded a usable frame yet
    #[error("camera stream has no frame available yet")]
    NotReady,
    /// Pixel data could not be encoded
    #[error("failed to encode captured frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Snapshots the live stream of a camera session
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCapturer;

impl FrameCapturer {
    pub fn new() -> Self {
        Self
    }

    /// Take a still of the session's current frame at its native size.
    ///
    /// Fails with [`CaptureError::NotReady`] if the stream has not produced
    /// a frame, or produced one with zero width or height.
    pub fn capture(&self, session: &CameraSession) -> Result<CapturedFrame, CaptureError> {
        let live = session.latest_frame().ok_or(CaptureError::NotReady)?;
        self.snapshot(&live)
    }

    /// Copy and encode a decoded frame
    pub fn snapshot(&self, live: &RgbaImage) -> Result<CapturedFrame, CaptureError> {
        let (width, height) = live.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::NotReady);
        }

        let image = live.clone();
        let png = encode_png(&image)?;
        debug!(width, height, png_bytes = png.len(), "Frame captured");

        Ok(CapturedFrame::new(image, png))
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
