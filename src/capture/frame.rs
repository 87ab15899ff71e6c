//! Still frames captured from the camera stream

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Identity of one captured frame. Recognition results are matched back
/// to the pipeline by this id, never by arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FrameId(Uuid);

impl FrameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An immutable snapshot of the live stream
pub struct CapturedFrame {
    id: FrameId,
    /// Raw RGBA pixel data at the stream's native size
    image: RgbaImage,
    /// Lossless PNG encoding of `image`
    png: Vec<u8>,
    /// Timestamp when frame was captured
    timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(image: RgbaImage, png: Vec<u8>) -> Self {
        Self {
            id: FrameId::new(),
            image,
            png,
            timestamp: Instant::now(),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// `data:image/png;base64,...` form of the frame
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("id", &self.id)
            .field("dimensions", &self.dimensions())
            .field("png_bytes", &self.png.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
