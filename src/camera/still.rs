//! Still-image camera
//!
//! Serves one picture from disk as if it were a live stream. Handy for
//! running the scanner on saved sidewall photos or on machines without a
//! camera.

use async_trait::async_trait;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{CameraBackend, DeviceAccessError, FacingMode, VideoStream};

pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraBackend for StillImageCamera {
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn VideoStream>, DeviceAccessError> {
        debug!(%facing, "Facing mode has no effect on a still image");

        let path = self.path.clone();
        let decoded = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| DeviceAccessError::Stream(e.into()))?;

        let image = decoded.map_err(|e| DeviceAccessError::Unavailable {
            facing,
            reason: format!("cannot load {}: {}", self.path.display(), e),
        })?;

        info!(
            "Serving {} ({}x{}) as camera stream",
            self.path.display(),
            image.width(),
            image.height()
        );

        Ok(Box::new(StillStream {
            frame: Some(Arc::new(image.to_rgba8())),
        }))
    }
}

struct StillStream {
    frame: Option<Arc<RgbaImage>>,
}

impl VideoStream for StillStream {
    fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        self.frame.clone()
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}
