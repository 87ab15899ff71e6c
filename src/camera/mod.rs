//! Camera Session Layer
//!
//! Owns the lifecycle of the single live camera stream. Backends only
//! know how to acquire a stream; the [`SessionManager`] decides when one
//! is opened or closed and guarantees that at most one exists.

pub mod ffmpeg;
#[cfg(test)]
pub mod mock;
pub mod still;

use async_trait::async_trait;
use image::RgbaImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use ffmpeg::FfmpegCamera;
pub use still::StillImageCamera;

/// Camera selection hint
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear-facing camera, pointed away from the user
    #[default]
    Environment,
    /// Front-facing camera
    User,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Environment => f.write_str("environment"),
            FacingMode::User => f.write_str("user"),
        }
    }
}

/// Camera could not be acquired
#[derive(Debug, Error)]
pub enum DeviceAccessError {
    /// The platform refused access to the device
    #[error("camera access denied for {device}")]
    PermissionDenied { device: String },
    /// No usable device for the requested facing mode
    #[error("no {facing} camera available: {reason}")]
    Unavailable { facing: FacingMode, reason: String },
    /// The device opened but its stream could not be started
    #[error("camera stream failed to start: {0:#}")]
    Stream(anyhow::Error),
}

/// Session manager failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another `open` is still waiting on the hardware
    #[error("a camera session is already being opened")]
    OpenPending,
    #[error(transparent)]
    DeviceAccess(#[from] DeviceAccessError),
}

/// A live stream of decoded video frames
pub trait VideoStream: Send + Sync {
    /// Most recently decoded frame, if the stream has produced one yet
    fn latest_frame(&self) -> Option<Arc<RgbaImage>>;

    /// Stop the stream and release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Something that can hand out live camera streams
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Acquire a stream for the given facing mode.
    ///
    /// May suspend while the platform asks for permission or the device
    /// warms up.
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn VideoStream>, DeviceAccessError>;
}

/// Identity of an opened session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub facing: FacingMode,
}

/// An active camera stream, exclusively held by the [`SessionManager`]
pub struct CameraSession {
    id: Uuid,
    facing: FacingMode,
    stream: Box<dyn VideoStream>,
    open: bool,
}

impl CameraSession {
    fn new(facing: FacingMode, stream: Box<dyn VideoStream>) -> Self {
        Self {
            id: Uuid::new_v4(),
            facing,
            stream,
            open: true,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            facing: self.facing,
        }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether the stream has decoded at least one frame
    pub fn is_ready(&self) -> bool {
        self.open && self.stream.latest_frame().is_some()
    }

    pub fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        if self.open {
            self.stream.latest_frame()
        } else {
            None
        }
    }

    /// Stop the stream. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.stream.stop();
        self.open = false;
        info!(session = %self.id, "Camera session closed");
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Clears the pending-open flag however `open` exits, including when its
/// future is dropped mid-acquisition.
struct PendingOpen<'a>(&'a AtomicBool);

impl Drop for PendingOpen<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Close a session on the blocking pool. Stopping a stream can wait on a
/// device or a child process.
async fn release(session: Option<CameraSession>) {
    let Some(mut session) = session else {
        return;
    };
    let id = session.id;
    if let Err(e) = tokio::task::spawn_blocking(move || session.close()).await {
        warn!(session = %id, "Closing camera session failed: {}", e);
    }
}

/// Owns the single camera session
pub struct SessionManager {
    backend: Arc<dyn CameraBackend>,
    session: Mutex<Option<CameraSession>>,
    opening: AtomicBool,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            session: Mutex::new(None),
            opening: AtomicBool::new(false),
        }
    }

    /// Open a new session, closing any existing one first.
    ///
    /// A call made while another is still pending is rejected with
    /// [`SessionError::OpenPending`] without touching the hardware.
    pub async fn open(&self, facing: FacingMode) -> Result<SessionInfo, SessionError> {
        if self.opening.swap(true, Ordering::SeqCst) {
            warn!("Camera open requested while another open is pending");
            return Err(SessionError::OpenPending);
        }
        let _pending = PendingOpen(&self.opening);

        let previous = self.session.lock().take();
        release(previous).await;

        info!(%facing, "Requesting camera stream");
        let stream = self.backend.acquire(facing).await.map_err(|e| {
            error!("Error accessing the camera: {}", e);
            e
        })?;

        let session = CameraSession::new(facing, stream);
        let info = session.info();
        let stale = self.session.lock().replace(session);
        release(stale).await;

        info!(session = %info.id, %facing, "Camera session opened");
        Ok(info)
    }

    /// Close the current session, if any. Idempotent.
    pub fn close(&self) {
        let session = self.session.lock().take();
        match session {
            Some(mut session) => session.close(),
            None => debug!("Close requested with no open camera session"),
        }
    }

    #[cfg(test)]
    pub fn is_opening(&self) -> bool {
        self.opening.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.session.lock().as_ref().is_some_and(CameraSession::is_open)
    }

    pub fn is_ready(&self) -> bool {
        self.session.lock().as_ref().is_some_and(CameraSession::is_ready)
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<SessionInfo> {
        self.session.lock().as_ref().map(CameraSession::info)
    }

    /// Newest frame from the live stream, for previews
    pub fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        self.session.lock().as_ref().and_then(CameraSession::latest_frame)
    }

    /// Run `f` against the open session while holding it
    pub fn with_session<R>(&self, f: impl FnOnce(&CameraSession) -> R) -> Option<R> {
        self.session.lock().as_ref().map(f)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close();
    }
}
