//! Application Coordinator
//!
//! Runs the pipeline driver on its own thread and mirrors its snapshots
//! into the shared state the dashboard renders from. [`scan_once`] drives
//! the same pipeline without a window.

use anyhow::{Context, Result};
use image::RgbaImage;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::camera::{FacingMode, SessionManager};
use crate::pipeline::{PipelineDriver, PipelineSnapshot, PipelineState};
use crate::shared::{SharedAppState, UiCommand};
use crate::vision::RecognitionAdapter;

/// Main application coordinator
pub struct ScannerApp {
    /// Shared state between dashboard and driver
    shared_state: Arc<RwLock<SharedAppState>>,
    /// Camera sessions, for live previews
    sessions: Arc<SessionManager>,
    /// Channel to send commands to the driver
    commands: mpsc::UnboundedSender<UiCommand>,
    /// Stops the driver even if the command channel is backed up
    shutdown: CancellationToken,
    /// Handle to driver thread
    driver_handle: Option<JoinHandle<()>>,
}

impl ScannerApp {
    /// Start the pipeline driver in a background thread
    pub fn start(
        shared_state: Arc<RwLock<SharedAppState>>,
        sessions: Arc<SessionManager>,
        recognizer: Arc<RecognitionAdapter>,
        facing: FacingMode,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build pipeline runtime")?;

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let driver = PipelineDriver::new(sessions.clone(), recognizer, facing);

        shared_state.write().runtime.is_driver_running = true;
        let state = shared_state.clone();
        let token = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("pipeline-driver".to_string())
            .spawn(move || {
                info!("Pipeline thread starting...");
                runtime.block_on(driver.run(commands_rx, token, |snapshot| {
                    let mut state = state.write();
                    state.snapshot = snapshot;
                    state.runtime.snapshots_received += 1;
                }));
                state.write().runtime.is_driver_running = false;
                info!("Pipeline thread exiting...");
            })
            .context("Failed to spawn pipeline thread")?;

        info!(%facing, "Pipeline started in background thread");

        Ok(Self {
            shared_state,
            sessions,
            commands,
            shutdown,
            driver_handle: Some(handle),
        })
    }

    /// Forward a command to the driver
    pub fn send(&self, command: UiCommand) {
        if self.commands.send(command).is_err() {
            warn!(?command, "Pipeline driver is not running");
            self.shared_state
                .write()
                .runtime
                .set_error("Scanner stopped unexpectedly. Please restart.");
        }
    }

    /// Newest frame of the live camera stream
    pub fn live_frame(&self) -> Option<Arc<RgbaImage>> {
        self.sessions.latest_frame()
    }

    /// Get current shared state
    pub fn state(&self) -> Arc<RwLock<SharedAppState>> {
        self.shared_state.clone()
    }

    /// Check if the driver thread is running
    pub fn is_driver_running(&self) -> bool {
        self.driver_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ScannerApp {
    fn drop(&mut self) {
        // Signal driver to stop
        let _ = self.commands.send(UiCommand::Shutdown);
        self.shutdown.cancel();

        // Wait for driver thread to finish
        if let Some(handle) = self.driver_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Open the camera, capture one picture as soon as the stream is ready and
/// wait for the result. The camera is closed before returning.
pub async fn scan_once(
    sessions: Arc<SessionManager>,
    recognizer: Arc<RecognitionAdapter>,
    facing: FacingMode,
    ready_timeout: Duration,
) -> PipelineSnapshot {
    let mut driver = PipelineDriver::new(sessions, recognizer, facing);
    driver.handle_command(UiCommand::OpenCamera);

    let ready = tokio::time::timeout(
        ready_timeout,
        driver.run_until(|s| s.can_capture || (!s.opening && s.state == PipelineState::Idle)),
    )
    .await;

    let snapshot = match ready {
        Ok(snapshot) if snapshot.can_capture => {
            driver.handle_command(UiCommand::Capture);
            // Recognition carries its own timeout
            driver.run_until(|s| !s.is_processing()).await
        }
        Ok(snapshot) => snapshot,
        Err(_) => {
            error!("Camera produced no frame within {:?}", ready_timeout);
            driver.snapshot()
        }
    };

    driver.shutdown();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::MockCamera;
    use crate::pipeline::ErrorKind;
    use crate::vision::mock::MockOcr;
    use std::time::Instant;

    fn wait_for(state: &Arc<RwLock<SharedAppState>>, pred: impl Fn(&SharedAppState) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pred(&state.read()) {
            assert!(Instant::now() < deadline, "timed out waiting for pipeline");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_scan_through_driver_thread() {
        let camera = Arc::new(MockCamera::with_frame(16, 16));
        let ocr = Arc::new(MockOcr::new());
        ocr.push_text("205/55R16");
        let state = Arc::new(RwLock::new(SharedAppState::default()));
        let sessions = Arc::new(SessionManager::new(camera.clone()));
        let recognizer = Arc::new(RecognitionAdapter::new(ocr, Duration::from_secs(5)));

        let app = ScannerApp::start(state.clone(), sessions, recognizer, FacingMode::Environment)
            .unwrap();
        assert!(state.read().runtime.is_driver_running);

        app.send(UiCommand::OpenCamera);
        wait_for(&state, |s| s.snapshot.can_capture);
        assert!(app.live_frame().is_some());

        app.send(UiCommand::Capture);
        wait_for(&state, |s| s.snapshot.tire_size().is_some());
        assert!(state.read().runtime.snapshots_received > 1);

        app.send(UiCommand::Reset);
        wait_for(&state, |s| s.snapshot.can_capture);
        assert_eq!(state.read().snapshot.state, PipelineState::SessionOpen);

        drop(app);
        assert!(!state.read().runtime.is_driver_running);
        assert_eq!(camera.stops(), 2);
    }

    fn pipeline(
        camera: &Arc<MockCamera>,
        ocr: &Arc<MockOcr>,
    ) -> (Arc<SessionManager>, Arc<RecognitionAdapter>) {
        let sessions = Arc::new(SessionManager::new(camera.clone()));
        let recognizer = Arc::new(RecognitionAdapter::new(ocr.clone(), Duration::from_secs(5)));
        (sessions, recognizer)
    }

    #[tokio::test]
    async fn test_scan_once_resolves() {
        let camera = Arc::new(MockCamera::with_frame(16, 16));
        let ocr = Arc::new(MockOcr::new());
        ocr.push_text("MICHELIN  205/55R16 91V");
        let (sessions, recognizer) = pipeline(&camera, &ocr);

        let snapshot = scan_once(
            sessions.clone(),
            recognizer,
            FacingMode::Environment,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(snapshot.tire_size().map(|size| size.as_str()), Some("205/55R16"));
        assert!(!sessions.is_open());
    }

    #[tokio::test]
    async fn test_scan_once_reports_denied_camera() {
        let camera = Arc::new(MockCamera::denied());
        let ocr = Arc::new(MockOcr::new());
        let (sessions, recognizer) = pipeline(&camera, &ocr);

        let snapshot =
            scan_once(sessions, recognizer, FacingMode::User, Duration::from_secs(5)).await;

        assert_eq!(snapshot.state, PipelineState::Idle);
        assert_eq!(snapshot.error, Some(ErrorKind::DeviceAccess));
        assert_eq!(camera.last_facing(), Some(FacingMode::User));
        assert_eq!(ocr.calls(), 0);
    }

    #[tokio::test]
    async fn test_scan_once_gives_up_without_frames() {
        let camera = Arc::new(MockCamera::without_frames());
        let ocr = Arc::new(MockOcr::new());
        let (sessions, recognizer) = pipeline(&camera, &ocr);

        let snapshot = scan_once(
            sessions.clone(),
            recognizer,
            FacingMode::Environment,
            Duration::from_millis(300),
        )
        .await;

        assert_eq!(snapshot.state, PipelineState::SessionOpen);
        assert!(snapshot.tire_size().is_none());
        assert_eq!(ocr.calls(), 0);
        assert!(!sessions.is_open());
    }
}
