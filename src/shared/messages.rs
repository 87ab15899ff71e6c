//! Message types sent from the dashboard to the pipeline driver

/// A user request, queued by the dashboard and applied by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    /// Open the camera
    OpenCamera,
    /// Take a still and recognize it
    Capture,
    /// Discard the current picture and reopen the camera
    Reset,
    /// Stop the driver and release the camera
    Shutdown,
}
