//! Shared application state between the dashboard and the pipeline driver

use crate::pipeline::PipelineSnapshot;
use crate::shared::UiCommand;

/// Central shared state between dashboard and driver thread
#[derive(Debug, Clone, Default)]
pub struct SharedAppState {
    /// Latest pipeline snapshot published by the driver
    pub snapshot: PipelineSnapshot,
    /// Runtime state (not persisted)
    pub runtime: RuntimeState,
}

impl SharedAppState {
    /// Queue a command for the dashboard loop to forward. A newer command
    /// replaces one that was not yet forwarded.
    pub fn request(&mut self, command: UiCommand) {
        self.runtime.pending_command = Some(command);
    }
}

/// Runtime state that is not persisted
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Whether the driver thread is running
    pub is_driver_running: bool,
    /// Number of snapshots received from the driver
    pub snapshots_received: u64,
    /// Pending command from UI
    pub pending_command: Option<UiCommand>,
    /// Last shell-level error message (if any)
    pub last_error: Option<String>,
}

impl RuntimeState {
    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
