//! Dashboard application entry point

use eframe::egui;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::app::ScannerApp;
use crate::dashboard::state::DashboardState;
use crate::dashboard::theme;
use crate::dashboard::views::render_scanner_view;
use crate::pipeline::PipelineState;
use crate::shared::SharedAppState;

/// Repaint interval while the camera preview is live
const PREVIEW_REPAINT: Duration = Duration::from_millis(66);
/// Repaint interval otherwise, to pick up driver snapshots
const IDLE_REPAINT: Duration = Duration::from_millis(250);

/// The main dashboard application
pub struct DashboardApp {
    /// Pipeline coordinator
    scanner: ScannerApp,
    /// Shared application state
    shared_state: Arc<RwLock<SharedAppState>>,
    /// Dashboard-specific state
    dashboard_state: DashboardState,
    /// Whether theme has been applied
    theme_applied: bool,
}

impl DashboardApp {
    /// Create a new dashboard application
    pub fn new(scanner: ScannerApp) -> Self {
        Self {
            shared_state: scanner.state(),
            scanner,
            dashboard_state: DashboardState::default(),
            theme_applied: false,
        }
    }

    /// Create eframe options for the dashboard window
    pub fn options(width: f32, height: f32) -> eframe::NativeOptions {
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([width, height])
                .with_min_inner_size([480.0, 400.0])
                .with_title("Tire Size Scanner"),
            ..Default::default()
        }
    }

    /// Forward the command queued by the view, if any
    fn process_commands(&mut self) {
        let command = {
            let mut state = self.shared_state.write();
            state.runtime.pending_command.take()
        };

        if let Some(command) = command {
            debug!(?command, "Forwarding UI command");
            self.scanner.send(command);
        }
    }

    /// Surface a driver thread that died while the window is open
    fn check_driver_status(&mut self) {
        if self.scanner.is_driver_running() {
            return;
        }
        let mut state = self.shared_state.write();
        if state.runtime.last_error.is_none() {
            state
                .runtime
                .set_error("Scanner stopped unexpectedly. Please restart.");
        }
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply theme once
        if !self.theme_applied {
            theme::apply_theme(ctx);
            self.theme_applied = true;
        }

        self.process_commands();
        self.check_driver_status();

        let live_preview = self.shared_state.read().snapshot.state == PipelineState::SessionOpen;
        let live = if live_preview {
            self.scanner.live_frame()
        } else {
            None
        };

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none().inner_margin(24.0).show(ui, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    render_scanner_view(ui, &mut self.dashboard_state, &self.shared_state, live);
                });
            });
        });

        // Driver updates arrive off the UI thread
        ctx.request_repaint_after(if live_preview {
            PREVIEW_REPAINT
        } else {
            IDLE_REPAINT
        });
    }
}

/// Run the dashboard application
pub fn run_dashboard(scanner: ScannerApp, width: f32, height: f32) -> Result<(), eframe::Error> {
    let app = DashboardApp::new(scanner);
    eframe::run_native(
        "Tire Size Scanner",
        DashboardApp::options(width, height),
        Box::new(|_cc| Ok(Box::new(app))),
    )
}
