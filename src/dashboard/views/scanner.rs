//! Scanner view - camera controls, picture and detected tire size

use egui::{RichText, Rounding, Vec2};
use image::RgbaImage;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::dashboard::components::StatusCard;
use crate::dashboard::state::{fit_width, DashboardState};
use crate::dashboard::theme::ThemeColors;
use crate::pipeline::{PipelineSnapshot, PipelineState};
use crate::shared::{SharedAppState, UiCommand};

/// Render the scanner view
pub fn render_scanner_view(
    ui: &mut egui::Ui,
    view_state: &mut DashboardState,
    shared_state: &Arc<RwLock<SharedAppState>>,
    live: Option<Arc<RgbaImage>>,
) {
    let (snapshot, shell_error) = {
        let state = shared_state.read();
        (state.snapshot.clone(), state.runtime.last_error.clone())
    };

    ui.heading(RichText::new("Tire Size Scanner").size(26.0).strong());
    ui.add_space(4.0);
    ui.label(
        RichText::new("Point the camera at the tire sidewall and capture a picture")
            .size(14.0)
            .color(ThemeColors::TEXT_SECONDARY),
    );

    ui.add_space(16.0);

    ui.horizontal(|ui| {
        StatusCard::camera(&snapshot).show(ui);
        ui.add_space(8.0);
        StatusCard::scan(&snapshot).show(ui);
    });

    ui.add_space(16.0);

    if let Some(command) = render_controls(ui, &snapshot) {
        shared_state.write().request(command);
    }

    ui.add_space(16.0);

    render_picture(ui, view_state, &snapshot, live);

    ui.add_space(12.0);

    if snapshot.is_processing() {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(
                RichText::new("Processing image...")
                    .size(16.0)
                    .color(ThemeColors::TEXT_SECONDARY),
            );
        });
    }

    for message in snapshot
        .error_message
        .map(str::to_string)
        .into_iter()
        .chain(shell_error)
    {
        ui.label(
            RichText::new(message)
                .size(16.0)
                .color(ThemeColors::ACCENT_ERROR),
        );
    }

    if let Some(size) = snapshot.tire_size() {
        ui.add_space(8.0);
        egui::Frame::none()
            .fill(ThemeColors::BG_MEDIUM)
            .rounding(Rounding::same(8.0))
            .inner_margin(16.0)
            .show(ui, |ui| {
                ui.label(
                    RichText::new(format!("Detected Tire Size: {}", size))
                        .size(28.0)
                        .color(ThemeColors::ACCENT_SUCCESS)
                        .strong(),
                );
                if let Some(dimensions) = snapshot.tire_dimensions {
                    ui.label(
                        RichText::new(dimensions.to_string())
                            .size(14.0)
                            .color(ThemeColors::TEXT_SECONDARY),
                    );
                }
            });
    }
}

/// Buttons for the current state; returns the clicked command
fn render_controls(ui: &mut egui::Ui, snapshot: &PipelineSnapshot) -> Option<UiCommand> {
    let mut clicked = None;

    ui.horizontal(|ui| match snapshot.state {
        PipelineState::Idle => {
            if primary_button(ui, "Open Camera", snapshot.can_open) {
                clicked = Some(UiCommand::OpenCamera);
            }
        }
        PipelineState::SessionOpen => {
            if primary_button(ui, "Capture Image", snapshot.can_capture) {
                clicked = Some(UiCommand::Capture);
            }
        }
        _ => {
            let close = ui.add_enabled(snapshot.can_reset, egui::Button::new("Close Picture"));
            if close.clicked() {
                clicked = Some(UiCommand::Reset);
            }
        }
    });

    clicked
}

fn primary_button(ui: &mut egui::Ui, label: &str, enabled: bool) -> bool {
    let button = egui::Button::new(RichText::new(label).color(ThemeColors::BG_DARK).strong())
        .fill(ThemeColors::ACCENT_PRIMARY)
        .min_size(Vec2::new(160.0, 36.0));
    ui.add_enabled(enabled, button).clicked()
}

/// Captured still if there is one, otherwise the live preview
fn render_picture(
    ui: &mut egui::Ui,
    view_state: &mut DashboardState,
    snapshot: &PipelineSnapshot,
    live: Option<Arc<RgbaImage>>,
) {
    let max_width = ui.available_width().min(640.0);
    let ctx = ui.ctx().clone();

    let live = match snapshot.state {
        PipelineState::SessionOpen => live,
        _ => None,
    };
    let preview = view_state.preview_texture(&ctx, live).cloned();
    let captured = view_state
        .captured_texture(&ctx, snapshot.frame.as_deref())
        .cloned();

    let texture = match (captured, preview) {
        (Some(still), _) => still,
        (None, Some(preview)) => preview,
        (None, None) => {
            if snapshot.state == PipelineState::SessionOpen {
                ui.label(
                    RichText::new("Waiting for video...")
                        .size(14.0)
                        .color(ThemeColors::TEXT_MUTED),
                );
            }
            return;
        }
    };

    let size = fit_width(texture.size_vec2(), max_width);
    egui::Frame::none()
        .fill(ThemeColors::BG_MEDIUM)
        .rounding(Rounding::same(8.0))
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.image((texture.id(), size));
        });
}
