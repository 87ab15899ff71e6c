//! Status card component showing where the scan pipeline is

use egui::{Color32, RichText, Rounding, Vec2};

use crate::dashboard::theme::ThemeColors;
use crate::pipeline::{ErrorKind, PipelineSnapshot, PipelineState};

/// A card displaying the pipeline status
pub struct StatusCard {
    pub title: String,
    pub value: String,
    pub status: CardStatus,
}

/// Status types for cards
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CardStatus {
    Active,
    Inactive,
    Busy,
    Error,
}

impl CardStatus {
    pub fn color(&self) -> Color32 {
        match self {
            CardStatus::Active => ThemeColors::STATUS_OK,
            CardStatus::Inactive => ThemeColors::STATUS_IDLE,
            CardStatus::Busy => ThemeColors::STATUS_BUSY,
            CardStatus::Error => ThemeColors::STATUS_ERROR,
        }
    }
}

impl StatusCard {
    pub fn new(title: impl Into<String>, value: impl Into<String>, status: CardStatus) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            status,
        }
    }

    /// Camera status card for a snapshot
    pub fn camera(snapshot: &PipelineSnapshot) -> Self {
        let (value, status) = if snapshot.opening {
            ("Opening...", CardStatus::Busy)
        } else {
            match snapshot.state {
                PipelineState::Idle => ("Closed", CardStatus::Inactive),
                PipelineState::SessionOpen if snapshot.session_ready => ("Live", CardStatus::Active),
                PipelineState::SessionOpen => ("Waiting for video", CardStatus::Busy),
                _ => ("Picture taken", CardStatus::Active),
            }
        };
        let status = match snapshot.error {
            Some(ErrorKind::DeviceAccess) => CardStatus::Error,
            _ => status,
        };
        Self::new("Camera", value, status)
    }

    /// Scan result card for a snapshot
    pub fn scan(snapshot: &PipelineSnapshot) -> Self {
        let (value, status) = match &snapshot.state {
            PipelineState::Captured | PipelineState::Processing => {
                ("Processing image...".to_string(), CardStatus::Busy)
            }
            PipelineState::Resolved(size) => (size.to_string(), CardStatus::Active),
            PipelineState::Failed(_) => ("No result".to_string(), CardStatus::Error),
            PipelineState::Idle | PipelineState::SessionOpen => {
                ("Waiting for picture".to_string(), CardStatus::Inactive)
            }
        };
        Self::new("Scan", value, status)
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        egui::Frame::none()
            .fill(ThemeColors::BG_MEDIUM)
            .rounding(Rounding::same(8.0))
            .inner_margin(12.0)
            .show(ui, |ui| {
                ui.set_min_width(200.0);

                ui.horizontal(|ui| {
                    // Status indicator dot
                    let center = ui.cursor().left_top() + Vec2::new(6.0, 10.0);
                    ui.painter().circle_filled(center, 4.0, self.status.color());
                    ui.add_space(16.0);

                    ui.vertical(|ui| {
                        ui.label(
                            RichText::new(&self.title)
                                .size(12.0)
                                .color(ThemeColors::TEXT_MUTED),
                        );
                        ui.add_space(2.0);
                        ui.label(
                            RichText::new(&self.value)
                                .size(17.0)
                                .color(ThemeColors::TEXT_PRIMARY)
                                .strong(),
                        );
                    });
                });
            });
    }
}
