//! Dashboard theme and styling
//!
//! Dark, high-contrast theme for reading results at arm's length in a
//! workshop.

use egui::{Color32, FontFamily, FontId, Rounding, Stroke, TextStyle, Visuals};

/// Dark color palette
pub struct ThemeColors;

impl ThemeColors {
    // Background colors
    pub const BG_DARK: Color32 = Color32::from_rgb(16, 18, 22);
    pub const BG_MEDIUM: Color32 = Color32::from_rgb(26, 29, 35);
    pub const BG_LIGHT: Color32 = Color32::from_rgb(38, 42, 50);
    pub const BG_HOVER: Color32 = Color32::from_rgb(50, 55, 66);

    // Accent colors
    pub const ACCENT_PRIMARY: Color32 = Color32::from_rgb(255, 176, 46);
    pub const ACCENT_SUCCESS: Color32 = Color32::from_rgb(76, 200, 120);
    pub const ACCENT_ERROR: Color32 = Color32::from_rgb(235, 64, 52);

    // Text colors
    pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(242, 242, 245);
    pub const TEXT_SECONDARY: Color32 = Color32::from_rgb(165, 168, 180);
    pub const TEXT_MUTED: Color32 = Color32::from_rgb(105, 108, 120);

    pub const BORDER: Color32 = Color32::from_rgb(55, 60, 72);

    // Status colors
    pub const STATUS_OK: Color32 = Self::ACCENT_SUCCESS;
    pub const STATUS_IDLE: Color32 = Self::TEXT_SECONDARY;
    pub const STATUS_BUSY: Color32 = Self::ACCENT_PRIMARY;
    pub const STATUS_ERROR: Color32 = Self::ACCENT_ERROR;
}

/// Apply the dashboard theme to egui
pub fn apply_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    let mut visuals = Visuals::dark();

    visuals.window_fill = ThemeColors::BG_MEDIUM;
    visuals.panel_fill = ThemeColors::BG_DARK;
    visuals.faint_bg_color = ThemeColors::BG_LIGHT;
    visuals.extreme_bg_color = ThemeColors::BG_DARK;

    let widgets = &mut visuals.widgets;
    for (state, fill) in [
        (&mut widgets.noninteractive, ThemeColors::BG_MEDIUM),
        (&mut widgets.inactive, ThemeColors::BG_LIGHT),
        (&mut widgets.hovered, ThemeColors::BG_HOVER),
        (&mut widgets.active, ThemeColors::ACCENT_PRIMARY),
        (&mut widgets.open, ThemeColors::BG_HOVER),
    ] {
        state.bg_fill = fill;
        state.weak_bg_fill = fill;
        state.fg_stroke = Stroke::new(1.0, ThemeColors::TEXT_PRIMARY);
        state.rounding = Rounding::same(6.0);
    }
    widgets.noninteractive.fg_stroke = Stroke::new(1.0, ThemeColors::TEXT_SECONDARY);

    visuals.selection.bg_fill = color_with_alpha(ThemeColors::ACCENT_PRIMARY, 77);
    visuals.selection.stroke = Stroke::new(1.0, ThemeColors::ACCENT_PRIMARY);

    visuals.window_rounding = Rounding::same(8.0);
    visuals.window_stroke = Stroke::new(1.0, ThemeColors::BORDER);

    style.visuals = visuals;

    style.spacing.item_spacing = egui::vec2(8.0, 8.0);
    style.spacing.button_padding = egui::vec2(16.0, 8.0);

    style.text_styles = [
        (TextStyle::Small, FontId::new(13.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(16.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(15.0, FontFamily::Monospace)),
        (TextStyle::Button, FontId::new(17.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(24.0, FontFamily::Proportional)),
    ]
    .into();

    ctx.set_style(style);
}

/// Helper to create a color with modified alpha
pub fn color_with_alpha(color: Color32, alpha: u8) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), alpha)
}
