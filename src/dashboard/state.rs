//! Dashboard view state
//!
//! GPU textures for the live preview and the captured still. Textures are
//! only re-uploaded when the underlying image actually changes.

use egui::{ColorImage, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;
use std::sync::Arc;

use crate::capture::{CapturedFrame, FrameId};

/// Per-window state that lives only as long as the dashboard
#[derive(Default)]
pub struct DashboardState {
    /// Live camera preview texture
    preview: Option<TextureHandle>,
    /// Stream frame currently uploaded to `preview`
    preview_source: Option<Arc<RgbaImage>>,
    /// Captured still and the frame it was uploaded from
    captured: Option<(FrameId, TextureHandle)>,
}

impl DashboardState {
    /// Texture for the newest live frame, uploading it if it changed
    pub fn preview_texture(
        &mut self,
        ctx: &egui::Context,
        live: Option<Arc<RgbaImage>>,
    ) -> Option<&TextureHandle> {
        let Some(live) = live else {
            self.preview = None;
            self.preview_source = None;
            return None;
        };

        let unchanged = self
            .preview_source
            .as_ref()
            .is_some_and(|shown| Arc::ptr_eq(shown, &live));
        if !unchanged {
            let image = to_color_image(&live);
            match &mut self.preview {
                Some(texture) => texture.set(image, TextureOptions::LINEAR),
                None => {
                    self.preview = Some(ctx.load_texture("camera-preview", image, TextureOptions::LINEAR))
                }
            }
            self.preview_source = Some(live);
        }
        self.preview.as_ref()
    }

    /// Texture for the captured still, uploaded once per frame id
    pub fn captured_texture(
        &mut self,
        ctx: &egui::Context,
        frame: Option<&CapturedFrame>,
    ) -> Option<&TextureHandle> {
        let Some(frame) = frame else {
            self.captured = None;
            return None;
        };

        if self.captured.as_ref().map(|(id, _)| *id) != Some(frame.id()) {
            let texture = ctx.load_texture(
                format!("captured-{}", frame.id()),
                to_color_image(frame.image()),
                TextureOptions::LINEAR,
            );
            self.captured = Some((frame.id(), texture));
        }
        self.captured.as_ref().map(|(_, texture)| texture)
    }
}

fn to_color_image(image: &RgbaImage) -> ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, image.as_raw())
}

/// Scale `size` down to fit `max_width`, keeping the aspect ratio. Images
/// are never scaled up.
pub fn fit_width(size: Vec2, max_width: f32) -> Vec2 {
    if size.x <= max_width || size.x <= 0.0 {
        return size;
    }
    size * (max_width / size.x)
}
