use crate::input::{InputFrame, InputState};
use crate::resources::RenderContext;
use crate::time::FrameTime;

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
///
/// The app opens and closes the GPU frame itself through `render`, so it
/// decides what clears, what draws and whether a readback is taken.
pub struct FrameCtx<'a> {
    pub render: &'a mut RenderContext,
    pub input: &'a InputState,
    pub input_frame: &'a InputFrame,
    pub time: FrameTime,
}

impl FrameCtx<'_> {
    /// Surface size in physical pixels.
    pub fn window_size(&self) -> (u32, u32) {
        self.render.surface_size()
    }

    /// Width over height, or 1.0 for a degenerate surface.
    pub fn aspect_ratio(&self) -> f32 {
        match self.window_size() {
            (w, h) if w > 0 && h > 0 => w as f32 / h as f32,
            _ => 1.0,
        }
    }
}
