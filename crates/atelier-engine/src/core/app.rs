use winit::event::WindowEvent;

use crate::resources::RenderContext;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
pub trait App {
    /// Called once, after the window and render context exist.
    ///
    /// An error aborts the run; the runtime still performs full teardown.
    fn init(&mut self, ctx: &mut RenderContext, window_size: (u32, u32)) -> anyhow::Result<()>;

    /// Called for raw window events, before the runtime handles them.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per frame.
    fn on_frame(&mut self, frame: &mut FrameCtx<'_>) -> AppControl;

    /// Called once on exit, before the render context is torn down.
    fn on_shutdown(&mut self, ctx: &mut RenderContext) {
        let _ = ctx;
    }
}
