use anyhow::Result;
use winit::event::WindowEvent;

use crate::render::RenderCtx;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application lifecycle driven by the runtime.
///
/// The runtime calls [`App::init`] once after the device exists, then
/// [`App::logic`] followed by [`App::draw`] for every frame, and
/// [`App::cleanup`] once before exit. An error from `init`, `logic` or `draw`
/// stops the loop and is returned from [`crate::window::Runtime::run`].
pub trait App {
    /// Creates GPU resources. Called exactly once.
    fn init(&mut self, ctx: &RenderCtx<'_>) -> Result<()>;

    /// Called for window events before the runtime handles them.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Per-frame state update; runs before [`App::draw`].
    fn logic(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl> {
        let _ = ctx;
        Ok(AppControl::Continue)
    }

    /// Records and submits the frame.
    fn draw(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl>;

    /// Releases resources. Called once, only if `init` succeeded.
    fn cleanup(&mut self) {}
}
