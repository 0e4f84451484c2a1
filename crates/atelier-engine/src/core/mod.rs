//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop) and
//! the application: initialize once, run one callback per frame, tear down on
//! exit. It keeps winit and wgpu out of user code.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::FrameCtx;
