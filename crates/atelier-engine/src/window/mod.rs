//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and the single window, and wires them to the
//! wgpu backend and the render context.

mod runtime;
mod translate;

pub use runtime::{Runtime, RuntimeConfig};
