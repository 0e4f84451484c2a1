//! GPU device + surface management.
//!
//! Creates the wgpu Instance/Adapter/Device/Queue for one window, configures
//! its surface and hands out frames. Resource bookkeeping lives in
//! [`crate::gpu::WgpuBackend`], which owns a [`Gpu`].

mod error;
mod frame;
mod gpu;
mod init;
mod surface;

pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use gpu::Gpu;
pub use init::GpuInit;
