//! GPU backend seam.
//!
//! Registries never touch a graphics API directly; they talk to a
//! `Box<dyn GpuBackend>` through opaque handles. `WgpuBackend` renders to a
//! window surface, `HeadlessBackend` keeps everything in memory and records
//! each call for inspection.

mod backend;
mod error;
mod headless;
mod types;
mod wgpu_backend;

pub use backend::GpuBackend;
pub use error::BackendError;
pub use headless::{GpuCall, HeadlessBackend, HeadlessProbe};
pub use types::{
    BackendStats,
    BufferId,
    CubeUpload,
    FrameStatus,
    MipLevel,
    ProgramId,
    Readback,
    TextureFilter,
    TextureId,
    TextureUpload,
    VertexArrayId,
};
pub use wgpu_backend::WgpuBackend;
