//! GPU resource registries.
//!
//! Four name-keyed registries own every GPU handle: shader programs, vertex
//! buffers, textures and render objects (a program bound to a buffer layout).
//! `RenderContext` owns the backend and all four, and is passed by reference
//! to entities and scripts.
//!
//! Ordering rules:
//! - a render object needs its program and buffer to exist first
//! - destroying a render object cascades only when asked to
//! - full teardown releases buffers, then programs, then render objects

mod buffers;
mod context;
mod error;
mod image_data;
mod layout;
mod objects;
mod programs;
mod textures;

pub use buffers::{BufferEntry, VertexBufferRegistry};
pub use context::{RegistryCounts, RenderContext, ResourceSettings};
pub use error::{ResourceError, ResourceKind};
pub use image_data::DecodeMode;
pub use layout::{AttributeBinding, VertexAttribute, VertexLayout};
pub use objects::{RenderObject, RenderObjectRegistry};
pub use programs::{ProgramEntry, ShaderProgramRegistry};
pub use textures::{PixelOrder, PixelSurface, TextureEntry, TextureRegistry, TextureSource, CUBE_FACES};

#[cfg(test)]
pub(crate) use image_data::write_test_image;
