//! GLSL front end.
//!
//! Shader sources are Vulkan-flavoured GLSL (`#version 450`): uniforms live in
//! `layout(set = 0, binding = N)` blocks and textures are separate
//! `texture2D` / `textureCube` + `sampler` objects. Sources are parsed and
//! validated with `naga`, then reflected so host code can address uniforms and
//! texture units by name.

mod glsl;
mod reflect;
mod uniform;

pub use glsl::{compile_stage, link, CompiledStage, LinkedProgram, ShaderStage, StageError};
pub use reflect::{
    ProgramReflection,
    SamplerSlot,
    TextureKind,
    TextureSlot,
    UniformBlock,
    UniformInfo,
    UniformType,
    VertexInput,
};
pub use uniform::UniformValue;

#[cfg(test)]
pub(crate) use glsl::test_sources;
