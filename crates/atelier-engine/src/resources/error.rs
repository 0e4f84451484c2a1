use std::fmt;
use std::path::PathBuf;

use crate::gpu::BackendError;
use crate::shader::StageError;

/// Which registry a name belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Program,
    Buffer,
    Texture,
    RenderObject,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Program => "program",
            ResourceKind::Buffer => "vertex buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::RenderObject => "render object",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// A stage failed to compile or the stages failed to link.
    #[error("shader compile error: {0}")]
    ShaderCompile(#[from] StageError),

    /// A render object was requested before its program or buffer existed.
    #[error("cannot bind `{model}`: {kind} `{name}` is not registered")]
    UnresolvedDependency { model: String, kind: ResourceKind, name: String },

    #[error("unknown {kind} `{name}`")]
    UnknownResource { kind: ResourceKind, name: String },

    #[error("cubemap `{name}` is missing its `{face}` face ({path})")]
    MissingCubeFace { name: String, face: &'static str, path: PathBuf },

    #[error("pixel surface for `{name}` is invalid: {reason}")]
    InvalidSurface { name: String, reason: String },

    #[error("uniform `{name}` not found in program `{program}`")]
    UniformNotFound { program: String, name: String },

    #[error("uniform `{name}` in program `{program}` cannot take {reason}")]
    UniformMismatch { program: String, name: String, reason: String },

    #[error("destroy needs a model name, a program name, or both")]
    NoTargetSpecified,

    #[error("vertex layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode `{path}`: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ResourceError {
    pub(crate) fn unknown(kind: ResourceKind, name: &str) -> Self {
        ResourceError::UnknownResource { kind, name: name.to_string() }
    }
}
