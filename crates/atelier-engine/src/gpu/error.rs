/// Failure reported by a GPU backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The program could not be turned into backend shader modules.
    #[error("program `{label}` rejected by backend: {reason}")]
    Program { label: String, reason: String },

    /// A vertex layout does not satisfy the program's inputs.
    #[error("vertex array `{label}` cannot be built: {reason}")]
    VertexArray { label: String, reason: String },

    /// A create call referenced a handle that is no longer alive.
    #[error("stale handle {0}")]
    StaleHandle(String),

    #[error("texture `{label}` rejected: {reason}")]
    Texture { label: String, reason: String },

    /// The presentation surface is unusable; rendering cannot continue.
    #[error("surface failure: {0}")]
    Surface(String),

    #[error("readback failed: {0}")]
    Readback(String),
}
