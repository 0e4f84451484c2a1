use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("cannot create capture directory `{path}`: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("readback is {width}x{height}x{components} but carries {len} bytes")]
    InvalidReadback { width: u32, height: u32, components: u8, len: usize },

    #[error("capture name `{0}` is empty or contains a path separator")]
    InvalidName(String),

    #[error("failed to write `{path}`: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
