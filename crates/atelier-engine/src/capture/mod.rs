//! Frame capture: turns framebuffer readbacks into image files.

mod error;
mod recorder;

pub use error::CaptureError;
pub use recorder::{ImageFileFormat, Recorder};
