//! Time subsystem.
//!
//! Frame timing utilities decoupled from the runtime:
//! - `FrameClock::tick()` once per presented frame yields a `FrameTime`
//! - `FramePacer::wait()` at the end of a frame caps the frame rate

mod frame_clock;
mod pacer;

pub use frame_clock::{FrameClock, FrameTime};
pub use pacer::FramePacer;
