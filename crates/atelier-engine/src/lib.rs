//! Atelier engine crate.
//!
//! Name-keyed GPU resource registries, drawable shader entities with hot
//! reload, per-frame scripts, and the platform + GPU runtime that hosts them.

pub mod device;
pub mod window;
pub mod input;
pub mod time;
pub mod core;

pub mod logging;
pub mod gpu;
pub mod shader;
pub mod resources;
pub mod entity;
pub mod script;
pub mod capture;
