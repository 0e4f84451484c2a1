//! Logging utilities.
//!
//! Centralizes logger initialization. Engine code only talks to the `log`
//! facade; `env_logger` is wired here once, early in `main`.

mod init;

pub use init::{init_logging, LoggingConfig};
