//! Shared helpers
//!
//! Logging setup, timing and polling.

pub mod logger;
pub mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::{poll_until, Stopwatch, Timer};
