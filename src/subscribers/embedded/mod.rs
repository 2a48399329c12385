//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events through `tracing` (demo/debug).

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
