//! Shared dvtm library: the terminal engine and PTY plumbing the binary
//! and its tests build on.

pub mod escape;
pub mod pty;
mod telemetry;
pub mod vt;

pub use telemetry::{init_tracing, log_debug};

/// Version reported by `-v` and exported to children as `DVTM`.
pub const VERSION: &str = "0.15";
