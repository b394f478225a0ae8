//! Tracing and logging (shared setup).

/// Initialize process-wide logging, format taken from `CAMPUS_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{init_with, LogFormat, UnknownLogFormat};
