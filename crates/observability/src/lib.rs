//! Tracing/logging setup shared by the binaries and black-box tests.

/// Initialize process-wide tracing with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::Json);
}

/// Subscriber configuration (filters, formats).
pub mod tracing;

pub use crate::tracing::LogFormat;
