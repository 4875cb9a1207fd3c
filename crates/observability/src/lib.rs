//! Process-wide tracing setup shared by the binary and tests.

pub mod subscriber;

pub use subscriber::LogFormat;

/// Install the JSON subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    subscriber::install(LogFormat::from_env(), "info");
}
