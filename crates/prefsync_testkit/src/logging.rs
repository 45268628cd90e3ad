//! Test logging setup.

use tracing_subscriber::EnvFilter;

/// Installs a tracing subscriber for test output.
///
/// Respects `RUST_LOG` and writes through the test writer so output is
/// captured per test. Calling it more than once is fine; only the first
/// call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
