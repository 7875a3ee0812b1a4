//! Utils for tests run on the host system

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

/// Initializes a logger
///
/// This can be called multiple times and ensures that
/// the logger is only initialized once.
/// The level is taken from `RUST_LOG` and logs are captured by the test harness.
pub fn init_test_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .format_timestamp(None)
            .try_init();
    });
}

/// Creates a zeroed buffer of `N` bytes and lets `fill` write the test data into it
pub fn buffer_with<const N: usize>(fill: impl FnOnce(&mut [u8; N])) -> [u8; N] {
    let mut buffer = [0u8; N];
    fill(&mut buffer);
    buffer
}
