use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a global log subscriber for tests.
///
/// Library code logs through the `log` facade, which the subscriber picks up. Output goes through
/// the test writer, so it is only shown for failing tests.
pub fn setup_test_environment() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing_core::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    });
}
