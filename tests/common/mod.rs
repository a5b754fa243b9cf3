use std::sync::Once;

static INIT: Once = Once::new();

/// Install the test tracing subscriber once per test binary.
///
/// Output goes through the libtest capture writer; set `RUST_LOG` to see
/// diagnostics from a failing test.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}
