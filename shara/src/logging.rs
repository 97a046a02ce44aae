use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging to stdout.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this a
/// second time is a no-op.
///
/// ```
/// shara::init_logging();
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
