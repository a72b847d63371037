//! Logging bootstrap.
//!
//! Library code only emits `tracing` events; hosts call [`init_subscriber`]
//! once at startup to see them.

/// Initialize the global tracing subscriber with stderr output only.
///
/// `RUST_LOG` takes precedence over `level`. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // no-op if a global default is already set
    let _ = subscriber.try_init();
}
