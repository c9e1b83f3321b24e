use tracing_subscriber::EnvFilter;

/// Default filter of the `run` process.
pub(crate) const MASTER_DEFAULT: &str = "info";
/// Default filter of worker processes; their stderr is shared with the master.
pub(crate) const WORKER_DEFAULT: &str = "warn";

/// Installs the global subscriber, writing to stderr.
///
/// The filter is `explicit` when given, else `RUST_LOG`, else `default`.
pub(crate) fn init(explicit: Option<&str>, default: &str) {
    let filter = explicit
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
