//! Tracing subscriber setup for binaries and scripts.

/// Environment variable holding the log filter (`EnvFilter` syntax).
pub const LOG_ENV: &str = "SEGUE_LOG";

/// Install a stderr `fmt` subscriber filtered by `SEGUE_LOG`, falling back to `default_level`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

pub fn init_default_logging() {
    init_logging("info");
}
