use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "PROOFCHECK_LOG";

/// Install the global tracing subscriber.
///
/// `PROOFCHECK_LOG` takes precedence; otherwise `verbose` selects `debug`
/// over the default `info`. Logs go to stderr so command output stays clean.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "proofcheck=debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
