//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Log to stderr. `RUST_LOG` wins; otherwise `info`, or `debug` with `-v`.
pub fn init(verbose: bool) {
    let default = if verbose { "sieve=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}
