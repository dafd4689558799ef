//! Process-wide tracing setup, called once by each binary.

use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber. `RUST_LOG` wins; otherwise `warn`, or
/// `debug` for this crate when `verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        "warn,claude_acme_lib=debug,claude_acme=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
