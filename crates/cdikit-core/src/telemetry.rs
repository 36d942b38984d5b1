//! Tracing setup shared by the cdikit binaries.
//!
//! Log lines always go to stderr: the generator streams the spec on stdout,
//! and the hook's stdout belongs to the container runtime.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Verbosity chosen by command-line flags. `quiet` wins over `verbose`.
pub fn level_from_flags(verbose: bool, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, true) => Level::DEBUG,
        (false, false) => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json`, each event is a
/// JSON object on its own line. Only the first call in a process has an
/// effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let _ = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
}
