//! Logging setup for the `shapecat` binary.
//!
//! All workspace crates log through `tracing`; their targets share the
//! `shapecat` prefix, so one directive covers them.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Phase changes, block results and saved files.
    #[default]
    Normal,
    /// Adds per-trial events.
    Verbose,
    /// Adds per-frame render timing.
    Trace,
}

impl Verbosity {
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Default filter directive for a verbosity
fn default_directive(verbosity: Verbosity) -> String {
    format!("shapecat={}", verbosity.to_level_filter())
}

/// Installs the global subscriber. `RUST_LOG` overrides `verbosity` when set.
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Already installed is fine
    let _ = subscriber.try_init();
}
