//! Log output for the couponidx binary.
//!
//! Events go to stderr so stdout stays parseable. The filter comes from
//! `COUPONIDX_LOG`, else `RUST_LOG`, else the `-v`/`-q` flags (default `warn`).

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// How chatty the CLI is when no filter variable is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `-v` takes precedence over `-q`
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Self::Verbose,
            (false, true) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    /// Fallback filter directive
    fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "warn,couponidx=debug,couponidx_format=debug",
        }
    }
}

/// Install the global subscriber. Call once, before any work.
pub fn init_subscriber(verbosity: Verbosity) {
    let ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());

    tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .without_time()
                .compact(),
        )
        .init();
}

fn env_filter(verbosity: Verbosity) -> EnvFilter {
    // Unparseable values fall through instead of aborting the command
    std::env::var("COUPONIDX_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(verbosity.directive()))
}
