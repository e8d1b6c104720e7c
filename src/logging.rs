//! Log output for the brcodes CLI.
//!
//! Everything goes to stderr so stdout stays clean for command output.

use std::io::{self, IsTerminal};
use tracing_subscriber::{
    fmt::{self, time},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// One JSON object per line, for hosts that parse `--robot` output.
    Json,
    /// Colored, with time since startup. Used when stderr is a terminal.
    Pretty,
    /// Single plain line per event, for redirected stderr.
    Plain,
}

impl LogStyle {
    pub fn detect(robot_mode: bool) -> Self {
        if robot_mode {
            Self::Json
        } else if io::stderr().is_terminal() {
            Self::Pretty
        } else {
            Self::Plain
        }
    }

    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            Self::Json => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(io::stderr)
                .boxed(),
            Self::Pretty => fmt::layer()
                .with_target(false)
                .with_timer(time::uptime())
                .with_writer(io::stderr)
                .boxed(),
            Self::Plain => fmt::layer()
                .compact()
                .with_ansi(false)
                .with_target(false)
                .without_time()
                .with_writer(io::stderr)
                .boxed(),
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` replaces the level chosen by `-v`/`-q` when it parses
/// (e.g. `brcodes=debug,notify=warn`).
pub fn init_logging(robot_mode: bool, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    tracing_subscriber::registry()
        .with(LogStyle::detect(robot_mode).layer().with_filter(filter))
        .init();
}

/// Filter directive used when `RUST_LOG` is not set.
pub const fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "brcodes=error";
    }
    match verbose {
        0 => "brcodes=warn",
        1 => "brcodes=info",
        2 => "brcodes=debug",
        _ => "brcodes=trace",
    }
}
