//! Logging setup for xpand.
//!
//! Diagnostics go through `tracing` to stderr, leaving stdout for command
//! output. `RUST_LOG` overrides the level chosen from CLI flags.
//!
//! # Usage
//!
//! ```rust
//! use xpand::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Application started");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level for this crate's events.
    pub level: LogLevel,
    /// Output format for log lines.
    pub format: LogFormat,
    /// Include timestamps.
    pub timestamps: bool,
    /// Include the module path.
    pub target: bool,
    /// Enable ANSI colors.
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    Pretty,
    /// Single line per event.
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Config for a CLI invocation with `-v` repeated `verbose` times.
    ///
    /// Progress bars cover routine reporting, so the default is warnings only;
    /// `-v` adds batch-level info, `-vv` per-tweet debug, `-vvv` trace.
    #[must_use]
    pub fn for_cli(quiet: bool, verbose: u8) -> Self {
        let level = if quiet {
            LogLevel::Error
        } else {
            LogLevel::from_verbosity(verbose)
        };
        Self {
            level,
            format: if level >= LogLevel::Debug {
                LogFormat::Pretty
            } else {
                LogFormat::Compact
            },
            timestamps: level >= LogLevel::Info,
            target: level >= LogLevel::Debug,
            colors: true,
        }
    }
}

impl LogLevel {
    #[must_use]
    pub const fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::Warn,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("xpand={}", config.level.to_filter_string()))
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = env_filter(config);
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.pretty())
                .try_init()
                .ok();
        }
        (LogFormat::Pretty, false) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.pretty().without_time())
                .try_init()
                .ok();
        }
        (LogFormat::Compact, true) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.compact())
                .try_init()
                .ok();
        }
        (LogFormat::Compact, false) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.compact().without_time())
                .try_init()
                .ok();
        }
    }
}

/// Initialize logging from the global `-q`/`-v` flags.
pub fn init_cli_logging(quiet: bool, verbose: u8, colors: bool) {
    let config = LogConfig {
        colors,
        ..LogConfig::for_cli(quiet, verbose)
    };
    init_logging(&config);
}
