//! Logging configuration and initialization.

use std::env;

use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";
const UTC_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON for log shippers
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Timestamp format for log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// Local time with offset
    #[default]
    Local,
    /// UTC, RFC 3339 style
    Utc,
    None,
}

impl TimestampFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "utc" => TimestampFormat::Utc,
            "none" | "off" => TimestampFormat::None,
            _ => TimestampFormat::Local,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub timestamps: TimestampFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_level: String,
    /// Include source file and line
    pub include_location: bool,
    pub include_thread_ids: bool,
    /// Include the module path of the event
    pub include_target: bool,
    /// Application name, logged once the subscriber is installed
    pub app_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            timestamps: TimestampFormat::Local,
            default_level: "info".to_string(),
            include_location: false,
            include_thread_ids: false,
            include_target: true,
            app_name: None,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl LogConfig {
    /// Build config from environment variables
    ///
    /// Reads `LOG_FORMAT`, `LOG_TIMESTAMPS`, `LOG_LEVEL`, `LOG_LOCATION`,
    /// `LOG_THREAD_IDS` and `LOG_APP_NAME`.
    pub fn from_env() -> Self {
        Self {
            format: env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            timestamps: env::var("LOG_TIMESTAMPS")
                .map(|s| TimestampFormat::parse(&s))
                .unwrap_or_default(),
            default_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            include_location: env_flag("LOG_LOCATION", false),
            include_thread_ids: env_flag("LOG_THREAD_IDS", false),
            include_target: true,
            app_name: env::var("LOG_APP_NAME").ok(),
        }
    }

    /// JSON output with UTC timestamps, for unattended scheduled runs
    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            timestamps: TimestampFormat::Utc,
            include_thread_ids: true,
            ..Default::default()
        }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Filter directive for the given verbosity flag count.
    /// `-v` enables debug for the collector crates, `-vv` enables trace.
    pub fn with_verbosity(self, verbose: u8) -> Self {
        match verbose {
            0 => self,
            1 => self.with_default_level("info,data_collector=debug,collector_common=debug"),
            _ => self.with_default_level("debug,data_collector=trace,collector_common=trace"),
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber was already set.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let base = fmt::layer()
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match (config.format, config.timestamps) {
        (LogFormat::Json, TimestampFormat::None) => registry
            .with(base.json().flatten_event(true).without_time())
            .try_init()?,
        (LogFormat::Json, TimestampFormat::Local) => registry
            .with(
                base.json()
                    .flatten_event(true)
                    .with_timer(ChronoLocal::new(LOCAL_TIME_FORMAT.to_string())),
            )
            .try_init()?,
        (LogFormat::Json, TimestampFormat::Utc) => registry
            .with(
                base.json()
                    .flatten_event(true)
                    .with_timer(ChronoUtc::new(UTC_TIME_FORMAT.to_string())),
            )
            .try_init()?,
        (LogFormat::Compact, timestamps) => {
            let layer = base.compact().with_ansi(atty::is(atty::Stream::Stdout));
            match timestamps {
                TimestampFormat::Local => registry
                    .with(layer.with_timer(ChronoLocal::new(LOCAL_TIME_FORMAT.to_string())))
                    .try_init()?,
                TimestampFormat::Utc => registry
                    .with(layer.with_timer(ChronoUtc::new(UTC_TIME_FORMAT.to_string())))
                    .try_init()?,
                TimestampFormat::None => registry.with(layer.without_time()).try_init()?,
            }
        }
        (LogFormat::Pretty, timestamps) => {
            let layer = base.with_ansi(atty::is(atty::Stream::Stdout));
            match timestamps {
                TimestampFormat::Local => registry
                    .with(layer.with_timer(ChronoLocal::new(LOCAL_TIME_FORMAT.to_string())))
                    .try_init()?,
                TimestampFormat::Utc => registry
                    .with(layer.with_timer(ChronoUtc::new(UTC_TIME_FORMAT.to_string())))
                    .try_init()?,
                TimestampFormat::None => registry.with(layer.without_time()).try_init()?,
            }
        }
    }

    if let Some(app) = config.app_name.as_deref() {
        tracing::debug!(app, "logging initialised");
    }

    Ok(())
}
