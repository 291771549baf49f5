use std::borrow::Cow;

use sentry::types::Dsn;
use serde::{Deserialize, Serialize};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// The release name reported to Sentry.
const RELEASE: &str = env!("CARGO_PKG_VERSION");

/// All internal crates of this workspace, used for log filtering.
const CRATE_NAMES: &[&str] = &[
    "indexer_base_schema",
    "indexer_batch",
    "indexer_common",
    "indexer_log",
    "indexer_statsd",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  indexer_batch > parsed batch
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [indexer_batch] INFO: parsed batch
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","logger":"indexer_batch","message":"parsed batch"}
    /// ```
    Json,
}

/// The logging level.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Logging is disabled entirely.
    Off,
    /// Only log errors.
    Error,
    /// Log errors and warnings.
    Warn,
    /// Additionally log messages relevant to the average user.
    Info,
    /// Additionally log information relevant for debugging.
    Debug,
    /// Log full auxiliary information.
    Trace,
}

impl Level {
    /// Returns the filter directive name for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Off => "off",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the indexer's own crates.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, stack traces are attached to error reports.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Controls internal reporting to Sentry.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SentryConfig {
    /// The [`Dsn`] specifying the project to report to.
    pub dsn: Option<Dsn>,

    /// Enables reporting to Sentry.
    pub enabled: bool,

    /// Sets the environment for this service.
    pub environment: Option<Cow<'static, str>>,
}

impl SentryConfig {
    /// Returns a reference to the [`Dsn`] if Sentry is enabled.
    pub fn enabled_dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref().filter(|_| self.enabled)
    }
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: "https://0cc4a37e5aab4da58366266a87a95740@sentry.io/1269704"
                .parse()
                .ok(),
            enabled: false,
            environment: None,
        }
    }
}

/// Returns the format layer matching the requested log format.
fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match (format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => fmt.compact().without_time().boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => fmt.with_ansi(false).boxed(),
        (LogFormat::Json, _) => fmt
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    }
}

/// Builds the default log filter.
///
/// The `RUST_LOG` environment variable takes precedence. Otherwise, third
/// party crates log at `INFO` and internal crates at the configured level.
fn env_filter(level: Level) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![String::from("info")];
    for name in CRATE_NAMES {
        directives.push(format!("{name}={}", level.as_str()));
    }

    EnvFilter::new(directives.join(","))
}

/// Initialize the logging system and reporting to Sentry.
///
/// # Example
///
/// ```
/// let log_config = indexer_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// let sentry_config = indexer_log::SentryConfig::default();
///
/// indexer_log::init(&log_config, &sentry_config);
/// ```
pub fn init(config: &LogConfig, sentry: &SentryConfig) {
    tracing_subscriber::registry()
        .with(format_layer(config.format).with_filter(env_filter(config.level)))
        .with(sentry::integrations::tracing::layer())
        .try_init()
        .ok();

    if let Some(dsn) = sentry.enabled_dsn() {
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some(dsn.clone()),
            release: Some(RELEASE.into()),
            attach_stacktrace: config.enable_backtraces,
            environment: sentry.environment.clone(),
            ..Default::default()
        });

        // Keep the client initialized. The client is flushed manually in `main`.
        std::mem::forget(guard);
    }
}
