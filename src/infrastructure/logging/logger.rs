use std::io;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::{LogFormat, LoggingConfig, RotationPolicy};

const LOG_FILE_PREFIX: &str = "parley.log";

/// Dependencies that are chatty below `warn` at our default levels.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=warn", "h2=warn"];

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Process-wide tracing subscriber. Keep it alive for the life of the
/// process; dropping it flushes and stops the file writer.
pub struct LoggerImpl {
    _file_guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber.
    ///
    /// Stdout uses `config.format`; when `log_dir` is set a rolling JSON file
    /// is written as well. `RUST_LOG` directives take precedence over the
    /// configured level.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let filter = build_filter(&config.level)?;

        let (file_layer, guard) = match &config.log_dir {
            Some(dir) => {
                let (writer, guard) = file_writer(dir, config.rotation)?;
                (Some(json_file_layer(writer, filter.clone())), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(stdout_layer(config.format, filter))
            .with(file_layer)
            .try_init()
            .context("A global tracing subscriber is already installed")?;

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            log_dir = ?config.log_dir,
            "logging ready"
        );
        Ok(Self { _file_guard: guard })
    }
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    let level = Level::from_str(level).map_err(|_| anyhow::anyhow!("Invalid log level: {level}"))?;

    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

fn stdout_layer<S>(format: LogFormat, filter: EnvFilter) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => layer
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter)
            .boxed(),
    }
}

fn json_file_layer<S>(writer: NonBlocking, filter: EnvFilter) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_current_span(true)
        .with_target(true)
        .with_filter(filter)
        .boxed()
}

fn file_writer(dir: &Path, rotation: RotationPolicy) -> Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation.into())
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
        .with_context(|| format!("Failed to open log directory {}", dir.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

impl From<RotationPolicy> for Rotation {
    fn from(policy: RotationPolicy) -> Self {
        match policy {
            RotationPolicy::Daily => Self::DAILY,
            RotationPolicy::Hourly => Self::HOURLY,
            RotationPolicy::Never => Self::NEVER,
        }
    }
}
