//! Initialization of the global `tracing` subscriber.
use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt as _,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// The number of rotated log files kept in the log directory.
const MAX_LOG_FILES: usize = 6;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender in {directory:?}"))]
    InitRollingFileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

/// The output format of console logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Plain unstructured log lines.
    #[default]
    Plain,

    /// One JSON object per log event.
    Json,
}

/// Initializes `tracing` logging with the level filter read from the
/// environment variable `env`, e.g. `CAREN_LOG=debug`. Without the variable the
/// maximum log level is INFO.
///
/// Log output is additionally written to daily rotated JSON files when
/// `{env}_DIRECTORY` is set to a directory path.
pub fn initialize_logging(env: &str, app_name: &str, log_format: LogFormat) -> Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer();
    let console_layer = match log_format {
        LogFormat::Plain => console_layer.with_filter(env_filter(env, LevelFilter::INFO)).boxed(),
        LogFormat::Json => console_layer
            .json()
            .with_filter(env_filter(env, LevelFilter::INFO))
            .boxed(),
    };
    layers.push(console_layer);

    let file_log_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    if let Some(directory) = &file_log_directory {
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(app_name)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(directory)
            .with_context(|_| InitRollingFileAppenderSnafu { directory })?;

        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_filter(env_filter(env, LevelFilter::INFO))
                .boxed(),
        );
    }

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
        .context(SetGlobalDefaultSubscriberSnafu)?;

    // need to delay logging until after tracing is initialized
    match file_log_directory {
        Some(directory) => tracing::info!(directory = %directory.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }

    Ok(())
}

fn env_filter(env: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_level_is_info() {
        let filter = env_filter("CAREN_LOG_NOT_SET", LevelFilter::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[rstest]
    #[case(LogFormat::Plain, "plain")]
    #[case(LogFormat::Json, "json")]
    fn log_format_names(#[case] format: LogFormat, #[case] expected: &str) {
        assert_eq!(format.to_string(), expected);
    }
}
