use std::path::Path;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "mosaic";

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter '{filter}'")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to create log directory '{path}'")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create log file appender")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Installs the global subscriber.
///
/// Console output goes to stdout, with WARN and above duplicated to stderr.
/// When `log_dir` is given, a daily-rolling plain-text log is written there too.
/// `RUST_LOG` overrides `base_level` when set.
pub fn setup_logging(base_level: &str, log_dir: Option<&Path>) -> Result<(), LogSetupError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(base_level).map_err(|source| LogSetupError::InvalidFilter {
            filter: base_level.to_string(),
            source,
        })?,
    };

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LogSetupError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;

            let file_appender = tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .max_log_files(5)
                .build(dir)?;

            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            LOG_GUARD
                .set(guard)
                .map_err(|_| LogSetupError::AlreadyInitialized)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(false)
        .with_ansi(true)
        .with_writer(console_writer(std::io::stdout, std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LogSetupError::AlreadyInitialized)
}


/// Everything to `out`; ERROR and WARN also to `err`.
fn console_writer<O, E>(out: O, err: E) -> impl for<'a> MakeWriter<'a> + 'static
where
    O: for<'a> MakeWriter<'a> + 'static,
    E: for<'a> MakeWriter<'a> + 'static,
{
    // More verbose levels compare greater, so WARN as the max keeps ERROR too.
    out.and(err.with_max_level(Level::WARN))
}
