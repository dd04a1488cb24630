use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_appender::non_blocking::WorkerGuard;
use anyhow::Result;

/// Default filter when neither `RUST_LOG` nor the configured level is set.
const DEFAULT_FILTER: &str = "info,rumqttc=warn";

/// Initializes the logging system for the bridge
///
/// Logs go to the console and, if a directory is given, to a file named `bisecur2mqtt_{current_date}.log` in it.
/// The filter is taken from `RUST_LOG`, then from the configured level, then defaults to "info" with the
/// MQTT client's chatter limited to warnings.
///
/// # Arguments
///
/// * `log_file_path`: An optional `PathBuf` specifying the directory where the log file should be created
/// * `level`: The configured level, used when `RUST_LOG` is not set
///
/// # Returns
///
/// * `Ok(Some(WorkerGuard))`: If logging is initialized with a file appender; keep the guard alive to flush the file
/// * `Ok(None)`: If logging is initialized without a file appender (console only)
/// * `Err(anyhow::Error)`: If the filter is invalid, the directory cannot be created or a subscriber is already set
pub fn init_logger(log_file_path: Option<PathBuf>, level: Option<&str>) -> Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match level {
            Some(level) => EnvFilter::try_new(format!("{},rumqttc=warn", level))?,
            None => EnvFilter::try_new(DEFAULT_FILTER)?,
        },
    };

    let format = fmt::format()
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(path) = log_file_path {
        std::fs::create_dir_all(&path)?;

        let file_name = format!(
            "bisecur2mqtt_{}.log",
            chrono::Local::now().format("%Y-%m-%d")
        );
        let file_appender = RollingFileAppender::new(Rotation::NEVER, &path, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::Layer::default()
            .event_format(format.clone())
            .with_writer(non_blocking);

        let console_layer = fmt::Layer::default()
            .event_format(format.with_ansi(true))
            .with_writer(std::io::stdout);

        tracing::subscriber::set_global_default(subscriber.with(file_layer).with(console_layer))?;

        tracing::info!("Logging initialized, writing to {}", path.display());
        Ok(Some(guard))
    } else {
        let console_layer = fmt::Layer::default()
            .event_format(format.with_ansi(true))
            .with_writer(std::io::stdout);

        tracing::subscriber::set_global_default(subscriber.with(console_layer))?;

        tracing::info!("Logging initialized successfully (console only)");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logging_writes_to_the_dated_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = init_logger(Some(dir.path().to_path_buf()), Some("debug")).unwrap();
        assert!(guard.is_some(), "file logging keeps a flush guard");
        tracing::warn!("written to the log file");
        drop(guard);

        let file_name = format!("bisecur2mqtt_{}.log", chrono::Local::now().format("%Y-%m-%d"));
        let contents = std::fs::read_to_string(dir.path().join(file_name)).unwrap();
        assert!(contents.contains("written to the log file"), "unexpected log contents: {}", contents);
    }
}
