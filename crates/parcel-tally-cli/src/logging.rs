use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE_PATH: &str = "./logs/parcel-tally.log";

/// Console layer on stderr (stdout carries command output and `--json`),
/// plus a non-blocking file layer. Keep the returned guard alive until exit
/// or buffered file lines are lost.
pub fn init_logger() -> WorkerGuard {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path = PathBuf::from(
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE_PATH.to_string()),
    );
    let (non_blocking, guard) = file_writer(&log_file_path);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter_layer)
        .init();

    info!(
        "Tracing is configured for console and file logging ({})",
        log_file_path.display()
    );

    guard
}

/// Non-blocking writer appending to `path`. Lines reach the file on a worker
/// thread; dropping the guard flushes whatever is still queued.
fn file_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| OsStr::new("parcel-tally.log"));

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    tracing_appender::non_blocking(file_appender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tracing::error;

    #[test]
    fn test_dropping_guard_flushes_final_error_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parcel-tally.log");
        let (writer, guard) = file_writer(&path);

        let subscriber =
            tracing_subscriber::registry().with(fmt::layer().with_writer(writer).with_ansi(false));
        tracing::subscriber::with_default(subscriber, || {
            error!("Error: session 42 not found");
        });
        drop(guard);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Error: session 42 not found"));
    }
}
