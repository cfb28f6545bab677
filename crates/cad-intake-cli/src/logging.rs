use chrono::Local;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// `<log_dir>/<project>_<YYYY-MM-DD(HHMM)>.txt`, unless `LOG_FILE_PATH` is set.
pub fn log_file_path(log_dir: Option<&Path>, project: Option<&str>) -> PathBuf {
    if let Ok(path) = env::var("LOG_FILE_PATH") {
        return PathBuf::from(path);
    }
    let dir = log_dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("./logs"));
    let stem = project.unwrap_or("cad-intake");
    dir.join(format!("{}_{}.txt", stem, Local::now().format("%Y-%m-%d(%H%M)")))
}

pub fn init_logger(log_file: &Path) -> impl Drop {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cad-intake.txt".into());

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(false)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!("Logging to {}", log_file.display());

    guard
}
