//! Tracing configuration and log routing.
//!
//! Every event goes to stdout through a compact formatter and to a log file through a
//! non‑blocking writer. `DOCLING_SERVICE_LOG_FILE` pins the file to an explicit path (appended,
//! never rotated). Otherwise the file lives under `logs/` and rotates according to
//! `DOCLING_SERVICE_LOG_ROTATION` (`never`, `daily` or `hourly`; default `never`).
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "DOCLING_SERVICE_LOG_FILE";
const LOG_ROTATION_ENV: &str = "DOCLING_SERVICE_LOG_ROTATION";
const LOG_DIR: &str = "logs";
const LOG_FILE_NAME: &str = "docling-service.log";

/// Where the file layer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileTarget {
    Explicit(PathBuf),
    Rolling(RotationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotationKind {
    Never,
    Daily,
    Hourly,
}

impl RotationKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "never" => Some(Self::Never),
            "daily" => Some(Self::Daily),
            "hourly" => Some(Self::Hourly),
            _ => None,
        }
    }

    fn rotation(self) -> Rotation {
        match self {
            Self::Never => Rotation::NEVER,
            Self::Daily => Rotation::DAILY,
            Self::Hourly => Rotation::HOURLY,
        }
    }
}

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stdout layer and, when the file can be opened, a file layer.
/// - Keeps the non‑blocking writer's guard alive for the process lifetime.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let target = file_target(
        std::env::var(LOG_FILE_ENV).ok(),
        std::env::var(LOG_ROTATION_ENV).ok(),
    );
    let file_layer = file_writer(&target).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

fn file_target(explicit: Option<String>, rotation: Option<String>) -> FileTarget {
    if let Some(path) = explicit.filter(|path| !path.trim().is_empty()) {
        return FileTarget::Explicit(PathBuf::from(path));
    }
    let kind = match rotation {
        Some(value) => RotationKind::parse(&value).unwrap_or_else(|| {
            eprintln!("Unknown {LOG_ROTATION_ENV} value '{value}'; log rotation disabled");
            RotationKind::Never
        }),
        None => RotationKind::Never,
    };
    FileTarget::Rolling(kind)
}

/// Build a non‑blocking writer for file logging.
///
/// Returns `None` when the logs directory cannot be created or the target file cannot be opened;
/// stdout logging keeps working in that case.
fn file_writer(target: &FileTarget) -> Option<NonBlocking> {
    let (non_blocking, guard) = match target {
        FileTarget::Explicit(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        FileTarget::Rolling(kind) => {
            std::fs::create_dir_all(LOG_DIR)
                .map_err(|err| eprintln!("Failed to create logs directory: {err}"))
                .ok()?;
            let appender = RollingFileAppender::new(kind.rotation(), LOG_DIR, LOG_FILE_NAME);
            tracing_appender::non_blocking(appender)
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
