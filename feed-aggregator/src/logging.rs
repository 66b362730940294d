//! Logging setup: stdout plus an append-only log file.

use crate::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const QUIET_CRATES: [&str; 3] = ["hyper=warn", "hyper_util=warn", "reqwest=warn"];

fn env_filter(level: &str) -> EnvFilter {
    let default_level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    QUIET_CRATES.iter().filter_map(|d| d.parse::<Directive>().ok()).fold(
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy(),
        EnvFilter::add_directive,
    )
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured
/// level. Calling it again is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let mut file_error = None;
    let file_layer = config.file.as_deref().and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            file_error = Some(format!("{}: {}", path.display(), e));
            None
        }
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(e) = file_error {
            warn!("Could not open log file {}, logging to stdout only", e);
        }
    }
}
