//! Subscriber setup: console output plus optional plain-text log files

use anyhow::{Context as _, Result};
use chrono::Local;
use nexec_foundation::{NexecConfig, NexecPaths, RunArgs};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `--debug` wins over `--verbose`
pub fn level(args: &RunArgs) -> &'static str {
    if args.debug {
        "trace"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    }
}

/// Where this run's log is mirrored when `logToFile` is enabled.
pub fn session_log_path(paths: &NexecPaths) -> PathBuf {
    paths
        .logs_dir()
        .join(format!("nexec_{}.log", Local::now().format("%Y-%m-%d_%H%M%S")))
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

pub fn init(args: &RunArgs, config: &NexecConfig, paths: &NexecPaths) -> Result<()> {
    let session_log = if config.log_to_file {
        Some(open_log(&session_log_path(paths))?)
    } else {
        None
    };
    let explicit_log = args.log.as_deref().map(|p| open_log(Path::new(p))).transpose()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level(args))),
        )
        .with(fmt::layer().with_target(false))
        .with(session_log.map(|file| {
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        }))
        .with(explicit_log.map(|file| {
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        }))
        .try_init()
        .context("failed to install log subscriber")
}
