//! Config - settings and on-disk layout
//!
//! - `paths.rs` - directory layout under `~/.nexec`
//! - `nexec.rs` - `NexecConfig` (nexec.json) and first-run setup

mod nexec;
mod paths;

pub use nexec::{first_run_setup, NexecConfig, DEFAULT_THREADS};
pub use paths::{NexecPaths, CONFIG_FILE, NEXEC_HOME_ENV};
