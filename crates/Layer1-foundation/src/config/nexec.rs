//! nexec configuration file (`nexec.json`)

use super::paths::{NexecPaths, CONFIG_FILE};
use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default worker count for dispatch
pub const DEFAULT_THREADS: usize = 256;

/// Persistent settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NexecConfig {
    /// Active workspace name
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Mirror every run's log into `logs/`
    #[serde(default)]
    pub log_to_file: bool,

    /// Default dispatch worker count
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Default per-target timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_workspace() -> String {
    "default".to_string()
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

impl Default for NexecConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            log_to_file: false,
            threads: DEFAULT_THREADS,
            timeout: None,
        }
    }
}

impl NexecConfig {
    /// Load from the layout root; a missing file yields defaults.
    pub fn load(paths: &NexecPaths) -> Result<Self> {
        let store = JsonStore::new(paths.root());
        Ok(store.load_optional(CONFIG_FILE)?.unwrap_or_default())
    }

    pub fn save(&self, paths: &NexecPaths) -> Result<()> {
        JsonStore::new(paths.root()).save(CONFIG_FILE, self)
    }
}

/// Create the directory layout and a default config on first use.
pub fn first_run_setup(paths: &NexecPaths) -> Result<NexecConfig> {
    let first_run = !paths.config_file().exists();
    paths.ensure_layout()?;

    if first_run {
        let config = NexecConfig::default();
        config.save(paths)?;
        info!(root = %paths.root().display(), "First run: created nexec home");
        return Ok(config);
    }

    NexecConfig::load(paths)
}
