//! On-disk layout
//!
//! ```text
//! ~/.nexec/                 (or $NEXEC_HOME)
//! ├── nexec.json
//! ├── logs/
//! ├── tmp/
//! ├── obfuscated_scripts/
//! └── workspaces/<workspace>/<protocol>.db
//! ```

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the home directory
pub const NEXEC_HOME_ENV: &str = "NEXEC_HOME";

/// Configuration file name
pub const CONFIG_FILE: &str = "nexec.json";

/// Resolved directory layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NexecPaths {
    root: PathBuf,
}

impl NexecPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$NEXEC_HOME`, else `~/.nexec`.
    pub fn discover() -> Result<Self> {
        if let Some(home) = std::env::var_os(NEXEC_HOME_ENV) {
            return Ok(Self::new(home));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot find home directory".to_string()))?;
        Ok(Self::new(home.join(".nexec")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn obfuscated_scripts_dir(&self) -> PathBuf {
        self.root.join("obfuscated_scripts")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    /// Store file for one protocol inside a workspace.
    pub fn protocol_db(&self, workspace: &str, protocol: &str) -> PathBuf {
        self.workspaces_dir()
            .join(workspace)
            .join(format!("{}.db", protocol))
    }

    /// Create every directory of the layout.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.logs_dir(),
            self.tmp_dir(),
            self.obfuscated_scripts_dir(),
            self.workspaces_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_db_path() {
        let paths = NexecPaths::new("/opt/nexec");
        assert_eq!(
            paths.protocol_db("engagement", "smb"),
            PathBuf::from("/opt/nexec/workspaces/engagement/smb.db")
        );
    }

    #[test]
    fn test_ensure_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NexecPaths::new(dir.path().join("home"));
        paths.ensure_layout().unwrap();

        assert!(paths.logs_dir().is_dir());
        assert!(paths.obfuscated_scripts_dir().is_dir());
        assert!(paths.workspaces_dir().is_dir());
    }
}
