//! SQLite store for protocol results
//!
//! One store is created per run, keyed by protocol name, at
//! `workspaces/<workspace>/<protocol>.db`. Concurrent target invocations share
//! it by reference; every access goes through one connection behind a mutex,
//! so writes are serialized here and the dispatcher adds no locking of its own.
//!
//! WAL journaling keeps the file consistent when a run is abandoned mid-write.

use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Result store for a single protocol
pub struct ProtocolStore {
    protocol: String,
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
}

impl ProtocolStore {
    /// Open (or create) the store file for `protocol`.
    pub fn open(path: impl AsRef<Path>, protocol: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let protocol = protocol.into();
        info!(protocol = %protocol, path = %path.display(), "Opened protocol store");

        Ok(Self {
            protocol,
            path: Some(path.to_path_buf()),
            conn: Mutex::new(Some(conn)),
        })
    }

    /// In-memory store (tests and dry runs)
    pub fn in_memory(protocol: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        Ok(Self {
            protocol: protocol.into(),
            path: None,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::StoreDisposed(self.protocol.clone()))?;
        Ok(f(conn)?)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_connection(|conn| conn.execute_batch(sql))
    }

    /// Whether `table` exists in the schema.
    pub fn has_table(&self, table: &str) -> Result<bool> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table],
                |row| row.get::<_, bool>(0),
            )
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.conn.lock().is_none()
    }

    /// Close the connection. Later calls are no-ops.
    pub fn dispose(&self) -> Result<()> {
        let taken = self.conn.lock().take();
        match taken {
            Some(conn) => {
                conn.close().map_err(|(_, e)| {
                    Error::Storage(format!("Failed to close {} store: {}", self.protocol, e))
                })?;
                debug!(protocol = %self.protocol, "Disposed protocol store");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProtocolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolStore")
            .field("protocol", &self.protocol)
            .field("path", &self.path)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspaces").join("default").join("smb.db");

        let store = ProtocolStore::open(&path, "smb").unwrap();
        assert!(path.exists());
        assert_eq!(store.protocol(), "smb");
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_dispose_is_idempotent_and_blocks_access() {
        let store = ProtocolStore::in_memory("ssh").unwrap();
        store
            .execute_batch("CREATE TABLE hosts (host TEXT PRIMARY KEY);")
            .unwrap();
        assert!(store.has_table("hosts").unwrap());

        store.dispose().unwrap();
        store.dispose().unwrap();
        assert!(store.is_disposed());

        let err = store.execute_batch("SELECT 1;").unwrap_err();
        assert!(matches!(err, Error::StoreDisposed(ref p) if p == "ssh"));
    }

    #[test]
    fn test_concurrent_writes_are_serialized() {
        let store = Arc::new(ProtocolStore::in_memory("tcp").unwrap());
        store
            .execute_batch("CREATE TABLE hits (n INTEGER NOT NULL);")
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .with_connection(|conn| conn.execute("INSERT INTO hits (n) VALUES (?1)", [n]))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let count: i64 = store
            .with_connection(|conn| conn.query_row("SELECT COUNT(*) FROM hits", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 8);
    }
}
