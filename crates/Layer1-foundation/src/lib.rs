//! # nexec-foundation
//!
//! Foundation layer for nexec:
//! - Error: shared error type
//! - Config: `nexec.json` and the `~/.nexec` layout
//! - Args: resolved run arguments
//! - Storage: per-protocol SQLite result store, JSON config store

pub mod args;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{Error, Result};

pub use args::{expand_cred_ids, Jitter, RunArgs};

pub use config::{
    first_run_setup, NexecConfig, NexecPaths, CONFIG_FILE, DEFAULT_THREADS, NEXEC_HOME_ENV,
};

pub use storage::{JsonStore, ProtocolStore};
