//! Storage module for nexec
//!
//! - `db`: SQLite - one result store per protocol per workspace
//! - `json`: JSON - configuration files

mod db;
mod json;

pub use db::ProtocolStore;
pub use json::JsonStore;
