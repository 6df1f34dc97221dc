//! Targets - what a protocol handler is pointed at
//!
//! - `expr.rs` - address / CIDR / range / hostname expressions
//! - `report.rs` - nmap and Nessus report import

mod expr;
mod report;

pub use expr::{parse_targets, MAX_EXPANSION};
pub use report::{parse_nessus, parse_nmap_xml, service_matches};

use nexec_foundation::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// One host, optionally pinned to a port
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetSpec {
    pub host: String,
    pub port: Option<u16>,
}

impl TargetSpec {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}", self.host, port),
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFileKind {
    Nmap,
    Nessus,
    List,
}

/// Sniff the first few KiB of a target file.
pub fn identify_target_file(path: &Path) -> Result<TargetFileKind> {
    let mut head = Vec::with_capacity(4096);
    fs::File::open(path)?.take(4096).read_to_end(&mut head)?;
    let head = String::from_utf8_lossy(&head);

    Ok(if head.contains("<nmaprun") {
        TargetFileKind::Nmap
    } else if head.contains("NessusClientData_v2") {
        TargetFileKind::Nessus
    } else {
        TargetFileKind::List
    })
}

/// Targets listed in a file, in file order.
pub fn parse_target_file(path: &Path, protocol: &str) -> Result<Vec<TargetSpec>> {
    let kind = identify_target_file(path)?;
    debug!(path = %path.display(), ?kind, "Reading target file");
    let content = fs::read_to_string(path)?;

    match kind {
        TargetFileKind::Nmap => parse_nmap_xml(&content, protocol),
        TargetFileKind::Nessus => parse_nessus(&content, protocol),
        TargetFileKind::List => {
            let mut targets = Vec::new();
            for line in content.lines().map(str::trim) {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match parse_targets(line) {
                    Ok(parsed) => targets.extend(parsed),
                    Err(e) => warn!("[-] Failed to parse target {}: {}", line, e),
                }
            }
            Ok(targets)
        }
    }
}

/// Resolve raw inputs (expressions or file paths) into an ordered target list.
///
/// An input that cannot be parsed is logged and skipped.
pub fn resolve_targets<S: AsRef<str>>(inputs: &[S], protocol: &str) -> Vec<TargetSpec> {
    let mut targets = Vec::new();

    for input in inputs {
        let input = input.as_ref();
        let path = Path::new(input);
        let parsed = if path.is_file() {
            parse_target_file(path, protocol)
        } else {
            parse_targets(input)
        };

        match parsed {
            Ok(found) => targets.extend(found),
            Err(e) => warn!("[-] Failed to parse target {}: {}", input, e),
        }
    }

    targets
}
