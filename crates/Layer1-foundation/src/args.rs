//! Resolved run arguments
//!
//! Built by the argument surface and shared read-only by every protocol and
//! extension invocation of a run. Options contributed by protocol plugins are
//! kept as raw strings in `extra`; the core never interprets them.
//!
//! The DNS, Kerberos and credential-id fields are likewise carried for
//! protocol handlers to read. Only `threads`, `jitter` and the output,
//! module and obfuscation options are acted on by the core itself.

use crate::config::DEFAULT_THREADS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arguments for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArgs {
    /// Selected protocol (`None` when only generic flags were given)
    pub protocol: Option<String>,
    /// Raw target expressions or file paths
    pub targets: Vec<String>,

    // Generic
    pub threads: usize,
    pub timeout: Option<u64>,
    /// Per-target delay: `N` for 0..=N seconds, `A-B` for A..=B
    pub jitter: Option<String>,

    // Output
    pub no_progress: bool,
    pub log: Option<String>,
    pub verbose: bool,
    pub debug: bool,

    // DNS
    pub force_ipv6: bool,
    pub dns_server: Option<String>,
    pub dns_tcp: bool,
    pub dns_timeout: u64,

    // Modules
    pub modules: Vec<String>,
    pub module_options: Vec<String>,
    pub list_modules: bool,
    pub show_module_options: bool,

    // Kerberos
    pub kerberos: bool,
    pub use_kcache: bool,
    pub aes_key: Vec<String>,
    pub kdc_host: Option<String>,

    // Obfuscation
    pub obfs: bool,
    pub clear_obfscripts: bool,

    /// Stored-credential ids; `a-b` ranges already expanded
    pub cred_id: Vec<u32>,

    /// Protocol-contributed options keyed by argument id
    pub extra: BTreeMap<String, Vec<String>>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            protocol: None,
            targets: Vec::new(),
            threads: DEFAULT_THREADS,
            timeout: None,
            jitter: None,
            no_progress: false,
            log: None,
            verbose: false,
            debug: false,
            force_ipv6: false,
            dns_server: None,
            dns_tcp: false,
            dns_timeout: 3,
            modules: Vec::new(),
            module_options: Vec::new(),
            list_modules: false,
            show_module_options: false,
            kerberos: false,
            use_kcache: false,
            aes_key: Vec::new(),
            kdc_host: None,
            obfs: false,
            clear_obfscripts: false,
            cred_id: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl RunArgs {
    pub fn for_protocol(protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
            ..Self::default()
        }
    }

    /// Parsed `--jitter`, if one was given.
    pub fn jitter(&self) -> Result<Option<Jitter>> {
        self.jitter.as_deref().map(Jitter::parse).transpose()
    }

    /// First value of a protocol-contributed option.
    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// A contributed flag counts as set unless its value is empty or `false`.
    pub fn extra_flag(&self, key: &str) -> bool {
        matches!(self.extra_value(key), Some(v) if !v.is_empty() && v != "false")
    }
}

/// Random delay bounds, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    min: f64,
    max: f64,
}

impl Jitter {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("invalid jitter interval '{}'", raw));
        let seconds = |value: &str| -> Result<f64> {
            value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(invalid)
        };

        let (min, max) = match raw.split_once('-') {
            Some((min, max)) => (seconds(min)?, seconds(max)?),
            None => (0.0, seconds(raw)?),
        };
        if min > max {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// Expand credential ids, turning `a-b` into the inclusive range.
pub fn expand_cred_ids<S: AsRef<str>>(raw: &[S]) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for item in raw {
        let item = item.as_ref().trim();
        if let Some((start, end)) = item.split_once('-') {
            let start = parse_cred_id(start)?;
            let end = parse_cred_id(end)?;
            if start > end {
                return Err(Error::InvalidInput(format!(
                    "credential id range '{}' is reversed",
                    item
                )));
            }
            ids.extend(start..=end);
        } else {
            ids.push(parse_cred_id(item)?);
        }
    }
    Ok(ids)
}

fn parse_cred_id(value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid credential id '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = RunArgs::default();
        assert_eq!(args.threads, 256);
        assert_eq!(args.dns_timeout, 3);
        assert!(!args.no_progress);
    }

    #[test]
    fn test_extra_accessors() {
        let mut args = RunArgs::for_protocol("ssh");
        args.extra.insert("key_file".into(), vec!["/tmp/id_rsa".into()]);
        args.extra.insert("no_bruteforce".into(), vec!["false".into()]);

        assert_eq!(args.extra_value("key_file"), Some("/tmp/id_rsa"));
        assert!(args.extra_flag("key_file"));
        assert!(!args.extra_flag("no_bruteforce"));
        assert!(!args.extra_flag("missing"));
    }

    #[test]
    fn test_jitter_forms() {
        assert_eq!(Jitter::parse("3").unwrap().bounds(), (0.0, 3.0));
        assert_eq!(Jitter::parse("1-5").unwrap().bounds(), (1.0, 5.0));
        assert_eq!(Jitter::parse("0.5").unwrap().bounds(), (0.0, 0.5));

        assert!(Jitter::parse("abc").is_err());
        assert!(Jitter::parse("5-1").is_err());
        assert!(Jitter::parse("-1").is_err());

        let mut args = RunArgs::default();
        assert_eq!(args.jitter().unwrap(), None);
        args.jitter = Some("2".into());
        assert_eq!(args.jitter().unwrap().map(|j| j.bounds()), Some((0.0, 2.0)));
    }

    #[test]
    fn test_expand_cred_ids() {
        let ids = expand_cred_ids(&["1", "4-6", " 9 "]).unwrap();
        assert_eq!(ids, vec![1, 4, 5, 6, 9]);
    }

    #[test]
    fn test_expand_cred_ids_rejects_garbage() {
        assert!(expand_cred_ids(&["x"]).is_err());
        assert!(expand_cred_ids(&["5-2"]).is_err());
    }
}
