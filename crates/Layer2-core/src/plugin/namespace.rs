//! Plugin namespace - a searchable tree of importable units
//!
//! Units are addressed by dotted locators such as `protocols.tcp` or
//! `protocols.tcp.database`. A `Package` may own nested units; a `File` is a
//! leaf. Registering a unit does not run it: the loader closure is only
//! called on `import`, and a panicking loader surfaces as an import error.

use super::traits::{
    ArgContributor, ExtensionFactory, ProtocolHandler, ResultNavigator, SchemaInitializer,
};
use nexec_foundation::Result;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Whether a unit can own nested units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Package,
    File,
}

/// What importing a unit yields
#[derive(Clone)]
pub enum Unit {
    Protocol(Arc<dyn ProtocolHandler>),
    SchemaInit(Arc<dyn SchemaInitializer>),
    Navigator(Arc<dyn ResultNavigator>),
    Args(Arc<dyn ArgContributor>),
    Extension(Arc<dyn ExtensionFactory>),
}

impl Unit {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Unit::Protocol(_) => "protocol",
            Unit::SchemaInit(_) => "database",
            Unit::Navigator(_) => "db_navigator",
            Unit::Args(_) => "proto_args",
            Unit::Extension(_) => "extension",
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit({})", self.kind_name())
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No unit registered at '{0}'")]
    NotFound(String),

    #[error("Import of '{locator}' failed: {reason}")]
    Failed { locator: String, reason: String },

    #[error("Import of '{locator}' panicked: {message}")]
    Panicked { locator: String, message: String },
}

type UnitLoader = Arc<dyn Fn() -> Result<Unit> + Send + Sync>;

#[derive(Clone)]
struct UnitEntry {
    kind: UnitKind,
    loader: UnitLoader,
}

/// One searchable namespace, e.g. the built-in units or a user overlay
#[derive(Clone)]
pub struct PluginNamespace {
    name: String,
    units: BTreeMap<String, UnitEntry>,
}

impl PluginNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a package unit. Re-registering a locator replaces it.
    pub fn register_package<F>(&mut self, locator: impl Into<String>, loader: F) -> &mut Self
    where
        F: Fn() -> Result<Unit> + Send + Sync + 'static,
    {
        self.insert(locator.into(), UnitKind::Package, Arc::new(loader))
    }

    /// Register a single-file unit. Re-registering a locator replaces it.
    pub fn register_file<F>(&mut self, locator: impl Into<String>, loader: F) -> &mut Self
    where
        F: Fn() -> Result<Unit> + Send + Sync + 'static,
    {
        self.insert(locator.into(), UnitKind::File, Arc::new(loader))
    }

    fn insert(&mut self, locator: String, kind: UnitKind, loader: UnitLoader) -> &mut Self {
        self.units.insert(locator, UnitEntry { kind, loader });
        self
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.units.contains_key(locator)
    }

    pub fn kind(&self, locator: &str) -> Option<UnitKind> {
        self.units.get(locator).map(|entry| entry.kind)
    }

    /// Immediate children of `prefix`, in lexicographic order.
    pub fn children(&self, prefix: &str) -> Vec<(String, UnitKind)> {
        let head = format!("{}.", prefix);
        self.units
            .range(head.clone()..)
            .take_while(|(locator, _)| locator.starts_with(&head))
            .filter_map(|(locator, entry)| {
                let rest = &locator[head.len()..];
                (!rest.is_empty() && !rest.contains('.')).then(|| (rest.to_string(), entry.kind))
            })
            .collect()
    }

    /// Run the unit's loader.
    pub fn import(&self, locator: &str) -> std::result::Result<Unit, ImportError> {
        let entry = self
            .units
            .get(locator)
            .ok_or_else(|| ImportError::NotFound(locator.to_string()))?;

        match catch_unwind(AssertUnwindSafe(|| (entry.loader)())) {
            Ok(Ok(unit)) => Ok(unit),
            Ok(Err(e)) => Err(ImportError::Failed {
                locator: locator.to_string(),
                reason: e.to_string(),
            }),
            Err(payload) => Err(ImportError::Panicked {
                locator: locator.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for PluginNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginNamespace")
            .field("name", &self.name)
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::traits::SchemaInitializer;
    use nexec_foundation::{Error, ProtocolStore};

    struct NoSchema;

    impl SchemaInitializer for NoSchema {
        fn init_schema(&self, _store: &ProtocolStore) -> Result<()> {
            Ok(())
        }
    }

    fn schema_unit() -> Result<Unit> {
        Ok(Unit::SchemaInit(Arc::new(NoSchema)))
    }

    #[test]
    fn test_children_are_immediate_and_sorted() {
        let mut ns = PluginNamespace::new("test");
        ns.register_package("protocols.smb", schema_unit)
            .register_file("protocols.smb.database", schema_unit)
            .register_package("protocols.ftp", schema_unit)
            .register_file("protocolsx.bogus", schema_unit)
            .register_file("modules.enum", schema_unit);

        let children = ns.children("protocols");
        assert_eq!(
            children,
            vec![
                ("ftp".to_string(), UnitKind::Package),
                ("smb".to_string(), UnitKind::Package),
            ]
        );
        assert_eq!(
            ns.children("protocols.smb"),
            vec![("database".to_string(), UnitKind::File)]
        );
    }

    #[test]
    fn test_import_errors() {
        let mut ns = PluginNamespace::new("test");
        ns.register_file("modules.broken", || Err(Error::Internal("syntax".into())));
        ns.register_file("modules.panics", || panic!("boom"));

        assert!(matches!(ns.import("modules.none"), Err(ImportError::NotFound(_))));
        assert!(matches!(ns.import("modules.broken"), Err(ImportError::Failed { .. })));
        match ns.import("modules.panics") {
            Err(ImportError::Panicked { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reregister_replaces() {
        let mut ns = PluginNamespace::new("test");
        ns.register_file("modules.x", || Err(Error::Internal("old".into())));
        ns.register_file("modules.x", schema_unit);

        assert!(ns.import("modules.x").is_ok());
        assert_eq!(ns.kind("modules.x"), Some(UnitKind::File));
    }
}
