//! Plugin discovery - enumerate protocol and extension units
//!
//! Discovery walks every namespace in search order. A protocol is a package
//! under `protocols` whose base unit imports cleanly; its companions
//! (`database`, `db_navigator`, `proto_args`) are probed by convention and a
//! failed probe only means the companion is absent. Extensions are file units
//! under `modules`; they are listed without being imported.

use super::namespace::{PluginNamespace, UnitKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const PROTOCOL_NAMESPACE: &str = "protocols";
pub const MODULE_NAMESPACE: &str = "modules";

/// The extension template shipped for authors; never discovered.
pub const TEMPLATE_MODULE: &str = "example_module";

/// Where a unit lives: its namespace and dotted path
#[derive(Clone)]
pub struct UnitLocator {
    namespace: Arc<PluginNamespace>,
    path: String,
}

impl UnitLocator {
    pub fn new(namespace: Arc<PluginNamespace>, path: impl Into<String>) -> Self {
        Self {
            namespace,
            path: path.into(),
        }
    }

    pub fn namespace(&self) -> &PluginNamespace {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The last path segment, e.g. `banner` for `modules.banner`.
    pub fn unit_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

impl PartialEq for UnitLocator {
    fn eq(&self, other: &Self) -> bool {
        self.namespace.name() == other.namespace.name() && self.path == other.path
    }
}

impl Eq for UnitLocator {}

impl fmt::Display for UnitLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.name(), self.path)
    }
}

impl fmt::Debug for UnitLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitLocator({})", self)
    }
}

/// Optional companion units of a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompanionKind {
    Database,
    Navigator,
    Args,
}

impl CompanionKind {
    pub const ALL: [CompanionKind; 3] = [
        CompanionKind::Database,
        CompanionKind::Navigator,
        CompanionKind::Args,
    ];

    /// Conventional unit name under the protocol package
    pub fn suffix(&self) -> &'static str {
        match self {
            CompanionKind::Database => "database",
            CompanionKind::Navigator => "db_navigator",
            CompanionKind::Args => "proto_args",
        }
    }
}

/// A discovered protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub locator: UnitLocator,
    /// Only companions whose probe import succeeded
    pub companions: BTreeMap<CompanionKind, UnitLocator>,
}

impl PluginDescriptor {
    pub fn companion(&self, kind: CompanionKind) -> Option<&UnitLocator> {
        self.companions.get(&kind)
    }
}

/// Resolves descriptors across namespaces, later namespaces taking precedence
#[derive(Debug, Clone, Default)]
pub struct DescriptorResolver {
    namespaces: Vec<Arc<PluginNamespace>>,
}

impl DescriptorResolver {
    pub fn new(namespaces: Vec<Arc<PluginNamespace>>) -> Self {
        Self { namespaces }
    }

    pub fn with_namespace(mut self, namespace: Arc<PluginNamespace>) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn namespaces(&self) -> &[Arc<PluginNamespace>] {
        &self.namespaces
    }

    /// Every loadable protocol, keyed by name.
    pub fn discover_protocols(&self) -> BTreeMap<String, PluginDescriptor> {
        let mut found = BTreeMap::new();

        for namespace in &self.namespaces {
            for (name, kind) in namespace.children(PROTOCOL_NAMESPACE) {
                if kind != UnitKind::Package {
                    debug!(namespace = namespace.name(), unit = %name, "Skipping non-package protocol unit");
                    continue;
                }

                let path = format!("{}.{}", PROTOCOL_NAMESPACE, name);
                if let Err(e) = namespace.import(&path) {
                    debug!(namespace = namespace.name(), protocol = %name, "Protocol skipped: {}", e);
                    continue;
                }

                let mut companions = BTreeMap::new();
                for companion in CompanionKind::ALL {
                    let companion_path = format!("{}.{}", path, companion.suffix());
                    if !namespace.contains(&companion_path) {
                        continue;
                    }
                    match namespace.import(&companion_path) {
                        Ok(_) => {
                            companions.insert(
                                companion,
                                UnitLocator::new(Arc::clone(namespace), companion_path),
                            );
                        }
                        Err(e) => {
                            debug!(protocol = %name, companion = companion.suffix(), "Companion unavailable: {}", e)
                        }
                    }
                }

                let descriptor = PluginDescriptor {
                    name: name.clone(),
                    locator: UnitLocator::new(Arc::clone(namespace), path),
                    companions,
                };
                if let Some(previous) = found.insert(name.clone(), descriptor) {
                    debug!(protocol = %name, shadowed = %previous.locator, "Protocol overridden by later namespace");
                }
            }
        }

        found
    }

    /// Locators of every extension file unit, sorted by unit name.
    ///
    /// Nothing is imported here; validity is judged at load time.
    pub fn discover_extensions(&self) -> Vec<UnitLocator> {
        let mut found: BTreeMap<String, UnitLocator> = BTreeMap::new();

        for namespace in &self.namespaces {
            for (name, kind) in namespace.children(MODULE_NAMESPACE) {
                if kind != UnitKind::File || name == TEMPLATE_MODULE {
                    continue;
                }
                let path = format!("{}.{}", MODULE_NAMESPACE, name);
                found.insert(name, UnitLocator::new(Arc::clone(namespace), path));
            }
        }

        found.into_values().collect()
    }

    /// The extension locator whose unit name is `name`.
    pub fn find_extension(&self, name: &str) -> Option<UnitLocator> {
        self.discover_extensions()
            .into_iter()
            .find(|locator| locator.unit_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::namespace::Unit;
    use crate::plugin::traits::SchemaInitializer;
    use nexec_foundation::{Error, ProtocolStore, Result};

    struct NoSchema;

    impl SchemaInitializer for NoSchema {
        fn init_schema(&self, _store: &ProtocolStore) -> Result<()> {
            Ok(())
        }
    }

    fn ok_unit() -> Result<Unit> {
        Ok(Unit::SchemaInit(Arc::new(NoSchema)))
    }

    fn broken() -> Result<Unit> {
        Err(Error::Internal("cannot import".into()))
    }

    #[test]
    fn test_broken_protocol_does_not_hide_siblings() {
        let mut ns = PluginNamespace::new("test");
        ns.register_package("protocols.alpha", ok_unit)
            .register_package("protocols.beta", broken)
            .register_package("protocols.gamma", ok_unit);

        let found = DescriptorResolver::new(vec![Arc::new(ns)]).discover_protocols();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["alpha", "gamma"]);
    }

    #[test]
    fn test_companions_are_probed() {
        let mut ns = PluginNamespace::new("test");
        ns.register_package("protocols.smb", ok_unit)
            .register_file("protocols.smb.database", ok_unit)
            .register_file("protocols.smb.db_navigator", broken);

        let found = DescriptorResolver::new(vec![Arc::new(ns)]).discover_protocols();
        let smb = &found["smb"];
        assert_eq!(
            smb.companion(CompanionKind::Database).map(|l| l.path()),
            Some("protocols.smb.database")
        );
        assert!(smb.companion(CompanionKind::Navigator).is_none());
        assert!(smb.companion(CompanionKind::Args).is_none());
    }

    #[test]
    fn test_file_units_are_not_protocols() {
        let mut ns = PluginNamespace::new("test");
        ns.register_file("protocols.loose", ok_unit);

        assert!(DescriptorResolver::new(vec![Arc::new(ns)])
            .discover_protocols()
            .is_empty());
    }

    #[test]
    fn test_later_namespace_wins() {
        let mut builtin = PluginNamespace::new("builtin");
        builtin.register_package("protocols.smb", ok_unit);
        let mut overlay = PluginNamespace::new("overlay");
        overlay.register_package("protocols.smb", ok_unit);

        let found =
            DescriptorResolver::new(vec![Arc::new(builtin), Arc::new(overlay)]).discover_protocols();
        assert_eq!(found["smb"].locator.namespace().name(), "overlay");
    }

    #[test]
    fn test_extension_listing_skips_template_and_packages() {
        let mut ns = PluginNamespace::new("test");
        ns.register_file("modules.zeta", broken)
            .register_file("modules.alpha", ok_unit)
            .register_file("modules.example_module", ok_unit)
            .register_package("modules.bundle", ok_unit);

        let resolver = DescriptorResolver::new(vec![Arc::new(ns)]);
        let names: Vec<_> = resolver
            .discover_extensions()
            .iter()
            .map(|l| l.unit_name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(resolver.find_extension("zeta").is_some());
        assert!(resolver.find_extension("example_module").is_none());
    }
}
