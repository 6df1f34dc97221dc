//! Built-in plugins
//!
//! - `tcp` protocol with all three companions
//! - `banner` extension
//! - `example_module` extension template

pub mod banner;
pub mod example;
pub mod tcp;

use crate::plugin::{PluginNamespace, Unit};
use std::sync::Arc;

/// Name of the namespace holding the built-in units
pub const BUILTIN_NAMESPACE: &str = "nexec";

/// Namespace with every built-in unit registered.
pub fn builtin_namespace() -> PluginNamespace {
    let mut ns = PluginNamespace::new(BUILTIN_NAMESPACE);

    ns.register_package("protocols.tcp", || {
        Ok(Unit::Protocol(Arc::new(tcp::TcpProtocol)))
    })
    .register_file("protocols.tcp.database", || {
        Ok(Unit::SchemaInit(Arc::new(tcp::TcpSchema)))
    })
    .register_file("protocols.tcp.db_navigator", || {
        Ok(Unit::Navigator(Arc::new(tcp::TcpNavigator)))
    })
    .register_file("protocols.tcp.proto_args", || {
        Ok(Unit::Args(Arc::new(tcp::TcpArgs)))
    });

    ns.register_file("modules.banner", || {
        Ok(Unit::Extension(Arc::new(banner::BannerFactory)))
    })
    .register_file("modules.example_module", || {
        Ok(Unit::Extension(Arc::new(example::ExampleFactory)))
    });

    ns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{CompanionKind, DescriptorResolver, ExtensionLoader, ProtocolLoader};

    #[test]
    fn test_builtin_registry() {
        let resolver = DescriptorResolver::new(vec![Arc::new(builtin_namespace())]);

        let protocols = resolver.discover_protocols();
        let tcp = &protocols["tcp"];
        for kind in CompanionKind::ALL {
            assert!(tcp.companion(kind).is_some(), "missing {:?}", kind);
        }
        let handle = ProtocolLoader::new().load(tcp).unwrap();
        assert!(handle.schema_init().is_some());
        assert!(handle.navigator().is_some());

        let modules = ExtensionLoader::new(resolver).list_all();
        assert_eq!(modules.keys().collect::<Vec<_>>(), vec!["banner"]);
    }

    #[test]
    fn test_template_is_valid_but_hidden() {
        use crate::plugin::{validate, ExtensionFactory};
        let descriptor = validate(&example::ExampleFactory.declaration(), example::NAME).unwrap();
        assert!(descriptor.requires_elevated_access);
    }
}
