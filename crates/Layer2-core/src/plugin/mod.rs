//! Plugin System - protocol plugins and extension modules
//!
//! ## Architecture
//!
//! ```text
//! PluginNamespace(s) ──► DescriptorResolver ──► PluginDescriptor ──► ProtocolLoader ──► ProtocolHandle
//!                                          └──► UnitLocator ───────► ExtensionLoader ──► ExtensionInstance
//! ```
//!
//! - `namespace` - dotted-locator unit tree, import with panic isolation
//! - `discovery` - protocol/extension enumeration across namespaces
//! - `protocol` - protocol handle and argument contribution
//! - `manifest` - extension declaration and structural validation
//! - `extension` - extension load, describe, configure

mod discovery;
mod extension;
mod manifest;
mod namespace;
mod protocol;
mod traits;

pub use discovery::{
    CompanionKind, DescriptorResolver, PluginDescriptor, UnitLocator, MODULE_NAMESPACE,
    PROTOCOL_NAMESPACE, TEMPLATE_MODULE,
};
pub use extension::{
    parse_module_options, ConfigurationError, ExtensionError, ExtensionInstance,
    ExtensionLoader, LoadedExtension,
};
pub use manifest::{
    validate, Entrypoints, ExtensionCategory, ExtensionDeclaration, ExtensionDescriptor,
    ValidationError,
};
pub use namespace::{ImportError, PluginNamespace, Unit, UnitKind};
pub use protocol::{LoadError, ProtocolHandle, ProtocolLoader};
pub use traits::{
    ArgContributor, ExtensionFactory, ExtensionModule, ModuleOptions, ProtocolHandler,
    ResultNavigator, SchemaInitializer,
};

pub(crate) use namespace::panic_message;
