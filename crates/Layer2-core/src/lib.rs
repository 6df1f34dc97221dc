//! nexec-core: plugin registry, extension loader, and concurrent dispatch
//!
//! ## Modules
//!
//! - `plugin` - namespaces, discovery, protocol and extension loading
//! - `context` - shared run context and scoped logger
//! - `target` - target expressions and scan report import
//! - `dispatch` - bounded fan-out of a protocol handler across targets
//! - `runner` - end-to-end run orchestration and module listing
//! - `builtin` - the `tcp` protocol and its extensions
//!
//! ## Quick start
//!
//! ```ignore
//! use nexec_core::{builtin_namespace, DescriptorResolver, Runner};
//! use std::sync::Arc;
//!
//! let resolver = DescriptorResolver::new(vec![Arc::new(builtin_namespace())]);
//! let runner = Runner::new(resolver, paths, config);
//! let summary = runner.execute(RunArgs::for_protocol("tcp")).await?;
//! ```

pub mod builtin;
pub mod context;
pub mod dispatch;
pub mod plugin;
pub mod runner;
pub mod target;

pub use builtin::{builtin_namespace, BUILTIN_NAMESPACE};
pub use context::{Context, ContextLogger, LoginEvent};
pub use dispatch::{DispatchEngine, DispatchError, ProgressObserver, RunOutcome, TerminalProgress};
pub use plugin::{
    ArgContributor, CompanionKind, ConfigurationError, DescriptorResolver, Entrypoints,
    ExtensionCategory, ExtensionDeclaration, ExtensionDescriptor, ExtensionError,
    ExtensionFactory, ExtensionInstance, ExtensionLoader, ExtensionModule, ImportError,
    LoadError, LoadedExtension, ModuleOptions, PluginDescriptor, PluginNamespace,
    ProtocolHandle, ProtocolHandler, ProtocolLoader, ResultNavigator, SchemaInitializer, Unit,
    UnitKind, UnitLocator, ValidationError,
};
pub use runner::{check_preconditions, FatalRunError, RunSummary, Runner};
pub use target::{parse_targets, resolve_targets, TargetSpec};

// Re-export foundation types
pub use nexec_foundation::{Error, NexecConfig, NexecPaths, ProtocolStore, Result, RunArgs};
