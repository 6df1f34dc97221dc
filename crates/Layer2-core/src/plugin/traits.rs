//! Plugin traits - the interfaces protocol and extension units implement

use super::manifest::ExtensionDeclaration;
use crate::context::{Context, LoginEvent};
use crate::target::TargetSpec;
use async_trait::async_trait;
use nexec_foundation::{ProtocolStore, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parsed extension options; keys are uppercased
pub type ModuleOptions = BTreeMap<String, String>;

// ============================================================================
// Protocol units
// ============================================================================

/// The protocol entry point, invoked once per target.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Connect to `target`, authenticate, and perform the requested actions.
    ///
    /// An error here fails this target only.
    async fn run(&self, ctx: Arc<Context>, target: TargetSpec) -> Result<()>;
}

/// `database` companion: prepares the protocol's result store.
pub trait SchemaInitializer: Send + Sync {
    fn init_schema(&self, store: &ProtocolStore) -> Result<()>;
}

/// `db_navigator` companion: renders stored results.
pub trait ResultNavigator: Send + Sync {
    fn summarize(&self, store: &ProtocolStore) -> Result<Vec<String>>;
}

/// `proto_args` companion: extends the protocol's argument surface.
pub trait ArgContributor: Send + Sync {
    /// Receives the protocol's subcommand and returns it with extra arguments.
    fn contribute(&self, command: clap::Command) -> Result<clap::Command>;
}

// ============================================================================
// Extension units
// ============================================================================

/// What an extension unit exposes before instantiation.
pub trait ExtensionFactory: Send + Sync {
    fn declaration(&self) -> ExtensionDeclaration;

    fn instantiate(&self) -> Result<Box<dyn ExtensionModule>>;
}

/// A live extension.
///
/// `options` is called exactly once, before any hook.
#[async_trait]
pub trait ExtensionModule: Send + Sync {
    fn options(&mut self, ctx: &Context, options: &ModuleOptions) -> Result<()>;

    async fn on_login(&self, _ctx: &Context, _event: &LoginEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_admin_login(&self, _ctx: &Context, _event: &LoginEvent<'_>) -> Result<()> {
        Ok(())
    }
}
