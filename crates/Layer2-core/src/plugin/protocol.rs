//! Protocol loader - turn a descriptor into a runnable handle

use super::discovery::{CompanionKind, PluginDescriptor, UnitLocator};
use super::namespace::{panic_message, ImportError, Unit};
use super::traits::{ArgContributor, ProtocolHandler, ResultNavigator, SchemaInitializer};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("'{locator}' is a {found} unit, not a protocol")]
    WrongKind { locator: String, found: &'static str },
}

/// A loaded protocol and whichever companions it ships
#[derive(Clone)]
pub struct ProtocolHandle {
    name: String,
    handler: Arc<dyn ProtocolHandler>,
    schema_init: Option<Arc<dyn SchemaInitializer>>,
    navigator: Option<Arc<dyn ResultNavigator>>,
    arg_contribution: Option<Arc<dyn ArgContributor>>,
}

impl ProtocolHandle {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ProtocolHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            schema_init: None,
            navigator: None,
            arg_contribution: None,
        }
    }

    pub fn with_schema_init(mut self, schema_init: Arc<dyn SchemaInitializer>) -> Self {
        self.schema_init = Some(schema_init);
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn ResultNavigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_arg_contribution(mut self, contribution: Arc<dyn ArgContributor>) -> Self {
        self.arg_contribution = Some(contribution);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<dyn ProtocolHandler> {
        &self.handler
    }

    pub fn schema_init(&self) -> Option<&Arc<dyn SchemaInitializer>> {
        self.schema_init.as_ref()
    }

    pub fn navigator(&self) -> Option<&Arc<dyn ResultNavigator>> {
        self.navigator.as_ref()
    }

    pub fn arg_contribution(&self) -> Option<&Arc<dyn ArgContributor>> {
        self.arg_contribution.as_ref()
    }
}

impl fmt::Debug for ProtocolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolHandle")
            .field("name", &self.name)
            .field("schema_init", &self.schema_init.is_some())
            .field("navigator", &self.navigator.is_some())
            .field("arg_contribution", &self.arg_contribution.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolLoader;

impl ProtocolLoader {
    pub fn new() -> Self {
        Self
    }

    /// Import the protocol entry point and resolve its companions.
    ///
    /// Only the entry point is required; a companion that no longer imports
    /// or has the wrong shape is dropped.
    pub fn load(&self, descriptor: &PluginDescriptor) -> Result<ProtocolHandle, LoadError> {
        let handler = match import(&descriptor.locator)? {
            Unit::Protocol(handler) => handler,
            other => {
                return Err(LoadError::WrongKind {
                    locator: descriptor.locator.to_string(),
                    found: other.kind_name(),
                })
            }
        };

        let mut handle = ProtocolHandle::new(descriptor.name.clone(), handler);
        for (kind, locator) in &descriptor.companions {
            let unit = match import(locator) {
                Ok(unit) => unit,
                Err(e) => {
                    debug!(protocol = %descriptor.name, "Companion dropped: {}", e);
                    continue;
                }
            };
            handle = match (kind, unit) {
                (CompanionKind::Database, Unit::SchemaInit(s)) => handle.with_schema_init(s),
                (CompanionKind::Navigator, Unit::Navigator(n)) => handle.with_navigator(n),
                (CompanionKind::Args, Unit::Args(a)) => handle.with_arg_contribution(a),
                (kind, unit) => {
                    debug!(
                        protocol = %descriptor.name,
                        companion = kind.suffix(),
                        found = unit.kind_name(),
                        "Companion has the wrong shape"
                    );
                    handle
                }
            };
        }

        Ok(handle)
    }

    /// Let the protocol extend its argument surface.
    ///
    /// The hook works on a copy; if it fails or panics the error is logged
    /// and `base` comes back untouched.
    pub fn contribute_args(&self, handle: &ProtocolHandle, base: clap::Command) -> clap::Command {
        let Some(contributor) = handle.arg_contribution() else {
            return base;
        };

        let candidate = base.clone();
        match catch_unwind(AssertUnwindSafe(|| contributor.contribute(candidate))) {
            Ok(Ok(command)) => command,
            Ok(Err(e)) => {
                error!(protocol = %handle.name(), "Error loading proto_args: {}", e);
                base
            }
            Err(payload) => {
                error!(
                    protocol = %handle.name(),
                    "Error loading proto_args: {}",
                    panic_message(payload.as_ref())
                );
                base
            }
        }
    }
}

fn import(locator: &UnitLocator) -> Result<Unit, ImportError> {
    locator.namespace().import(locator.path())
}
