//! Extension loader - validate, instantiate, and configure extension units
//!
//! Loading never fails loudly: an extension that cannot be imported, is of
//! the wrong kind, or breaks its declared contract is logged and reported as
//! absent. Configuration consumes the loaded extension, so an instance can be
//! configured at most once.

use super::discovery::{DescriptorResolver, UnitLocator};
use super::manifest::{validate, ExtensionDescriptor, ValidationError};
use super::namespace::{panic_message, ImportError, Unit};
use super::traits::{ExtensionFactory, ExtensionModule, ModuleOptions};
use crate::context::{Context, LoginEvent};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Why a unit did not yield a usable extension
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("'{locator}' is a {found} unit, not an extension")]
    WrongKind { locator: String, found: &'static str },

    #[error("Failed loading module at {locator}: {source}")]
    Invalid {
        locator: String,
        #[source]
        source: ValidationError,
    },

    #[error("Failed to instantiate module {module}: {reason}")]
    Instantiate { module: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Malformed option '{0}', expected KEY=value")]
    MalformedOption(String),

    #[error("Module {module} rejected its options: {reason}")]
    Rejected { module: String, reason: String },
}

/// Validated and instantiated, not yet configured
pub struct LoadedExtension {
    descriptor: ExtensionDescriptor,
    module: Box<dyn ExtensionModule>,
}

impl LoadedExtension {
    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for LoadedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedExtension")
            .field("name", &self.descriptor.name)
            .finish()
    }
}

/// A configured extension bound to its own module context
pub struct ExtensionInstance {
    descriptor: ExtensionDescriptor,
    module: Box<dyn ExtensionModule>,
    context: Context,
}

impl ExtensionInstance {
    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run the login hooks that apply to `event`.
    ///
    /// The standard hook always runs; the admin hook follows it when the
    /// session has administrative rights.
    pub async fn on_login(&self, event: &LoginEvent<'_>) -> nexec_foundation::Result<()> {
        self.module.on_login(&self.context, event).await?;
        if event.admin {
            self.module.on_admin_login(&self.context, event).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExtensionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionInstance")
            .field("name", &self.descriptor.name)
            .finish()
    }
}

/// Split `KEY=value` pairs on the first `=`, uppercasing keys.
pub fn parse_module_options<S: AsRef<str>>(
    raw: &[S],
) -> Result<ModuleOptions, ConfigurationError> {
    raw.iter()
        .map(|item| {
            let item = item.as_ref();
            item.split_once('=')
                .map(|(key, value)| (key.trim().to_uppercase(), value.to_string()))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| ConfigurationError::MalformedOption(item.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ExtensionLoader {
    resolver: DescriptorResolver,
}

impl ExtensionLoader {
    pub fn new(resolver: DescriptorResolver) -> Self {
        Self { resolver }
    }

    /// Import a unit and validate its declaration, without instantiating it.
    pub fn inspect(
        &self,
        locator: &UnitLocator,
    ) -> Result<(Arc<dyn ExtensionFactory>, ExtensionDescriptor), ExtensionError> {
        let factory = match locator.namespace().import(locator.path())? {
            Unit::Extension(factory) => factory,
            other => {
                return Err(ExtensionError::WrongKind {
                    locator: locator.to_string(),
                    found: other.kind_name(),
                })
            }
        };

        let descriptor = validate(&factory.declaration(), locator.unit_name()).map_err(
            |source| ExtensionError::Invalid {
                locator: locator.to_string(),
                source,
            },
        )?;

        Ok((factory, descriptor))
    }

    /// Validated metadata, or `None` when the unit is unusable.
    pub fn describe(&self, locator: &UnitLocator) -> Option<ExtensionDescriptor> {
        match self.inspect(locator) {
            Ok((_, descriptor)) => Some(descriptor),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    /// Validate and instantiate, or `None` when the unit is unusable.
    pub fn load(&self, locator: &UnitLocator) -> Option<LoadedExtension> {
        let result = self.inspect(locator).and_then(|(factory, descriptor)| {
            let module = match catch_unwind(AssertUnwindSafe(|| factory.instantiate())) {
                Ok(Ok(module)) => module,
                Ok(Err(e)) => {
                    return Err(ExtensionError::Instantiate {
                        module: descriptor.name.clone(),
                        reason: e.to_string(),
                    })
                }
                Err(payload) => {
                    return Err(ExtensionError::Instantiate {
                        module: descriptor.name.clone(),
                        reason: panic_message(payload.as_ref()),
                    })
                }
            };
            Ok(LoadedExtension { descriptor, module })
        });

        match result {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    /// Hand the parsed options to the extension's configuration hook.
    ///
    /// The instance is bound to a module-scoped view of `ctx`.
    pub fn configure<S: AsRef<str>>(
        &self,
        loaded: LoadedExtension,
        ctx: &Context,
        raw_options: &[S],
    ) -> Result<ExtensionInstance, ConfigurationError> {
        let options = parse_module_options(raw_options)?;
        let LoadedExtension {
            descriptor,
            mut module,
        } = loaded;
        let module_ctx = ctx.for_module(&descriptor.name);

        let outcome = catch_unwind(AssertUnwindSafe(|| module.options(&module_ctx, &options)));
        let reason = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(reason) = reason {
            error!(module = %descriptor.name, "Error loading module options: {}", reason);
            return Err(ConfigurationError::Rejected {
                module: descriptor.name,
                reason,
            });
        }

        Ok(ExtensionInstance {
            descriptor,
            module,
            context: module_ctx,
        })
    }

    /// Every valid extension, keyed by name. Invalid units are left out.
    pub fn list_all(&self) -> BTreeMap<String, ExtensionDescriptor> {
        self.resolver
            .discover_extensions()
            .iter()
            .filter_map(|locator| self.describe(locator))
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect()
    }

    pub fn resolver(&self) -> &DescriptorResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_options() {
        let options = parse_module_options(&["bytes=64", "filter=a=b"]).unwrap();
        assert_eq!(options.get("BYTES").map(String::as_str), Some("64"));
        assert_eq!(options.get("FILTER").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_module_options_rejects_bare_keys() {
        assert!(matches!(
            parse_module_options(&["VERBOSE"]),
            Err(ConfigurationError::MalformedOption(_))
        ));
        assert!(parse_module_options(&["=x"]).is_err());
    }
}
