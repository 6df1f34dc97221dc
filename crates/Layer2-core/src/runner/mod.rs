//! Runner - one end-to-end run of a protocol against a target set
//!
//! ```text
//! preconditions → targets → protocol lookup/load → store → schema
//!     → obfuscation flags → modules → Context → dispatch → dispose
//! ```
//!
//! Everything before dispatch is fatal on failure. Once the store exists it
//! is disposed on every exit path, including operator interrupt.

mod listing;

pub use listing::{
    render_module_listing, render_module_options, HIGH_PRIVILEGE_HEADER, LOW_PRIVILEGE_HEADER,
};

use crate::context::Context;
use crate::dispatch::{DispatchEngine, ProgressObserver, RunOutcome};
use crate::plugin::{
    DescriptorResolver, ExtensionDescriptor, ExtensionInstance, ExtensionLoader, LoadError,
    PluginDescriptor, ProtocolHandle, ProtocolLoader,
};
use crate::target::{resolve_targets, TargetSpec};
use nexec_foundation::{Error, NexecConfig, NexecPaths, ProtocolStore, RunArgs};
use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable naming the Kerberos credential cache
pub const KRB5CCNAME: &str = "KRB5CCNAME";

/// Conditions that abort a run before any target is touched
#[derive(Debug, thiserror::Error)]
pub enum FatalRunError {
    #[error("No protocol selected")]
    NoProtocol,

    #[error("Protocol '{protocol}' is not available (available: {available})")]
    UnknownProtocol { protocol: String, available: String },

    #[error("Password required with key file")]
    PasswordRequired,

    #[error("KRB5CCNAME not set")]
    MissingCredentialCache,

    #[error("{0}")]
    InvalidJitter(String),

    #[error("Failed to load protocol: {0}")]
    Load(#[from] LoadError),

    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    #[error("Module {module} is not supported for protocol {protocol}")]
    UnsupportedModule { module: String, protocol: String },

    #[error("Protocol '{0}' has no result navigator")]
    NoNavigator(String),

    #[error("Storage setup failed: {0}")]
    Storage(#[source] Error),
}

/// Reject argument combinations that cannot work, before anything is loaded.
pub fn check_preconditions<F>(args: &RunArgs, env: F) -> Result<(), FatalRunError>
where
    F: Fn(&str) -> Option<String>,
{
    if args.extra_flag("key_file") && !args.extra_flag("password") {
        return Err(FatalRunError::PasswordRequired);
    }
    if args.use_kcache && env(KRB5CCNAME).map_or(true, |v| v.is_empty()) {
        return Err(FatalRunError::MissingCredentialCache);
    }
    args.jitter().map_err(|e| FatalRunError::InvalidJitter(e.to_string()))?;
    Ok(())
}

#[derive(Debug)]
pub struct RunSummary {
    pub protocol: String,
    pub outcomes: Vec<RunOutcome>,
    /// Dispatch was abandoned by an operator interrupt; `outcomes` then
    /// holds only the targets that had already finished
    pub interrupted: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct Runner {
    resolver: DescriptorResolver,
    paths: NexecPaths,
    config: NexecConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Runner {
    pub fn new(resolver: DescriptorResolver, paths: NexecPaths, config: NexecConfig) -> Self {
        Self {
            resolver,
            paths,
            config,
            observer: None,
        }
    }

    pub fn with_progress(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn resolver(&self) -> &DescriptorResolver {
        &self.resolver
    }

    pub async fn execute(&self, args: RunArgs) -> Result<RunSummary, FatalRunError> {
        self.execute_until(args, std::future::pending()).await
    }

    /// Like `execute`, but abandons dispatch once `shutdown` completes.
    pub async fn execute_until<S>(
        &self,
        args: RunArgs,
        shutdown: S,
    ) -> Result<RunSummary, FatalRunError>
    where
        S: Future<Output = ()>,
    {
        let protocol = args.protocol.clone().ok_or(FatalRunError::NoProtocol)?;
        check_preconditions(&args, |key| std::env::var(key).ok())?;

        let targets = resolve_targets(&args.targets, &protocol);
        let handle = self.load_protocol(&protocol)?;

        if args.clear_obfscripts {
            self.clear_obfuscated_scripts();
        }

        let store = Arc::new(self.open_store(&protocol)?);
        let result = self
            .run_with_store(&handle, Arc::clone(&store), args, targets, shutdown)
            .await;
        if let Err(e) = store.dispose() {
            warn!("{}", e);
        }
        result
    }

    async fn run_with_store<S>(
        &self,
        handle: &ProtocolHandle,
        store: Arc<ProtocolStore>,
        args: RunArgs,
        targets: Vec<TargetSpec>,
        shutdown: S,
    ) -> Result<RunSummary, FatalRunError>
    where
        S: Future<Output = ()>,
    {
        if let Some(schema) = handle.schema_init() {
            schema.init_schema(&store).map_err(FatalRunError::Storage)?;
        }

        let args = Arc::new(args);
        let base = Context::new(store, Arc::clone(&args)).with_obfuscation(args.obfs);
        let modules = self.init_modules(handle.name(), &base, &args)?;
        let ctx = Arc::new(base.with_modules(modules));

        let mut engine = DispatchEngine::from_args(&args);
        if let Some(observer) = &self.observer {
            engine = engine.with_observer(Arc::clone(observer));
        }

        let mut outcomes = Vec::new();
        let interrupted = tokio::select! {
            _ = engine.run_into(handle, ctx, targets, &mut outcomes) => false,
            _ = shutdown => true,
        };
        if interrupted {
            warn!(
                completed = outcomes.len(),
                "Interrupted, abandoning in-flight targets"
            );
        }

        Ok(RunSummary {
            protocol: handle.name().to_string(),
            outcomes,
            interrupted,
        })
    }

    /// Look up and load `protocol`.
    pub fn load_protocol(&self, protocol: &str) -> Result<ProtocolHandle, FatalRunError> {
        let descriptor = self.descriptor(protocol)?;
        Ok(ProtocolLoader::new().load(&descriptor)?)
    }

    fn descriptor(&self, protocol: &str) -> Result<PluginDescriptor, FatalRunError> {
        let mut registry = self.resolver.discover_protocols();
        registry
            .remove(protocol)
            .ok_or_else(|| FatalRunError::UnknownProtocol {
                protocol: protocol.to_string(),
                available: registry.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    fn open_store(&self, protocol: &str) -> Result<ProtocolStore, FatalRunError> {
        let path = self.paths.protocol_db(&self.config.workspace, protocol);
        ProtocolStore::open(path, protocol).map_err(FatalRunError::Storage)
    }

    fn clear_obfuscated_scripts(&self) {
        let dir = self.paths.obfuscated_scripts_dir();
        if let Err(e) = fs::remove_dir_all(&dir) {
            debug!(path = %dir.display(), "Nothing to clear: {}", e);
        }
        match fs::create_dir_all(&dir) {
            Ok(()) => info!("[+] Cleared cached obfuscated scripts"),
            Err(e) => warn!(path = %dir.display(), "Failed to recreate obfuscated scripts dir: {}", e),
        }
    }

    /// Load, check, and configure each requested module.
    ///
    /// A module that is missing or does not support the protocol aborts the
    /// run; one whose configuration hook fails is left out.
    fn init_modules(
        &self,
        protocol: &str,
        ctx: &Context,
        args: &RunArgs,
    ) -> Result<Vec<ExtensionInstance>, FatalRunError> {
        let loader = ExtensionLoader::new(self.resolver.clone());
        let mut instances = Vec::with_capacity(args.modules.len());

        for name in &args.modules {
            let loaded = self
                .resolver
                .find_extension(name)
                .and_then(|locator| loader.load(&locator))
                .ok_or_else(|| FatalRunError::ModuleNotFound(name.clone()))?;

            if !loaded.descriptor().supports(protocol) {
                return Err(FatalRunError::UnsupportedModule {
                    module: name.clone(),
                    protocol: protocol.to_string(),
                });
            }

            match loader.configure(loaded, ctx, &args.module_options) {
                Ok(instance) => {
                    debug!(module = %name, "Module configured");
                    instances.push(instance);
                }
                Err(e) => warn!(module = %name, "Module excluded from this run: {}", e),
            }
        }

        Ok(instances)
    }

    /// LOW / HIGH PRIVILEGE catalogue of every valid extension.
    pub fn list_modules(&self) -> String {
        render_module_listing(&self.extensions())
    }

    pub fn extensions(&self) -> BTreeMap<String, ExtensionDescriptor> {
        ExtensionLoader::new(self.resolver.clone()).list_all()
    }

    /// Options documentation of the named modules.
    pub fn module_options(&self, names: &[String]) -> Result<String, FatalRunError> {
        let loader = ExtensionLoader::new(self.resolver.clone());
        let mut out = String::new();
        for name in names {
            let descriptor = self
                .resolver
                .find_extension(name)
                .and_then(|locator| loader.describe(&locator))
                .ok_or_else(|| FatalRunError::ModuleNotFound(name.clone()))?;
            out.push_str(&render_module_options(&descriptor));
        }
        Ok(out)
    }

    /// What the protocol has recorded in the current workspace.
    pub fn protocol_results(&self, protocol: &str) -> Result<Vec<String>, FatalRunError> {
        let handle = self.load_protocol(protocol)?;
        let navigator = handle
            .navigator()
            .cloned()
            .ok_or_else(|| FatalRunError::NoNavigator(protocol.to_string()))?;

        let store = self.open_store(protocol)?;
        let result = handle
            .schema_init()
            .map_or(Ok(()), |schema| schema.init_schema(&store))
            .and_then(|_| navigator.summarize(&store))
            .map_err(FatalRunError::Storage);
        if let Err(e) = store.dispose() {
            warn!("{}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
        move |key: &str| (key == KRB5CCNAME).then(|| value.map(String::from)).flatten()
    }

    #[test]
    fn test_key_file_needs_password() {
        let mut args = RunArgs::for_protocol("ssh");
        args.extra.insert("key_file".into(), vec!["id_rsa".into()]);
        assert!(matches!(
            check_preconditions(&args, env_with(None)),
            Err(FatalRunError::PasswordRequired)
        ));

        args.extra.insert("password".into(), vec!["hunter2".into()]);
        assert!(check_preconditions(&args, env_with(None)).is_ok());
    }

    #[test]
    fn test_kcache_needs_env() {
        let mut args = RunArgs::for_protocol("smb");
        args.use_kcache = true;
        assert!(matches!(
            check_preconditions(&args, env_with(None)),
            Err(FatalRunError::MissingCredentialCache)
        ));
        assert!(check_preconditions(&args, env_with(Some("/tmp/krb5cc_0"))).is_ok());
    }

    #[test]
    fn test_bad_jitter_is_fatal() {
        let mut args = RunArgs::for_protocol("smb");
        args.jitter = Some("3-1".into());
        assert!(matches!(
            check_preconditions(&args, env_with(None)),
            Err(FatalRunError::InvalidJitter(_))
        ));

        args.jitter = Some("1-3".into());
        assert!(check_preconditions(&args, env_with(None)).is_ok());
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            protocol: "tcp".into(),
            outcomes: Vec::new(),
            interrupted: false,
        };
        assert_eq!((summary.succeeded(), summary.failed()), (0, 0));
    }
}
