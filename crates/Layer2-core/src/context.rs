//! Run context - the shared environment of one run
//!
//! A `Context` is built once, before dispatch, and handed by reference to
//! every protocol invocation and extension hook. It carries the protocol's
//! result store, a scoped logger, the resolved arguments, the obfuscation
//! flag, and the configured extensions. Nothing in it is reconfigured while
//! targets are being processed; the store serializes its own writes.

use crate::plugin::ExtensionInstance;
use crate::target::TargetSpec;
use nexec_foundation::{Error, ProtocolStore, Result, RunArgs};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// LoginEvent
// ============================================================================

/// A successful authentication reported by a protocol handler
#[derive(Debug, Clone, Copy)]
pub struct LoginEvent<'a> {
    pub protocol: &'a str,
    pub target: &'a TargetSpec,
    pub username: Option<&'a str>,
    /// The session has administrative rights on the target
    pub admin: bool,
}

impl<'a> LoginEvent<'a> {
    pub fn new(protocol: &'a str, target: &'a TargetSpec) -> Self {
        Self {
            protocol,
            target,
            username: None,
            admin: false,
        }
    }

    pub fn with_username(mut self, username: &'a str) -> Self {
        self.username = Some(username);
        self
    }

    pub fn as_admin(mut self) -> Self {
        self.admin = true;
        self
    }
}

// ============================================================================
// ContextLogger
// ============================================================================

/// Logger scoped to a protocol, and optionally to one extension module
#[derive(Debug, Clone)]
pub struct ContextLogger {
    protocol: String,
    module: Option<String>,
}

impl ContextLogger {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            module: None,
        }
    }

    pub fn for_module(&self, module: &str) -> Self {
        Self {
            protocol: self.protocol.clone(),
            module: Some(module.to_uppercase()),
        }
    }

    /// `SMB` or `SMB/BANNER`
    pub fn scope(&self) -> String {
        match &self.module {
            Some(module) => format!("{}/{}", self.protocol.to_uppercase(), module),
            None => self.protocol.to_uppercase(),
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        info!(scope = %self.scope(), "[*] {}", message);
    }

    pub fn success(&self, message: impl fmt::Display) {
        info!(scope = %self.scope(), "[+] {}", message);
    }

    pub fn highlight(&self, message: impl fmt::Display) {
        info!(scope = %self.scope(), "{}", message);
    }

    pub fn fail(&self, message: impl fmt::Display) {
        warn!(scope = %self.scope(), "[-] {}", message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        debug!(scope = %self.scope(), "{}", message);
    }
}

// ============================================================================
// Context
// ============================================================================

#[derive(Clone)]
pub struct Context {
    store: Arc<ProtocolStore>,
    log: ContextLogger,
    args: Arc<RunArgs>,
    obfuscate: bool,
    modules: Arc<Vec<Arc<ExtensionInstance>>>,
}

impl Context {
    pub fn new(store: Arc<ProtocolStore>, args: Arc<RunArgs>) -> Self {
        let log = ContextLogger::new(store.protocol());
        Self {
            store,
            log,
            args,
            obfuscate: false,
            modules: Arc::new(Vec::new()),
        }
    }

    pub fn with_obfuscation(mut self, enabled: bool) -> Self {
        self.obfuscate = enabled;
        self
    }

    pub fn with_modules(mut self, modules: Vec<ExtensionInstance>) -> Self {
        self.modules = Arc::new(modules.into_iter().map(Arc::new).collect());
        self
    }

    /// The view handed to one extension: same store and arguments, a
    /// module-scoped logger, and no further extensions.
    pub fn for_module(&self, module: &str) -> Self {
        Self {
            store: Arc::clone(&self.store),
            log: self.log.for_module(module),
            args: Arc::clone(&self.args),
            obfuscate: self.obfuscate,
            modules: Arc::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &ProtocolStore {
        &self.store
    }

    /// Run blocking store work on the blocking pool, off the async workers.
    pub async fn with_store<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ProtocolStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::Storage(format!("store task failed: {}", e)))?
    }

    pub fn log(&self) -> &ContextLogger {
        &self.log
    }

    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    pub fn obfuscate(&self) -> bool {
        self.obfuscate
    }

    pub fn modules(&self) -> &[Arc<ExtensionInstance>] {
        &self.modules
    }

    /// Fire every configured extension's login hooks, in configuration order.
    ///
    /// A failing hook is logged and does not stop the others. Returns the
    /// number of hooks that failed.
    pub async fn run_login_hooks(&self, event: &LoginEvent<'_>) -> usize {
        let mut failed = 0;
        for module in self.modules.iter() {
            if let Err(e) = module.on_login(event).await {
                failed += 1;
                module
                    .context()
                    .log()
                    .fail(format!("Module error on {}: {}", event.target, e));
            }
        }
        failed
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scope", &self.log.scope())
            .field("obfuscate", &self.obfuscate)
            .field("modules", &self.modules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        let store = Arc::new(ProtocolStore::in_memory("smb").unwrap());
        Context::new(store, Arc::new(RunArgs::for_protocol("smb")))
    }

    #[test]
    fn test_logger_scope() {
        let log = ContextLogger::new("smb");
        assert_eq!(log.scope(), "SMB");
        assert_eq!(log.for_module("banner").scope(), "SMB/BANNER");
    }

    #[test]
    fn test_module_view_shares_store() {
        let ctx = context().with_obfuscation(true);
        let module_ctx = ctx.for_module("banner");

        assert!(module_ctx.obfuscate());
        assert_eq!(module_ctx.store().protocol(), "smb");
        assert_eq!(module_ctx.log().scope(), "SMB/BANNER");
        assert!(module_ctx.modules().is_empty());
    }

    #[tokio::test]
    async fn test_no_modules_no_failures() {
        let ctx = context();
        let target = TargetSpec::new("10.0.0.1");
        let event = LoginEvent::new("smb", &target).as_admin();
        assert_eq!(ctx.run_login_hooks(&event).await, 0);
    }

    #[tokio::test]
    async fn test_with_store_runs_off_the_runtime() {
        let ctx = context();
        ctx.with_store(|store| store.execute_batch("CREATE TABLE t (v INTEGER)"))
            .await
            .unwrap();
        let count: i64 = ctx
            .with_store(|store| {
                store.with_connection(|conn| {
                    conn.execute("INSERT INTO t (v) VALUES (1)", [])?;
                    conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
                })
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
