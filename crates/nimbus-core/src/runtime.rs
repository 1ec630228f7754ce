//! The runtime: configuration, function cache and module resolver as one
//! owned object.

use std::path::Path;
use std::sync::Arc;

use crate::cache::FunctionCache;
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::execute::{FunctionExecutor, InvocationContext, InvocationResult};
use crate::hooks::{INTERCEPTOR_FUNCTION, run_init_hook};
use crate::module::ModuleResolver;

/// A function runtime. Cheap to clone; clones share state.
///
/// Independent runtimes share nothing, so several can coexist in one process.
#[derive(Debug, Clone)]
pub struct Runtime {
    config: Arc<RuntimeConfig>,
    functions: Arc<FunctionCache>,
    modules: Arc<ModuleResolver>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let functions = Arc::new(FunctionCache::new(
            config.workspace_path.clone(),
            config.source_extension.clone(),
        ));
        let modules = ModuleResolver::new(Arc::clone(&functions), &config);
        Self {
            config: Arc::new(config),
            functions,
            modules,
        }
    }

    /// Load and compile the workspace, then run the boot hook.
    ///
    /// Any compile or I/O failure aborts; nothing is served from a
    /// half-loaded workspace.
    pub fn initialize(&self) -> Result<usize> {
        tracing::info!(
            workspace = %self.config.workspace_path.display(),
            "initialize function cache"
        );
        let count = self.functions.load_workspace()?;
        self.modules.clear();
        tracing::info!(functions = count, "Function cache initialized.");

        run_init_hook(&self.functions, &self.modules);
        Ok(count)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn functions(&self) -> &Arc<FunctionCache> {
        &self.functions
    }

    pub fn modules(&self) -> &Arc<ModuleResolver> {
        &self.modules
    }

    /// Executor for the function `name`.
    pub fn executor(&self, name: &str) -> Result<FunctionExecutor> {
        let record = self
            .functions
            .get(name)
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
        FunctionExecutor::new(record, Arc::clone(&self.modules))
    }

    /// Invoke `name`. Only a missing function is an `Err`; every execution
    /// outcome is inside the returned envelope.
    pub fn invoke(
        &self,
        name: &str,
        ctx: &InvocationContext,
        use_interceptor: bool,
    ) -> Result<InvocationResult> {
        Ok(self.executor(name)?.invoke(ctx, use_interceptor))
    }

    pub fn has_interceptor(&self) -> bool {
        self.functions.has(INTERCEPTOR_FUNCTION)
    }

    /// Recompile one changed file and replace its record.
    ///
    /// Memoized modules are dropped since dependents captured the old exports.
    /// On a compile error the previous record stays served.
    pub fn reload_path(&self, path: &Path) -> Result<Option<String>> {
        match self.functions.load_file(path) {
            Ok(Some(record)) => {
                self.modules.clear();
                tracing::info!("Reloaded function: {}", record.name);
                Ok(Some(record.name.clone()))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::error!(path = %path.display(), "reload failed, keeping previous version: {e}");
                Err(e)
            }
        }
    }

    /// Forget the function stored at `path`.
    pub fn remove_path(&self, path: &Path) -> Option<String> {
        let name = self.functions.name_for_path(path)?;
        self.functions.delete(&name)?;
        self.modules.clear();
        tracing::info!("Removed function: {name}");
        Some(name)
    }

    /// Reload the whole workspace without re-running the boot hook.
    pub fn reload_all(&self) -> Result<usize> {
        let count = self.functions.load_workspace()?;
        self.modules.clear();
        tracing::info!(functions = count, "Function cache reloaded.");
        Ok(count)
    }
}
