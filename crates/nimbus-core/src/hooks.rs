//! Reserved function names and the boot hook.

use std::sync::Arc;

use crate::cache::FunctionCache;
use crate::execute::{FunctionExecutor, InvocationContext, InvocationResult};
use crate::module::ModuleResolver;

/// Run once after the workspace loads, with method `INIT` and no interceptor.
pub const INIT_FUNCTION: &str = "__init__";

/// Global middleware wrapping every other invocation.
pub const INTERCEPTOR_FUNCTION: &str = "__interceptor__";

/// Fallback when an invoked name does not exist.
pub const DEFAULT_FUNCTION: &str = "__default__";

/// Receives WebSocket lifecycle events.
pub const WEBSOCKET_FUNCTION: &str = "__websocket__";

/// Method tag passed to the boot hook.
pub const INIT_METHOD: &str = "INIT";

pub fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        INIT_FUNCTION | INTERCEPTOR_FUNCTION | DEFAULT_FUNCTION | WEBSOCKET_FUNCTION
    )
}

/// Invoke the boot hook if the workspace defines one.
///
/// A failing hook is logged, not fatal.
pub fn run_init_hook(
    functions: &FunctionCache,
    resolver: &Arc<ModuleResolver>,
) -> Option<InvocationResult> {
    let record = functions.get(INIT_FUNCTION)?;
    let executor = match FunctionExecutor::new(record, Arc::clone(resolver)) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!("init hook unavailable: {e}");
            return None;
        }
    };

    let ctx = InvocationContext::new(INIT_FUNCTION).with_method(INIT_METHOD);
    let result = executor.invoke(&ctx, false);
    match &result.outcome {
        Ok(_) => tracing::info!(elapsed_ms = result.elapsed_ms, "init hook completed"),
        Err(e) => tracing::error!(elapsed_ms = result.elapsed_ms, "init hook failed: {e}"),
    }
    Some(result)
}
