//! Function executor: the per-invocation protocol around one record.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use nimbus_script::{Interpreter, Value};

use super::context::InvocationContext;
use super::result::InvocationResult;
use crate::cache::FunctionRecord;
use crate::error::{Error, ExecutionError, ResolveError, Result};
use crate::hooks::INTERCEPTOR_FUNCTION;
use crate::module::ModuleResolver;

/// Runs one function record.
///
/// The executor never fails after construction: every outcome of
/// [`invoke`](Self::invoke), including panics, lands in the result envelope.
#[derive(Debug, Clone)]
pub struct FunctionExecutor {
    record: Arc<FunctionRecord>,
    resolver: Arc<ModuleResolver>,
}

impl FunctionExecutor {
    /// Executor for `record`. Fails on a record without a name.
    pub fn new(record: Arc<FunctionRecord>, resolver: Arc<ModuleResolver>) -> Result<Self> {
        if record.name.is_empty() {
            return Err(Error::EmptyFunction);
        }
        Ok(Self { record, resolver })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &Arc<FunctionRecord> {
        &self.record
    }

    /// Invoke the function with `ctx`, optionally through the global interceptor.
    pub fn invoke(&self, ctx: &InvocationContext, use_interceptor: bool) -> InvocationResult {
        let start = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(ctx, use_interceptor)))
            .unwrap_or_else(|panic| Err(ExecutionError::Panicked(panic_message(panic))));

        let result = InvocationResult::new(outcome, start.elapsed());
        if let Err(err) = &result.outcome {
            tracing::debug!(
                function = %self.record.name,
                request_id = %ctx.request_id,
                elapsed_ms = result.elapsed_ms,
                "execute function error: {err}"
            );
        }
        result
    }

    fn run(
        &self,
        ctx: &InvocationContext,
        use_interceptor: bool,
    ) -> std::result::Result<Value, ExecutionError> {
        let module = self.resolver.load(&self.record.name)?;
        let entry = entry_point(&module.exports)?;

        let mut interp = Interpreter::new(self.resolver.limits());
        interp.heap().adopt(&module.heap);
        let ctx_value = ctx.to_value();

        if self.record.name == INTERCEPTOR_FUNCTION {
            tracing::debug!(function = %self.record.name, "execute interceptor");
            let next = Value::native("next", 1, |_, _| Ok(Value::Null));
            return Ok(interp.call(&entry, vec![ctx_value, next])?);
        }

        if use_interceptor {
            tracing::debug!(function = %self.record.name, "execute function with interceptor");
            let interceptor = self.interceptor(&mut interp)?;
            let original = ctx_value.clone();
            let next = Value::native("next", 1, move |interp, args| {
                let ctx = args
                    .into_iter()
                    .next()
                    .filter(|v| !v.is_null())
                    .unwrap_or_else(|| original.clone());
                interp.call(&entry, vec![ctx])
            });
            return Ok(interp.call(&interceptor, vec![ctx_value, next])?);
        }

        tracing::debug!(function = %self.record.name, "execute function without interceptor");
        Ok(interp.call(&entry, vec![ctx_value])?)
    }

    /// Resolve and validate the interceptor's entry point.
    fn interceptor(&self, interp: &mut Interpreter) -> std::result::Result<Value, ExecutionError> {
        let module = match self.resolver.load(INTERCEPTOR_FUNCTION) {
            Ok(module) => module,
            Err(ResolveError::ModuleNotFound { .. }) => {
                return Err(ExecutionError::function(format!(
                    "Module '{INTERCEPTOR_FUNCTION}' not found"
                )));
            }
            Err(err) => return Err(err.into()),
        };
        interp.heap().adopt(&module.heap);

        let interceptor = exported_entry(&module.exports).ok_or_else(|| {
            ExecutionError::function(format!(
                "main function '{INTERCEPTOR_FUNCTION}' not found"
            ))
        })?;
        if !interceptor.is_callable() {
            return Err(ExecutionError::function(format!(
                "Function '{INTERCEPTOR_FUNCTION}' must be callable"
            )));
        }
        if interceptor.arity() != Some(2) {
            return Err(ExecutionError::function(format!(
                "Function '{INTERCEPTOR_FUNCTION}' must have 2 arguments"
            )));
        }
        Ok(interceptor)
    }
}

/// `default` if truthy, else `main`.
fn exported_entry(exports: &Value) -> Option<Value> {
    exports
        .get("default")
        .filter(Value::is_truthy)
        .or_else(|| exports.get("main"))
        .filter(Value::is_truthy)
}

fn entry_point(exports: &Value) -> std::result::Result<Value, ExecutionError> {
    let entry = exported_entry(exports)
        .ok_or_else(|| ExecutionError::function("`main` function not found"))?;
    if !entry.is_callable() {
        return Err(ExecutionError::function("`main` function must be callable"));
    }
    Ok(entry)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FunctionCache;
    use crate::config::RuntimeConfig;
    use serde_json::json;

    fn setup(files: &[(&str, &str)]) -> Arc<ModuleResolver> {
        let functions = Arc::new(FunctionCache::new("/unused", "ns"));
        for (name, source) in files {
            functions.set(FunctionRecord::compile(name, source).unwrap());
        }
        ModuleResolver::new(functions, &RuntimeConfig::default())
    }

    fn executor(resolver: &Arc<ModuleResolver>, name: &str) -> FunctionExecutor {
        let record = resolver.functions().get(name).unwrap();
        FunctionExecutor::new(record, Arc::clone(resolver)).unwrap()
    }

    fn error_message(result: &InvocationResult) -> String {
        result.error().map(|e| e.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_empty_record_rejected() {
        let resolver = setup(&[]);
        let record = Arc::new(FunctionRecord::compile("", "export default 1").unwrap());
        assert!(matches!(
            FunctionExecutor::new(record, resolver),
            Err(Error::EmptyFunction)
        ));
    }

    #[test]
    fn test_main_export_used_when_no_default() {
        let resolver = setup(&[("f", "export fn main(ctx) { return ctx.method }")]);
        let result = executor(&resolver, "f").invoke(
            &InvocationContext::new("f").with_method("GET"),
            false,
        );
        assert_eq!(result.data(), Some(&Value::from("GET")));
    }

    #[test]
    fn test_missing_and_uncallable_entry() {
        let resolver = setup(&[("none", "export let x = 1"), ("value", "export default 42")]);
        let ctx = InvocationContext::new("none");

        let result = executor(&resolver, "none").invoke(&ctx, false);
        assert_eq!(
            error_message(&result),
            "FunctionExecutionError: `main` function not found"
        );

        let result = executor(&resolver, "value").invoke(&ctx, false);
        assert_eq!(
            error_message(&result),
            "FunctionExecutionError: `main` function must be callable"
        );
    }

    #[test]
    fn test_interceptor_missing() {
        let resolver = setup(&[("f", "export default fn(ctx) { return 1 }")]);
        let result = executor(&resolver, "f").invoke(&InvocationContext::new("f"), true);
        assert_eq!(
            error_message(&result),
            "FunctionExecutionError: Module '__interceptor__' not found"
        );
    }

    #[test]
    fn test_interceptor_gets_noop_next_when_invoked_itself() {
        let resolver = setup(&[(
            "__interceptor__",
            "export default fn(ctx, next) { return [next(ctx), ctx.__function_name] }",
        )]);
        let result = executor(&resolver, "__interceptor__")
            .invoke(&InvocationContext::new("__interceptor__"), true);
        assert_eq!(
            result.data().map(Value::to_json),
            Some(json!([null, "__interceptor__"]))
        );
    }

    #[test]
    fn test_interceptor_can_replace_context() {
        let resolver = setup(&[
            (
                "__interceptor__",
                "export default fn(ctx, next) { return next({ query: { name: 'Bob' } }) }",
            ),
            ("hello", "export default (ctx) => 'hi ' + ctx.query.name"),
        ]);
        let ctx = InvocationContext::new("hello").with_query(json!({"name": "Ann"}));
        let result = executor(&resolver, "hello").invoke(&ctx, true);
        assert_eq!(result.data(), Some(&Value::from("hi Bob")));
    }

    #[test]
    fn test_step_limit_reported() {
        let functions = Arc::new(FunctionCache::new("/unused", "ns"));
        functions.set(FunctionRecord::compile("spin", "export default fn() { while (true) {} }").unwrap());
        let config = RuntimeConfig {
            max_steps: Some(1_000),
            ..RuntimeConfig::default()
        };
        let resolver = ModuleResolver::new(functions, &config);
        let result = executor(&resolver, "spin").invoke(&InvocationContext::new("spin"), false);
        assert_eq!(result.error().map(ExecutionError::kind), Some("RangeError"));
    }

    #[test]
    fn test_panic_message() {
        let panic = catch_unwind(|| panic!("kaboom")).unwrap_err();
        assert_eq!(panic_message(panic), "kaboom");
    }
}
