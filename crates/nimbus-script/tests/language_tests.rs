//! Integration tests for the function language: whole modules compiled and
//! run through the public API.

use nimbus_script::{Interpreter, Limits, Scope, ScriptError, Value, compile, install_prelude};
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Compile and run a module, returning its export record and the interpreter
/// that owns its closures.
fn load(source: &str) -> (Value, Interpreter) {
    let program = compile(source, "test").unwrap_or_else(|e| panic!("compile error: {e}"));
    let scope = Scope::root();
    install_prelude(&scope);
    let mut interp = Interpreter::new(Limits::default());
    let exports = interp
        .run_module(&program, &scope)
        .unwrap_or_else(|e| panic!("module failed: {e}"));
    (exports, interp)
}

/// Call the default export with a JSON context.
fn invoke(source: &str, ctx: serde_json::Value) -> Result<serde_json::Value, ScriptError> {
    let (exports, mut interp) = load(source);
    let main = exports.get("default").expect("default export");
    interp
        .call(&main, vec![Value::from_json(&ctx)])
        .map(|v| v.to_json())
}

// ══════════════════════════════════════════════════════════════════════════════
// Handlers
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_greeting_handler() {
    let source = "export default (ctx) => ({ data: 'hi ' + ctx.query.name })";
    let out = invoke(source, json!({"query": {"name": "Ann"}})).unwrap();
    assert_eq!(out, json!({"data": "hi Ann"}));
}

#[test]
fn test_handler_with_helpers() {
    let source = r#"
        fn total(items) {
            return items.reduce((sum, item) => sum + item.price * item.qty, 0)
        }

        export default fn(ctx) {
            let items = ctx.body.items ?? []
            if (items.length == 0) {
                throw { status: 400, message: 'empty cart' }
            }
            return {
                count: items.length,
                total: total(items).toFixed(2),
                names: items.map(i => i.name).join(', '),
            }
        }
    "#;
    let ctx = json!({"body": {"items": [
        {"name": "tea", "price": 2.5, "qty": 2},
        {"name": "cake", "price": 3.25, "qty": 1}
    ]}});
    assert_eq!(
        invoke(source, ctx).unwrap(),
        json!({"count": 2, "total": "8.25", "names": "tea, cake"})
    );

    let err = invoke(source, json!({"body": {}})).unwrap_err();
    match err {
        ScriptError::Thrown(value) => {
            assert_eq!(value.to_json(), json!({"status": 400, "message": "empty cart"}))
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_main_export_and_arity() {
    let (exports, _interp) = load("export fn main(ctx, next) { return next(ctx) }");
    let main = exports.get("main").unwrap();
    assert!(main.is_callable());
    assert_eq!(main.arity(), Some(2));
    assert!(exports.get("default").is_none());
}

#[test]
fn test_module_state_persists_between_calls() {
    let source = "
        let hits = 0
        export default fn() { hits += 1; return hits }
    ";
    let (exports, mut interp) = load(source);
    let main = exports.get("default").unwrap();
    interp.call(&main, vec![]).unwrap();
    assert_eq!(interp.call(&main, vec![]).unwrap(), Value::from(2i64));
}

#[test]
fn test_context_is_not_mutated_by_callee() {
    let source = "
        export default fn(ctx) {
            ctx.query.name = 'changed'
            return ctx.query.name
        }
    ";
    let (exports, mut interp) = load(source);
    let main = exports.get("default").unwrap();
    let ctx = Value::from_json(&json!({"query": {"name": "Ann"}}));
    let out = interp.call(&main, vec![ctx.clone()]).unwrap();
    assert_eq!(out, Value::from("changed"));
    assert_eq!(ctx.to_json(), json!({"query": {"name": "Ann"}}));
}

// ══════════════════════════════════════════════════════════════════════════════
// Host functions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_native_function_receives_arguments() {
    let program = compile("export default twice(21)", "native").unwrap();
    let scope = Scope::root();
    scope.define(
        "twice",
        Value::native("twice", 1, |_, args| {
            let n = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        }),
    );
    let exports = Interpreter::new(Limits::default())
        .run_module(&program, &scope)
        .unwrap();
    assert_eq!(exports.get("default"), Some(Value::from(42i64)));
}

#[test]
fn test_native_can_call_back_into_script() {
    let source = "export default apply(x => x + 1, 1)";
    let program = compile(source, "native").unwrap();
    let scope = Scope::root();
    scope.define(
        "apply",
        Value::native("apply", 2, |interp, mut args| {
            let arg = args.pop().unwrap_or_default();
            let f = args.pop().unwrap_or_default();
            interp.call(&f, vec![arg])
        }),
    );
    let exports = Interpreter::new(Limits::default())
        .run_module(&program, &scope)
        .unwrap();
    assert_eq!(exports.get("default"), Some(Value::from(2i64)));
}

#[test]
fn test_host_error_is_catchable() {
    let source = "
        let message = null
        try { fail() } catch (e) { message = e.message }
        export default message
    ";
    let program = compile(source, "host").unwrap();
    let scope = Scope::root();
    scope.define(
        "fail",
        Value::native("fail", 0, |_, _| Err(ScriptError::host("backend unavailable"))),
    );
    let exports = Interpreter::new(Limits::default())
        .run_module(&program, &scope)
        .unwrap();
    assert_eq!(exports.get("default"), Some(Value::from("backend unavailable")));
}

// ══════════════════════════════════════════════════════════════════════════════
// Limits and errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_step_limit_stops_runaway_loop() {
    let program = compile("export default fn() { while (true) {} }", "spin").unwrap();
    let scope = Scope::root();
    let mut interp = Interpreter::new(Limits {
        max_steps: Some(10_000),
        ..Limits::default()
    });
    let exports = interp.run_module(&program, &scope).unwrap();
    let main = exports.get("default").unwrap();
    let err = interp.call(&main, vec![]).unwrap_err();
    assert!(matches!(err, ScriptError::StepLimit(10_000)));
    assert!(interp.steps() > 10_000);
}

#[test]
fn test_compile_error_reports_position() {
    let err = compile("export default fn(ctx) {\n  return ctx.\n}", "api/orders").unwrap_err();
    assert_eq!(err.name, "api/orders");
    assert_eq!(err.line, 3);
    assert!(err.to_string().starts_with("api/orders:3:"));
}

#[test]
fn test_reference_error_message() {
    let err = invoke("export default fn() { return nope }", json!({})).unwrap_err();
    assert_eq!(err.to_string(), "reference error: nope is not defined");
}

// ══════════════════════════════════════════════════════════════════════════════
// Mutating methods
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_failed_sort_keeps_array() {
    let source = r#"
        export default fn() {
            let a = [3, 1, 2]
            try { a.sort(fn(x, y) { throw 'no' }) } catch (e) {}
            return a
        }
    "#;
    assert_eq!(invoke(source, json!({})).unwrap(), json!([3, 1, 2]));
}

#[test]
fn test_comparator_sees_array_while_sorting() {
    let source = r#"
        export default fn() {
            let a = [3, 1, 2]
            let seen = 0
            a.sort(fn(x, y) { seen = a.length; return x - y })
            return { a: a, seen: seen }
        }
    "#;
    assert_eq!(
        invoke(source, json!({})).unwrap(),
        json!({"a": [1, 2, 3], "seen": 3})
    );
}

#[test]
fn test_nested_push_writes_back() {
    let source = r#"
        export default fn() {
            let state = { items: [1] }
            const n = state.items.push(2)
            return { n: n, items: state.items }
        }
    "#;
    assert_eq!(
        invoke(source, json!({})).unwrap(),
        json!({"n": 2, "items": [1, 2]})
    );
}
