//! Per-execution global scope with the fixed capability allow-list.
//!
//! Every module execution gets a fresh root scope: the language prelude,
//! `require` bound to the resolver with the growing call chain, a logger
//! scoped to the module's name, timers, ids, byte buffers, URL parsing,
//! `fetch` and regular expressions. Nothing else is reachable.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use nimbus_script::{Scope, ScriptError, Value, install_prelude, to_number};

use super::chain::CallChain;
use super::packages::text;
use super::resolver::{ModuleResolver, Resolution};
use super::{net, regexp};
use crate::error::ResolveError;

/// Build the global scope for executing module `name`.
///
/// `chain` is the ancestry including `name` itself; nested requires extend it.
pub(crate) fn build(resolver: Weak<ModuleResolver>, name: &str, chain: CallChain) -> Arc<Scope> {
    let scope = Scope::root();
    install_prelude(&scope);

    scope.define("__name", Value::from(name));
    scope.define("require", require(resolver, name, chain));
    scope.define("console", console(name));
    scope.define("sleep", Value::native("sleep", 1, sleep));
    scope.define("now", Value::native("now", 0, |_, _| Ok(Value::Number(epoch_millis()))));
    scope.define(
        "uuid",
        Value::native("uuid", 0, |_, _| {
            Ok(Value::from(uuid::Uuid::new_v4().to_string()))
        }),
    );
    scope.define("Buffer", buffer());
    scope.define("URL", net::url_constructor());
    scope.define("fetch", net::fetch());
    scope.define("RegExp", regexp::constructor());

    scope
}

fn require(resolver: Weak<ModuleResolver>, name: &str, chain: CallChain) -> Value {
    let module = name.to_string();
    Value::native("require", 1, move |interp, args| {
        let specifier = text(&args, 0);
        let resolver = resolver
            .upgrade()
            .ok_or_else(|| ScriptError::host("module resolver has been released"))?;

        match resolver.resolve(&specifier, &module, &chain) {
            Ok(Resolution::Module(instance)) => {
                interp.heap().adopt(&instance.heap);
                Ok(instance.exports.clone())
            }
            Ok(Resolution::External(exports)) => Ok(exports),
            Err(err) => {
                let err = ResolveError::Require {
                    module: module.clone(),
                    specifier,
                    source: Box::new(err),
                };
                Err(ScriptError::host_with_source(err.to_string(), err))
            }
        }
    })
}

fn console(name: &str) -> Value {
    let logger = |level: &'static str, name: String| {
        Value::native(level, 0, move |_, args| {
            let message = args
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.to_string(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            match level {
                "debug" => tracing::debug!(target: "nimbus::function", function = %name, "{message}"),
                "warn" => tracing::warn!(target: "nimbus::function", function = %name, "{message}"),
                "error" => tracing::error!(target: "nimbus::function", function = %name, "{message}"),
                _ => tracing::info!(target: "nimbus::function", function = %name, "{message}"),
            }
            Ok(Value::Null)
        })
    };

    Value::object(
        ["debug", "info", "log", "warn", "error"]
            .into_iter()
            .map(|level| (level, logger(level, name.to_string()))),
    )
}

fn sleep(_: &mut nimbus_script::Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let ms = args.first().map(to_number).unwrap_or(0.0);
    if ms.is_finite() && ms > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(ms / 1000.0));
    }
    Ok(Value::Null)
}

fn epoch_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

fn buffer() -> Value {
    Value::object([
        (
            "toBase64",
            Value::native("toBase64", 1, |_, args| {
                Ok(Value::from(STANDARD.encode(text(&args, 0))))
            }),
        ),
        (
            "fromBase64",
            Value::native("fromBase64", 1, |_, args| {
                let bytes = STANDARD
                    .decode(text(&args, 0).trim())
                    .map_err(|e| ScriptError::host_with_source("invalid base64 input", e))?;
                Ok(Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            }),
        ),
        (
            "byteLength",
            Value::native("byteLength", 1, |_, args| {
                Ok(Value::from(text(&args, 0).len()))
            }),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_script::{Interpreter, Limits, compile};

    fn run(source: &str) -> Value {
        let scope = build(Weak::new(), "test/sandbox", CallChain::new().with("test/sandbox"));
        let program = compile(source, "test/sandbox").unwrap();
        let mut interp = Interpreter::new(Limits::default());
        let exports = interp.run_module(&program, &scope).unwrap();
        exports.get("default").unwrap()
    }

    #[test]
    fn test_name_and_buffer() {
        let out = run("export default [__name, Buffer.toBase64('hi'), Buffer.fromBase64('aGk='), Buffer.byteLength('é')]");
        assert_eq!(
            out.to_json(),
            serde_json::json!(["test/sandbox", "aGk=", "hi", 2])
        );
    }

    #[test]
    fn test_uuid_and_now() {
        let out = run("export default [uuid().length, now() > 0]");
        assert_eq!(out.to_json(), serde_json::json!([36, true]));
    }

    #[test]
    fn test_console_returns_null() {
        assert!(run("export default console.log('hello', { a: 1 })").is_null());
    }

    #[test]
    fn test_no_ambient_host_access() {
        let out = run("export default [typeof process, typeof readFile, typeof global]");
        assert_eq!(
            out.to_json(),
            serde_json::json!(["undefined", "undefined", "undefined"])
        );
    }

    #[test]
    fn test_require_without_resolver_fails() {
        let out = run("let m = null\ntry { require('./x') } catch (e) { m = e.message }\nexport default m");
        assert_eq!(out, Value::from("module resolver has been released"));
    }
}
