//! Runtime values.
//!
//! Arrays and objects have value semantics: they are shared behind `Arc`
//! and copied on write, so a value handed to a function can never be
//! mutated behind the caller's back.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::ast::FnDef;
use crate::env::Scope;
use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interpreter;

/// Signature of a host-provided function.
pub type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> ScriptResult<Value> + Send + Sync;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<BTreeMap<String, Value>>),
    Function(Arc<Closure>),
    Native(Arc<NativeFunction>),
}

/// A script function together with the scope it was defined in.
pub struct Closure {
    pub def: Arc<FnDef>,
    /// Kept alive by the [`crate::env::Heap`] of the defining execution.
    pub(crate) scope: Weak<Scope>,
}

/// A function implemented by the host.
pub struct NativeFunction {
    pub name: String,
    /// Declared parameter count, reported by [`Value::arity`].
    pub arity: usize,
    pub(crate) func: Box<NativeFn>,
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object<K, I>(fields: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Wrap a host function.
    pub fn native<F>(name: impl Into<String>, arity: usize, func: F) -> Value
    where
        F: Fn(&mut Interpreter, Vec<Value>) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        Value::Native(Arc::new(NativeFunction {
            name: name.into(),
            arity,
            func: Box::new(func),
        }))
    }

    /// Property of an object, `None` for missing keys and non-objects.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Result of `typeof`. `null` reports `"undefined"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    /// Declared parameter count of a callable, `None` otherwise.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Value::Function(closure) => Some(closure.def.params.len()),
            Value::Native(native) => Some(native.arity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Convert to JSON. Functions are dropped from objects and become
    /// `null` elsewhere; non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Function(_) | Value::Native(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_callable())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Array(Arc::new(items.iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            ),
        }
    }

    /// Property lookup used by `a.b` and `a[b]`.
    pub(crate) fn property(&self, key: &Value) -> ScriptResult<Value> {
        match (self, key) {
            (Value::Null, _) => Err(ScriptError::Type(format!(
                "cannot read property '{key}' of undefined"
            ))),
            (Value::Object(map), _) => Ok(map.get(&key.to_string()).cloned().unwrap_or_default()),
            (Value::Array(items), Value::Number(n)) => Ok(index(*n, items.len())
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default()),
            (Value::Array(items), Value::String(s)) if &**s == "length" => {
                Ok(Value::from(items.len()))
            }
            (Value::String(text), Value::Number(n)) => Ok(index(*n, text.chars().count())
                .and_then(|i| text.chars().nth(i))
                .map(|c| Value::from(c.to_string()))
                .unwrap_or_default()),
            (Value::String(text), Value::String(s)) if &**s == "length" => {
                Ok(Value::from(text.chars().count()))
            }
            (Value::Function(_) | Value::Native(_), Value::String(s)) if &**s == "length" => {
                Ok(Value::from(self.arity().unwrap_or(0)))
            }
            _ => Ok(Value::Null),
        }
    }
}

/// Integral, non-negative, in-range index.
pub(crate) fn index(n: f64, len: usize) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < len as f64).then_some(n as usize)
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Format a number the way scripts print it (`3`, not `3.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_null() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(closure) => write!(
                f,
                "[Function: {}]",
                closure.def.name.as_deref().unwrap_or("anonymous")
            ),
            Value::Native(native) => write!(f, "[Function: {}]", native.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{:?}", &**s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(_) | Value::Native(_) => write!(f, "{self}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_json_conversion() {
        let json = json!({"name": "Ann", "tags": ["a", 1, true, null], "n": 1.5});
        let value = Value::from_json(&json);
        assert_eq!(value.get("name"), Some(Value::from("Ann")));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_functions_dropped_from_json() {
        let value = Value::object([
            ("a", Value::from(1i64)),
            ("f", Value::native("f", 0, |_, _| Ok(Value::Null))),
        ]);
        assert_eq!(value.to_json(), json!({"a": 1}));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from(0i64).is_truthy());
        assert!(Value::from(Vec::new()).is_truthy());
        assert!(Value::object::<&str, _>([]).is_truthy());
    }

    #[test]
    fn test_display() {
        let items = Value::from(vec![Value::from(1i64), Value::Null, Value::from("x")]);
        assert_eq!(items.to_string(), "1,,x");
        assert_eq!(Value::object([("a", Value::Null)]).to_string(), "[object Object]");
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::object([("k", Value::from(vec![Value::from(1i64)]))]);
        let b = Value::object([("k", Value::from(vec![Value::from(1i64)]))]);
        assert_eq!(a, b);
        let f = Value::native("f", 0, |_, _| Ok(Value::Null));
        let g = Value::native("f", 0, |_, _| Ok(Value::Null));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }
}
