//! Built-in methods on strings, arrays and numbers, and the standard
//! prelude (`JSON`, `Math`, `Object`, ...) installed in every sandbox.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::env::Scope;
use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interpreter;
use crate::value::{Value, format_number};

/// Array methods that update their receiver.
const MUTATING: &[&str] = &["push", "pop", "shift", "unshift", "reverse", "sort", "splice"];

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn callback(args: &[Value], method: &str) -> ScriptResult<Value> {
    let f = arg(args, 0);
    if f.is_callable() {
        Ok(f)
    } else {
        Err(ScriptError::Type(format!("{method} expects a function argument")))
    }
}

/// Coerce to a number the way `Number(x)` does.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

/// Resolve a possibly negative relative index against `len`.
fn relative(value: &Value, len: usize, default: usize) -> usize {
    match value {
        Value::Number(n) if n.is_finite() => {
            let n = n.trunc();
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
        _ => default,
    }
}

pub(crate) fn iterate(value: &Value) -> ScriptResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.to_vec()),
        Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        other => Err(ScriptError::Type(format!(
            "value of type {} is not iterable",
            other.type_name()
        ))),
    }
}

pub(crate) fn is_mutating(receiver: &Value, method: &str) -> bool {
    matches!(receiver, Value::Array(_)) && MUTATING.contains(&method)
}

/// Dispatch a built-in method. `None` when the receiver has no such method.
pub(crate) fn call_method(
    interp: &mut Interpreter,
    receiver: &mut Value,
    method: &str,
    args: Vec<Value>,
) -> Option<ScriptResult<Value>> {
    match receiver {
        Value::String(s) => {
            let s = Arc::clone(s);
            string_method(&s, method, &args, interp)
        }
        Value::Array(items) => array_method(interp, Arc::make_mut(items), method, args),
        Value::Number(n) => number_method(*n, method, &args),
        _ => None,
    }
}

fn string_method(
    s: &str,
    method: &str,
    args: &[Value],
    interp: &mut Interpreter,
) -> Option<ScriptResult<Value>> {
    let text = |i: usize| arg(args, i).to_string();
    let value = match method {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::from(s),
        "includes" => Value::from(s.contains(&text(0))),
        "startsWith" => Value::from(s.starts_with(&text(0))),
        "endsWith" => Value::from(s.ends_with(&text(0))),
        "indexOf" => Value::Number(
            s.find(&text(0))
                .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
        ),
        "charAt" | "at" => {
            let chars: Vec<char> = s.chars().collect();
            let i = match (method, arg(args, 0)) {
                ("at", Value::Number(n)) if n < 0.0 => chars.len() as f64 + n,
                (_, v) => to_number(&v),
            };
            crate::value::index(i, chars.len())
                .map(|i| Value::from(chars[i].to_string()))
                .unwrap_or_else(|| if method == "at" { Value::Null } else { Value::from("") })
        }
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let (mut start, mut end) = if method == "slice" {
                (relative(&arg(args, 0), len, 0), relative(&arg(args, 1), len, len))
            } else {
                let clamp = |v: Value, d: usize| match v {
                    Value::Number(n) if !n.is_nan() => n.clamp(0.0, len as f64) as usize,
                    _ => d,
                };
                (clamp(arg(args, 0), 0), clamp(arg(args, 1), len))
            };
            if method == "substring" && start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Value::from(chars[start..end.max(start)].iter().collect::<String>())
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Null => vec![Value::from(s)],
                sep => {
                    let sep = sep.to_string();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::from(parts)
        }
        "replace" | "replaceAll" => {
            let pattern = arg(args, 0);
            if let Some(replace) = pattern.get("replace").filter(Value::is_callable) {
                return Some(interp.call(&replace, vec![Value::from(s), arg(args, 1)]));
            }
            let (from, to) = (pattern.to_string(), text(1));
            if method == "replace" {
                Value::from(s.replacen(&from, &to, 1))
            } else {
                Value::from(s.replace(&from, &to))
            }
        }
        "repeat" => {
            let count = to_number(&arg(args, 0));
            if !(0.0..=1_000_000.0).contains(&count) {
                return Some(Err(ScriptError::Type(format!("invalid repeat count {count}"))));
            }
            Value::from(s.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let width = to_number(&arg(args, 0)).clamp(0.0, 1_000_000.0) as usize;
            let fill = match arg(args, 1) {
                Value::Null => " ".to_string(),
                v => v.to_string(),
            };
            let len = s.chars().count();
            if len >= width || fill.is_empty() {
                Value::from(s)
            } else {
                let pad: String = fill.chars().cycle().take(width - len).collect();
                if method == "padStart" {
                    Value::from(format!("{pad}{s}"))
                } else {
                    Value::from(format!("{s}{pad}"))
                }
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&a.to_string());
            }
            Value::from(out)
        }
        _ => return None,
    };
    Some(Ok(value))
}

fn number_method(n: f64, method: &str, args: &[Value]) -> Option<ScriptResult<Value>> {
    let value = match method {
        "toFixed" => {
            let digits = to_number(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Some(Err(ScriptError::Type(format!(
                    "toFixed() digits argument must be between 0 and 100, got {digits}"
                ))));
            }
            Value::from(format!("{:.*}", digits as usize, n))
        }
        "toString" => Value::from(format_number(n)),
        _ => return None,
    };
    Some(Ok(value))
}

fn array_method(
    interp: &mut Interpreter,
    items: &mut Vec<Value>,
    method: &str,
    args: Vec<Value>,
) -> Option<ScriptResult<Value>> {
    let result = match method {
        "push" => {
            items.extend(args);
            Ok(Value::from(items.len()))
        }
        "pop" => Ok(items.pop().unwrap_or_default()),
        "shift" => Ok(if items.is_empty() {
            Value::Null
        } else {
            items.remove(0)
        }),
        "unshift" => {
            items.splice(0..0, args);
            Ok(Value::from(items.len()))
        }
        "reverse" => {
            items.reverse();
            Ok(Value::from(items.clone()))
        }
        "splice" => {
            let len = items.len();
            let start = relative(&arg(&args, 0), len, 0);
            let count = match args.get(1) {
                Some(v) => (to_number(v).max(0.0) as usize).min(len - start),
                None => len - start,
            };
            let inserted = args.into_iter().skip(2);
            let removed: Vec<Value> = items.splice(start..start + count, inserted).collect();
            Ok(Value::from(removed))
        }
        "sort" => sort(interp, items, args.first()).map(|()| Value::from(items.clone())),
        "join" => {
            let sep = match arg(&args, 0) {
                Value::Null => ",".to_string(),
                v => v.to_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|v| if v.is_null() { String::new() } else { v.to_string() })
                .collect();
            Ok(Value::from(parts.join(&sep)))
        }
        "includes" => {
            let needle = arg(&args, 0);
            Ok(Value::from(items.contains(&needle)))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            Ok(Value::Number(
                items.iter().position(|v| *v == needle).map_or(-1.0, |i| i as f64),
            ))
        }
        "slice" => {
            let len = items.len();
            let start = relative(&arg(&args, 0), len, 0);
            let end = relative(&arg(&args, 1), len, len).max(start);
            Ok(Value::from(items[start..end].to_vec()))
        }
        "concat" => {
            let mut out = items.clone();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::from(out))
        }
        "flat" => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                match item {
                    Value::Array(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::from(out))
        }
        "at" => {
            let len = items.len() as f64;
            let i = to_number(&arg(&args, 0));
            let i = if i < 0.0 { len + i } else { i };
            Ok(crate::value::index(i, items.len())
                .map(|i| items[i].clone())
                .unwrap_or_default())
        }
        "map" | "filter" | "forEach" | "find" | "findIndex" | "some" | "every" => {
            iterate_with(interp, items, method, &args)
        }
        "reduce" => reduce(interp, items, &args),
        _ => return None,
    };
    Some(result)
}

fn iterate_with(
    interp: &mut Interpreter,
    items: &[Value],
    method: &str,
    args: &[Value],
) -> ScriptResult<Value> {
    let f = callback(args, method)?;
    let mut mapped = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let out = interp.call(&f, vec![item.clone(), Value::from(i)])?;
        match method {
            "map" => mapped.push(out),
            "filter" if out.is_truthy() => mapped.push(item.clone()),
            "find" if out.is_truthy() => return Ok(item.clone()),
            "findIndex" if out.is_truthy() => return Ok(Value::from(i)),
            "some" if out.is_truthy() => return Ok(Value::Bool(true)),
            "every" if !out.is_truthy() => return Ok(Value::Bool(false)),
            _ => {}
        }
    }
    Ok(match method {
        "map" | "filter" => Value::from(mapped),
        "findIndex" => Value::Number(-1.0),
        "some" => Value::Bool(false),
        "every" => Value::Bool(true),
        _ => Value::Null,
    })
}

fn reduce(interp: &mut Interpreter, items: &[Value], args: &[Value]) -> ScriptResult<Value> {
    let f = callback(args, "reduce")?;
    let mut iter = items.iter().enumerate();
    let mut acc = match args.get(1) {
        Some(init) => init.clone(),
        None => match iter.next() {
            Some((_, first)) => first.clone(),
            None => {
                return Err(ScriptError::Type(
                    "reduce of empty array with no initial value".to_string(),
                ));
            }
        },
    };
    for (i, item) in iter {
        acc = interp.call(&f, vec![acc, item.clone(), Value::from(i)])?;
    }
    Ok(acc)
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Stable merge sort with a fallible comparator. Inconsistent comparators
/// produce an unspecified order, never a panic.
fn sort(interp: &mut Interpreter, items: &mut Vec<Value>, comparator: Option<&Value>) -> ScriptResult<()> {
    let comparator = comparator.filter(|c| !c.is_null()).cloned();
    if let Some(c) = &comparator {
        if !c.is_callable() {
            return Err(ScriptError::Type("sort comparator must be a function".to_string()));
        }
    }
    let mut compare = |a: &Value, b: &Value| -> ScriptResult<Ordering> {
        match &comparator {
            None => Ok(default_order(a, b)),
            Some(f) => {
                let n = to_number(&interp.call(f, vec![a.clone(), b.clone()])?);
                Ok(if n < 0.0 {
                    Ordering::Less
                } else if n > 0.0 {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                })
            }
        }
    };
    let sorted = merge_sort(items.clone(), &mut compare)?;
    *items = sorted;
    Ok(())
}

fn merge_sort(
    mut items: Vec<Value>,
    compare: &mut impl FnMut(&Value, &Value) -> ScriptResult<Ordering>,
) -> ScriptResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        let next = if compare(l, r)? == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        out.extend(next);
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

// ── Prelude ──────────────────────────────────────────────────────────────────

/// Install the standard globals into `scope`.
pub fn install_prelude(scope: &Scope) {
    scope.define("NaN", Value::Number(f64::NAN));
    scope.define("Infinity", Value::Number(f64::INFINITY));
    scope.define("JSON", json_object());
    scope.define("Math", math_object());
    scope.define("Object", object_object());
    scope.define(
        "Array",
        Value::object([
            (
                "isArray",
                Value::native("isArray", 1, |_, args| {
                    Ok(Value::from(matches!(arg(&args, 0), Value::Array(_))))
                }),
            ),
            (
                "from",
                Value::native("from", 1, |_, args| iterate(&arg(&args, 0)).map(Value::from)),
            ),
        ]),
    );
    scope.define(
        "String",
        Value::native("String", 1, |_, args| Ok(Value::from(arg(&args, 0).to_string()))),
    );
    scope.define(
        "Number",
        Value::native("Number", 1, |_, args| Ok(Value::Number(to_number(&arg(&args, 0))))),
    );
    scope.define(
        "Boolean",
        Value::native("Boolean", 1, |_, args| Ok(Value::Bool(arg(&args, 0).is_truthy()))),
    );
    scope.define(
        "isNaN",
        Value::native("isNaN", 1, |_, args| {
            Ok(Value::Bool(to_number(&arg(&args, 0)).is_nan()))
        }),
    );
    scope.define(
        "parseInt",
        Value::native("parseInt", 2, |_, args| {
            let radix = match arg(&args, 1) {
                Value::Number(r) if (2.0..=36.0).contains(&r) => r as u32,
                _ => 10,
            };
            Ok(Value::Number(parse_int(&arg(&args, 0).to_string(), radix)))
        }),
    );
    scope.define(
        "parseFloat",
        Value::native("parseFloat", 1, |_, args| {
            Ok(Value::Number(parse_float(&arg(&args, 0).to_string())))
        }),
    );
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let text = text.trim();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d))
        * sign
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim();
    // longest prefix that parses
    (1..=text.len())
        .rev()
        .filter(|end| text.is_char_boundary(*end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn json_object() -> Value {
    Value::object([
        (
            "stringify",
            Value::native("stringify", 3, |_, args| {
                let json = arg(&args, 0).to_json();
                let indent = match arg(&args, 2) {
                    Value::Number(n) if n >= 1.0 => " ".repeat(n.min(10.0) as usize),
                    Value::String(s) => s.chars().take(10).collect(),
                    _ => String::new(),
                };
                let text = if indent.is_empty() {
                    serde_json::to_string(&json)
                } else {
                    pretty(&json, indent.as_bytes())
                };
                text.map(Value::from)
                    .map_err(|e| ScriptError::host_with_source("JSON.stringify failed", e))
            }),
        ),
        (
            "parse",
            Value::native("parse", 1, |_, args| {
                let text = arg(&args, 0).to_string();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| Value::from_json(&json))
                    .map_err(|e| ScriptError::host_with_source(format!("JSON.parse: {e}"), e))
            }),
        ),
    ])
}

fn pretty(json: &serde_json::Value, indent: &[u8]) -> serde_json::Result<String> {
    use serde::Serialize;

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn math_object() -> Value {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
        (
            name,
            Value::native(name, 1, move |_, args| {
                Ok(Value::Number(f(to_number(&arg(&args, 0)))))
            }),
        )
    }
    Value::object([
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("round", |n| (n + 0.5).floor()),
        unary("abs", f64::abs),
        unary("sqrt", f64::sqrt),
        unary("trunc", f64::trunc),
        unary("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
        (
            "pow",
            Value::native("pow", 2, |_, args| {
                Ok(Value::Number(
                    to_number(&arg(&args, 0)).powf(to_number(&arg(&args, 1))),
                ))
            }),
        ),
        (
            "min",
            Value::native("min", 2, |_, args| {
                Ok(Value::Number(args.iter().map(to_number).fold(
                    f64::INFINITY,
                    |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) },
                )))
            }),
        ),
        (
            "max",
            Value::native("max", 2, |_, args| {
                Ok(Value::Number(args.iter().map(to_number).fold(
                    f64::NEG_INFINITY,
                    |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) },
                )))
            }),
        ),
    ])
}

fn entries_of(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

fn object_object() -> Value {
    Value::object([
        (
            "keys",
            Value::native("keys", 1, |_, args| {
                Ok(Value::from(
                    entries_of(&arg(&args, 0))
                        .into_iter()
                        .map(|(k, _)| Value::from(k))
                        .collect::<Vec<_>>(),
                ))
            }),
        ),
        (
            "values",
            Value::native("values", 1, |_, args| {
                Ok(Value::from(
                    entries_of(&arg(&args, 0))
                        .into_iter()
                        .map(|(_, v)| v)
                        .collect::<Vec<_>>(),
                ))
            }),
        ),
        (
            "entries",
            Value::native("entries", 1, |_, args| {
                Ok(Value::from(
                    entries_of(&arg(&args, 0))
                        .into_iter()
                        .map(|(k, v)| Value::from(vec![Value::from(k), v]))
                        .collect::<Vec<_>>(),
                ))
            }),
        ),
        (
            "assign",
            Value::native("assign", 2, |_, args| {
                let mut merged = BTreeMap::new();
                for source in &args {
                    merged.extend(entries_of(source));
                }
                Ok(Value::Object(Arc::new(merged)))
            }),
        ),
        (
            "fromEntries",
            Value::native("fromEntries", 1, |_, args| {
                let mut map = BTreeMap::new();
                for entry in iterate(&arg(&args, 0))? {
                    let key = entry.property(&Value::Number(0.0))?;
                    let value = entry.property(&Value::Number(1.0))?;
                    map.insert(key.to_string(), value);
                }
                Ok(Value::Object(Arc::new(map)))
            }),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::interp::Limits;
    use serde_json::json;

    fn eval(expr: &str) -> serde_json::Value {
        let program = compile(&format!("export default {expr}"), "t").unwrap();
        let scope = Scope::root();
        install_prelude(&scope);
        let exports = Interpreter::new(Limits::default())
            .run_module(&program, &scope)
            .unwrap();
        exports.get("default").unwrap_or_default().to_json()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("'  Hi '.trim().toUpperCase()"), json!("HI"));
        assert_eq!(eval("'a,b,c'.split(',')"), json!(["a", "b", "c"]));
        assert_eq!(eval("'hello'.slice(1, -1)"), json!("ell"));
        assert_eq!(eval("'hello'.indexOf('l')"), json!(2));
        assert_eq!(eval("'a-b-c'.replace('-', '+')"), json!("a+b-c"));
        assert_eq!(eval("'5'.padStart(3, '0')"), json!("005"));
        assert_eq!(eval("'hello'.length"), json!(5));
    }

    #[test]
    fn test_array_callbacks() {
        assert_eq!(eval("[1, 2, 3].map(x => x * 2)"), json!([2, 4, 6]));
        assert_eq!(eval("[1, 2, 3, 4].filter(x => x % 2 == 0)"), json!([2, 4]));
        assert_eq!(eval("[1, 2, 3].reduce((a, b) => a + b, 0)"), json!(6));
        assert_eq!(eval("[1, 2, 3].find(x => x > 1)"), json!(2));
        assert_eq!(eval("[1, 2, 3].some(x => x > 2)"), json!(true));
        assert_eq!(eval("[1, 2, 3].every(x => x > 2)"), json!(false));
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(eval("[1, 2].concat([3], 4)"), json!([1, 2, 3, 4]));
        assert_eq!(eval("['a', null, 'b'].join('-')"), json!("a--b"));
        assert_eq!(eval("[3, 1, 2].includes(2)"), json!(true));
        assert_eq!(eval("[1, 2, 3].slice(-2)"), json!([2, 3]));
        assert_eq!(eval("[10, 9, 1].sort()"), json!([1, 9, 10]));
        assert_eq!(eval("[1, 2, 3].sort((a, b) => b - a)"), json!([3, 2, 1]));
    }

    #[test]
    fn test_mutating_methods_write_back() {
        let source = "
            let xs = [1, 2, 3]
            let n = xs.push(4, 5)
            let last = xs.pop()
            let first = xs.shift()
            xs.unshift(0)
            let removed = xs.splice(1, 1)
            export default { xs, n, last, first, removed }
        ";
        let program = compile(source, "t").unwrap();
        let scope = Scope::root();
        let exports = Interpreter::new(Limits::default())
            .run_module(&program, &scope)
            .unwrap();
        assert_eq!(
            exports.get("default").unwrap().to_json(),
            json!({"xs": [0, 3, 4], "n": 5, "last": 5, "first": 1, "removed": [2]})
        );
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(eval("(3.14159).toFixed(2)"), json!("3.14"));
        assert_eq!(eval("(42).toString()"), json!("42"));
    }

    #[test]
    fn test_json_prelude() {
        assert_eq!(eval("JSON.stringify({ a: [1, 'x'] })"), json!("{\"a\":[1,\"x\"]}"));
        assert_eq!(eval("JSON.parse('{\"n\": 2}').n"), json!(2));
        assert_eq!(eval("JSON.stringify({ a: 1 }, null, 2)"), json!("{\n  \"a\": 1\n}"));
    }

    #[test]
    fn test_math_and_conversions() {
        assert_eq!(eval("Math.max(1, 5, 3)"), json!(5));
        assert_eq!(eval("Math.round(2.5)"), json!(3));
        assert_eq!(eval("Math.pow(2, 10)"), json!(1024));
        assert_eq!(eval("Number('42')"), json!(42));
        assert_eq!(eval("String(1.5)"), json!("1.5"));
        assert_eq!(eval("isNaN(Number('x'))"), json!(true));
        assert_eq!(eval("parseInt('12px')"), json!(12));
        assert_eq!(eval("parseFloat('1.5e3x')"), json!(1500));
    }

    #[test]
    fn test_object_prelude() {
        assert_eq!(eval("Object.keys({ b: 1, a: 2 })"), json!(["a", "b"]));
        assert_eq!(eval("Object.assign({ a: 1 }, { b: 2 }, { a: 3 })"), json!({"a": 3, "b": 2}));
        assert_eq!(eval("Object.entries({ a: 1 })"), json!([["a", 1]]));
        assert_eq!(eval("Array.isArray([])"), json!(true));
    }

    #[test]
    fn test_sort_comparator_errors_propagate() {
        let program = compile("export default [2, 1].sort((a, b) => a.nope())", "t").unwrap();
        let scope = Scope::root();
        let err = Interpreter::new(Limits::default())
            .run_module(&program, &scope)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
    }
}
