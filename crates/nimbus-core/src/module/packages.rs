//! Host packages: the external-specifier loader.
//!
//! Anything `require`d that is neither the SDK alias nor a workspace path is
//! looked up here by its exact specifier. Two packages ship built in, `path`
//! and `querystring`; embedders add their own with
//! [`PackageRegistry::register`].

use std::collections::BTreeMap;

use nimbus_script::{Value, format_number};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Named host packages.
pub struct PackageRegistry {
    packages: RwLock<FxHashMap<String, Value>>,
}

impl Default for PackageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageRegistry {
    /// Registry holding the built-in packages.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("path", path_package());
        registry.register("querystring", querystring_package());
        registry
    }

    pub fn empty() -> Self {
        Self {
            packages: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register (or replace) a package under `name`.
    pub fn register(&self, name: impl Into<String>, exports: Value) {
        self.packages.write().insert(name.into(), exports);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.packages.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.packages.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Default export of the SDK alias.
pub fn default_sdk() -> Value {
    Value::object([
        ("name", Value::from("nimbus")),
        ("version", Value::from(env!("CARGO_PKG_VERSION"))),
    ])
}

/// String form of an argument; missing arguments are empty.
pub(crate) fn text(args: &[Value], idx: usize) -> String {
    match args.get(idx) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.to_string(),
        Some(other) => other.to_string(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// path
// ══════════════════════════════════════════════════════════════════════════════

fn path_package() -> Value {
    Value::object([
        (
            "join",
            Value::native("join", 0, |_, args| {
                let parts: Vec<String> = (0..args.len())
                    .map(|i| text(&args, i))
                    .filter(|p| !p.is_empty())
                    .collect();
                Ok(Value::from(normalize_posix(&parts.join("/"))))
            }),
        ),
        (
            "dirname",
            Value::native("dirname", 1, |_, args| {
                Ok(Value::from(dirname(&text(&args, 0))))
            }),
        ),
        (
            "basename",
            Value::native("basename", 2, |_, args| {
                let base = basename(&text(&args, 0)).to_string();
                let ext = text(&args, 1);
                let base = match base.strip_suffix(&ext) {
                    Some(stripped) if !ext.is_empty() && !stripped.is_empty() => stripped.to_string(),
                    _ => base,
                };
                Ok(Value::from(base))
            }),
        ),
        (
            "extname",
            Value::native("extname", 1, |_, args| {
                Ok(Value::from(extname(&text(&args, 0))))
            }),
        ),
    ])
}

fn normalize_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let body = parts.join("/");
    if absolute {
        format!("/{body}")
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." }.to_string();
    }
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => ".".to_string(),
    }
}

fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

fn extname(path: &str) -> String {
    let base = basename(path);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx..].to_string(),
        _ => String::new(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// querystring
// ══════════════════════════════════════════════════════════════════════════════

fn querystring_package() -> Value {
    Value::object([
        (
            "parse",
            Value::native("parse", 1, |_, args| Ok(parse_query(&text(&args, 0)))),
        ),
        (
            "stringify",
            Value::native("stringify", 1, |_, args| {
                Ok(Value::from(stringify_query(
                    args.first().unwrap_or(&Value::Null),
                )))
            }),
        ),
    ])
}

/// Parse a query string into an object. Repeated keys collect into an array.
pub(crate) fn parse_query(query: &str) -> Value {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut fields: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::from(value.into_owned());
        match fields.remove(key.as_ref()) {
            None => {
                fields.insert(key.into_owned(), value);
            }
            Some(Value::Array(items)) => {
                let mut items = items.as_ref().clone();
                items.push(value);
                fields.insert(key.into_owned(), Value::from(items));
            }
            Some(previous) => {
                fields.insert(key.into_owned(), Value::from(vec![previous, value]));
            }
        }
    }
    Value::object(fields)
}

fn stringify_query(value: &Value) -> String {
    let mut out = url::form_urlencoded::Serializer::new(String::new());
    if let Some(fields) = value.as_object() {
        for (key, value) in fields {
            match value {
                Value::Array(items) => {
                    for item in items.iter() {
                        out.append_pair(key, &scalar(item));
                    }
                }
                other => {
                    out.append_pair(key, &scalar(other));
                }
            }
        }
    }
    out.finish()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.to_string(),
        Value::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_helpers() {
        assert_eq!(normalize_posix("a/./b/../c"), "a/c");
        assert_eq!(normalize_posix("/a/../../b"), "/b");
        assert_eq!(normalize_posix("../x"), "../x");
        assert_eq!(dirname("/srv/app/index.ns"), "/srv/app");
        assert_eq!(dirname("index.ns"), ".");
        assert_eq!(basename("/srv/app/index.ns"), "index.ns");
        assert_eq!(extname("archive.tar.gz"), ".gz");
        assert_eq!(extname(".profile"), "");
    }

    #[test]
    fn test_query_parse_collects_repeats() {
        let parsed = parse_query("?tag=a&tag=b&q=hello%20world");
        assert_eq!(
            parsed.to_json(),
            serde_json::json!({"tag": ["a", "b"], "q": "hello world"})
        );
    }

    #[test]
    fn test_query_stringify() {
        let value = Value::object([
            ("page", Value::from(2i64)),
            ("tag", Value::from(vec![Value::from("a"), Value::from("b c")])),
        ]);
        assert_eq!(stringify_query(&value), "page=2&tag=a&tag=b+c");
    }

    #[test]
    fn test_registry_register() {
        let registry = PackageRegistry::new();
        assert_eq!(registry.names(), vec!["path", "querystring"]);
        registry.register("answer", Value::from(42i64));
        assert_eq!(registry.get("answer"), Some(Value::from(42i64)));
        assert!(registry.get("left-pad").is_none());
    }
}
