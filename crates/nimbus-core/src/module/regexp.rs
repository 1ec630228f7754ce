//! `RegExp(pattern, flags?)` for sandboxed code.
//!
//! Flags: `i` (case-insensitive), `m` (multi-line), `s` (dot matches newline)
//! and `g` (replace every match instead of the first).

use std::sync::Arc;

use nimbus_script::{ScriptError, Value};
use regex::{Regex, RegexBuilder};

use super::packages::text;

pub(crate) fn constructor() -> Value {
    Value::native("RegExp", 2, |_, args| {
        let pattern = text(&args, 0);
        let flags = text(&args, 1);
        compile(&pattern, &flags)
    })
}

fn compile(pattern: &str, flags: &str) -> Result<Value, ScriptError> {
    let mut builder = RegexBuilder::new(pattern);
    let mut global = false;
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'g' => global = true,
            other => {
                return Err(ScriptError::Type(format!(
                    "invalid regular expression flag `{other}`"
                )));
            }
        }
    }
    let regex = builder.build().map_err(|e| {
        ScriptError::host_with_source(format!("invalid regular expression /{pattern}/"), e)
    })?;
    Ok(object(Arc::new(regex), pattern, flags, global))
}

fn object(regex: Arc<Regex>, pattern: &str, flags: &str, global: bool) -> Value {
    let test = {
        let regex = Arc::clone(&regex);
        Value::native("test", 1, move |_, args| {
            Ok(Value::Bool(regex.is_match(&text(&args, 0))))
        })
    };
    let exec = {
        let regex = Arc::clone(&regex);
        Value::native("exec", 1, move |_, args| {
            let haystack = text(&args, 0);
            let Some(captures) = regex.captures(&haystack) else {
                return Ok(Value::Null);
            };
            let groups: Vec<Value> = captures
                .iter()
                .map(|m| m.map(|m| Value::from(m.as_str())).unwrap_or_default())
                .collect();
            Ok(Value::from(groups))
        })
    };
    let replace = Value::native("replace", 2, move |_, args| {
        let haystack = text(&args, 0);
        let replacement = text(&args, 1);
        let replaced = if global {
            regex.replace_all(&haystack, replacement.as_str())
        } else {
            regex.replace(&haystack, replacement.as_str())
        };
        Ok(Value::from(replaced.into_owned()))
    });

    Value::object([
        ("source", Value::from(pattern)),
        ("flags", Value::from(flags)),
        ("test", test),
        ("exec", exec),
        ("replace", replace),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(value: &Value, method: &str, args: Vec<Value>) -> Value {
        let f = value.get(method).unwrap();
        let mut interp = nimbus_script::Interpreter::new(Default::default());
        interp.call(&f, args).unwrap()
    }

    #[test]
    fn test_case_insensitive_test() {
        let re = compile("^hello", "i").unwrap();
        assert_eq!(call(&re, "test", vec![Value::from("HELLO there")]), Value::Bool(true));
        assert_eq!(re.get("source"), Some(Value::from("^hello")));
    }

    #[test]
    fn test_exec_groups() {
        let re = compile(r"(\w+)@(\w+)\.com", "").unwrap();
        let groups = call(&re, "exec", vec![Value::from("mail ann@example.com now")]);
        assert_eq!(
            groups.to_json(),
            serde_json::json!(["ann@example.com", "ann", "example"])
        );
        assert!(call(&re, "exec", vec![Value::from("nothing")]).is_null());
    }

    #[test]
    fn test_global_replace() {
        let first = compile("o", "").unwrap();
        let all = compile("o", "g").unwrap();
        let args = || vec![Value::from("foo"), Value::from("0")];
        assert_eq!(call(&first, "replace", args()), Value::from("f0o"));
        assert_eq!(call(&all, "replace", args()), Value::from("f00"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(compile("(", ""), Err(ScriptError::Host { .. })));
        assert!(matches!(compile("a", "x"), Err(ScriptError::Type(_))));
    }
}
