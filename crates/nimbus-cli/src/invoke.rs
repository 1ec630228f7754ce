//! Invoke command implementation for Nimbus CLI.
//!
//! Runs one function headlessly with the same context the server builds,
//! and prints the `{ data | error, time_usage }` envelope.

use std::collections::BTreeMap;

use nimbus_core::{InvocationContext, Runtime};

use crate::colors;

/// Request fields collected from the command line.
pub struct Request {
    pub queries: Vec<String>,
    pub headers: Vec<String>,
    pub body: Option<String>,
    pub method: String,
    pub use_interceptor: bool,
}

impl Request {
    fn into_context(self, name: &str) -> anyhow::Result<InvocationContext> {
        let mut query = serde_json::Map::new();
        for pair in &self.queries {
            let (key, value) = split_pair(pair, '=')
                .ok_or_else(|| anyhow::anyhow!("Query must be key=value: {pair}"))?;
            query.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }

        let mut headers = BTreeMap::new();
        for pair in &self.headers {
            let (key, value) = split_pair(pair, ':')
                .ok_or_else(|| anyhow::anyhow!("Header must be name:value: {pair}"))?;
            headers.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }

        Ok(InvocationContext::new(name)
            .with_method(self.method.to_ascii_uppercase())
            .with_headers(headers)
            .with_query(serde_json::Value::Object(query))
            .with_params(serde_json::json!({ "name": name }))
            .with_body(self.body.as_deref().map(parse_body).unwrap_or_default())
            .with_url(format!("/{name}")))
    }
}

/// Invoke `name` and print its envelope. Returns whether it succeeded.
pub fn execute(runtime: &Runtime, name: &str, request: Request) -> anyhow::Result<bool> {
    runtime.initialize()?;

    let use_interceptor = request.use_interceptor && runtime.has_interceptor();
    let ctx = request.into_context(name)?;
    let result = runtime.invoke(name, &ctx, use_interceptor)?;

    println!("{}", serde_json::to_string_pretty(&result.to_json())?);

    if result.is_ok() {
        eprintln!(
            "{}Completed{} {} in {:.3}ms",
            colors::GREEN,
            colors::RESET,
            name,
            result.elapsed_ms
        );
    } else {
        eprintln!(
            "{}Failed{} {} in {:.3}ms",
            colors::RED,
            colors::RESET,
            name,
            result.elapsed_ms
        );
    }

    Ok(result.is_ok())
}

fn split_pair(pair: &str, separator: char) -> Option<(&str, &str)> {
    let (key, value) = pair.split_once(separator)?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// JSON when it parses, otherwise the raw text.
fn parse_body(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::RuntimeConfig;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn request() -> Request {
        Request {
            queries: vec!["name=Ann".into(), "tag=a=b".into()],
            headers: vec!["X-Token: secret".into()],
            body: Some(r#"{"n":1}"#.into()),
            method: "post".into(),
            use_interceptor: true,
        }
    }

    #[test]
    fn test_request_into_context() {
        let ctx = request().into_context("api/users").unwrap();
        assert_eq!(ctx.function_name, "api/users");
        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.query, json!({"name": "Ann", "tag": "a=b"}));
        assert_eq!(ctx.headers["x-token"], "secret");
        assert_eq!(ctx.body, json!({"n": 1}));
        assert_eq!(ctx.url, "/api/users");
    }

    #[test]
    fn test_malformed_pairs_rejected() {
        let mut bad = request();
        bad.queries = vec!["novalue".into()];
        assert!(bad.into_context("f").is_err());

        let mut bad = request();
        bad.headers = vec![":value".into()];
        assert!(bad.into_context("f").is_err());
    }

    #[test]
    fn test_text_body_kept_as_string() {
        assert_eq!(parse_body("plain words"), json!("plain words"));
        assert_eq!(parse_body("[1,2]"), json!([1, 2]));
    }

    #[test]
    fn test_execute_reports_outcome() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("greet.ns"),
            "export default fn(ctx) { return 'hi ' + ctx.query.name }",
        )
        .unwrap();
        fs::write(dir.path().join("broken.ns"), "export default fn() { throw 'nope' }").unwrap();
        let runtime = Runtime::new(RuntimeConfig::new(dir.path()));

        assert!(execute(&runtime, "greet", request()).unwrap());
        assert!(!execute(&runtime, "broken", request()).unwrap());
        assert!(execute(&runtime, "missing", request()).is_err());
    }
}
