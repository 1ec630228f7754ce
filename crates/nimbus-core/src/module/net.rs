//! Network capabilities: `URL(href)` and `fetch(url, options?)`.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use nimbus_script::{ScriptError, Value};
use reqwest::Method;
use reqwest::blocking::Client;
use url::Url;

use super::packages::{parse_query, text};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn url_constructor() -> Value {
    Value::native("URL", 2, |_, args| {
        let href = text(&args, 0);
        let base = text(&args, 1);
        let parsed = if base.is_empty() {
            Url::parse(&href)
        } else {
            Url::parse(&base).and_then(|base| base.join(&href))
        };
        let url = parsed
            .map_err(|e| ScriptError::host_with_source(format!("invalid URL `{href}`"), e))?;
        Ok(url_value(&url))
    })
}

/// Object form of a parsed URL.
pub(crate) fn url_value(url: &Url) -> Value {
    let hostname = url.host_str().unwrap_or_default();
    let port = url.port().map(|p| p.to_string()).unwrap_or_default();
    let host = if port.is_empty() {
        hostname.to_string()
    } else {
        format!("{hostname}:{port}")
    };
    let search = url.query().map(|q| format!("?{q}")).unwrap_or_default();
    let hash = url.fragment().map(|f| format!("#{f}")).unwrap_or_default();

    Value::object([
        ("href", Value::from(url.as_str())),
        ("protocol", Value::from(format!("{}:", url.scheme()))),
        ("username", Value::from(url.username())),
        ("host", Value::from(host)),
        ("hostname", Value::from(hostname)),
        ("port", Value::from(port)),
        ("pathname", Value::from(url.path())),
        ("query", parse_query(url.query().unwrap_or_default())),
        ("search", Value::from(search)),
        ("hash", Value::from(hash)),
    ])
}

fn client() -> Result<&'static Client, ScriptError> {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }
    let client = Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| ScriptError::host_with_source("failed to build HTTP client", e))?;
    Ok(CLIENT.get_or_init(|| client))
}

pub(crate) fn fetch() -> Value {
    Value::native("fetch", 2, |_, args| {
        let url = text(&args, 0);
        let options = args.get(1).cloned().unwrap_or_default();

        let method = match options.get("method") {
            Some(Value::String(m)) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| ScriptError::Type(format!("invalid HTTP method `{m}`")))?,
            _ => Method::GET,
        };

        let mut request = client()?.request(method.clone(), &url);
        if let Some(headers) = options.get("headers") {
            if let Some(headers) = headers.as_object() {
                for (name, value) in headers {
                    request = request.header(name.as_str(), text(std::slice::from_ref(value), 0));
                }
            }
        }
        match options.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::String(body)) => request = request.body(body.to_string()),
            Some(other) => {
                request = request
                    .header("content-type", "application/json")
                    .body(other.to_json().to_string());
            }
        }

        tracing::debug!(%method, %url, "fetch");
        let response = request
            .send()
            .map_err(|e| ScriptError::host_with_source(format!("fetch {url} failed: {e}"), e))?;

        let status = response.status();
        let headers: BTreeMap<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Value::from(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                )
            })
            .collect();
        let body = response
            .text()
            .map_err(|e| ScriptError::host_with_source(format!("reading {url} failed: {e}"), e))?;
        let json = serde_json::from_str::<serde_json::Value>(&body)
            .map(|json| Value::from_json(&json))
            .unwrap_or_default();

        Ok(Value::object([
            ("status", Value::from(status.as_u16() as i64)),
            ("ok", Value::Bool(status.is_success())),
            ("headers", Value::object(headers)),
            ("body", Value::from(body)),
            ("json", json),
        ]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_fields() {
        let url = Url::parse("https://ann@api.example.com:8443/v1/users?id=7&tag=a#top").unwrap();
        let value = url_value(&url);
        assert_eq!(
            value.to_json(),
            serde_json::json!({
                "href": "https://ann@api.example.com:8443/v1/users?id=7&tag=a#top",
                "protocol": "https:",
                "username": "ann",
                "host": "api.example.com:8443",
                "hostname": "api.example.com",
                "port": "8443",
                "pathname": "/v1/users",
                "query": {"id": "7", "tag": "a"},
                "search": "?id=7&tag=a",
                "hash": "#top",
            })
        );
    }

    #[test]
    fn test_url_with_base() {
        let ctor = url_constructor();
        let mut interp = nimbus_script::Interpreter::new(Default::default());
        let value = interp
            .call(&ctor, vec![Value::from("../b?x=1"), Value::from("http://h/a/c")])
            .unwrap();
        assert_eq!(value.get("href"), Some(Value::from("http://h/b?x=1")));
    }

    #[test]
    fn test_invalid_url_is_host_error() {
        let ctor = url_constructor();
        let mut interp = nimbus_script::Interpreter::new(Default::default());
        let err = interp.call(&ctor, vec![Value::from("not a url")]).unwrap_err();
        assert!(err.to_string().starts_with("invalid URL"));
    }
}
