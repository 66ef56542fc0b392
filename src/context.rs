//! Per-request view used while resolving template variables.
//!
//! A [`RequestContext`] is built once per inbound request, right before the
//! response templates are rendered, and dropped once the response is sent.
//! The request body is buffered by the server before the context exists, so
//! every body lookup inside one request sees the same bytes.

use crate::error::VariableError;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Read access to environment variables.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Snapshot of one request.
pub struct RequestContext {
    method: Method,
    headers: HeaderMap,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    body: Bytes,
    /// Parsed once on the first JSON path lookup.
    json: OnceLock<Option<Value>>,
    env: Arc<dyn Environment>,
}

impl RequestContext {
    /// Create an empty context for the given method.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: HashMap::new(),
            params: HashMap::new(),
            body: Bytes::new(),
            json: OnceLock::new(),
            env: Arc::new(ProcessEnvironment),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a single header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Parse a raw query string (`a=1&b=2`). The first value of a repeated
    /// name wins.
    pub fn with_query_string(mut self, query: &str) -> Self {
        self.query = parse_query_string(query);
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.json = OnceLock::new();
        self
    }

    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        let value = self.headers.get(name)?;
        let value = match value.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        non_empty(value)
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned().and_then(non_empty)
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned().and_then(non_empty)
    }

    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env.var(name).and_then(non_empty)
    }

    /// The whole body as text.
    pub fn raw_body(&self) -> Result<String, VariableError> {
        if self.body.is_empty() {
            return Err(VariableError::NoBody);
        }
        Ok(String::from_utf8_lossy(&self.body).into_owned())
    }

    /// Walk a dot-separated path into the JSON body.
    ///
    /// Strings come back unquoted; any other value is returned as compact
    /// JSON text.
    pub fn json_path(&self, path: &str) -> Result<String, VariableError> {
        if self.body.is_empty() {
            return Err(VariableError::NoBody);
        }

        let root = self
            .json
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
            .ok_or(VariableError::InvalidJsonBody)?;

        let mut current = root;
        for segment in path.split('.') {
            let object = current
                .as_object()
                .ok_or(VariableError::InvalidJsonBody)?;
            current = object
                .get(segment)
                .ok_or(VariableError::VariableNotFound)?;
        }

        match current {
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("params", &self.params)
            .field("body_len", &self.body.len())
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parse a query string into name/value pairs, keeping the first value of
/// each name.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> RequestContext {
        RequestContext::new(Method::GET)
            .with_header("testheader", "headervalue")
            .with_query_string("testquery=queryvalue")
            .with_param("testparam", "paramvalue")
            .with_body(r#"{"test": "body"}"#)
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let ctx = test_context().with_header("X-Request-Id", "abc");
        assert_eq!(ctx.header("testheader").as_deref(), Some("headervalue"));
        assert_eq!(ctx.header("TestHeader").as_deref(), Some("headervalue"));
        assert_eq!(ctx.header("x-request-id").as_deref(), Some("abc"));
        assert_eq!(ctx.header("badheader"), None);
    }

    #[test]
    fn test_header_first_value_wins() {
        let ctx = RequestContext::new(Method::GET)
            .with_header("accept", "text/plain")
            .with_header("accept", "application/json");
        assert_eq!(ctx.header("accept").as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_empty_values_are_not_found() {
        let mut env = HashMap::new();
        env.insert("EMPTY".to_string(), String::new());

        let ctx = RequestContext::new(Method::GET)
            .with_header("x-empty", "")
            .with_query_string("q=")
            .with_param("id", "")
            .with_environment(Arc::new(env));

        assert_eq!(ctx.header("x-empty"), None);
        assert_eq!(ctx.query("q"), None);
        assert_eq!(ctx.param("id"), None);
        assert_eq!(ctx.env_var("EMPTY"), None);
    }

    #[test]
    fn test_query_first_value_and_decoding() {
        let ctx = RequestContext::new(Method::GET)
            .with_query_string("name=John%20Doe&tag=a&tag=b&plus=x+y");
        assert_eq!(ctx.query("name").as_deref(), Some("John Doe"));
        assert_eq!(ctx.query("tag").as_deref(), Some("a"));
        assert_eq!(ctx.query("plus").as_deref(), Some("x y"));
        assert_eq!(ctx.query("badquery"), None);
    }

    #[test]
    fn test_param_lookup() {
        let ctx = test_context();
        assert_eq!(ctx.param("testparam").as_deref(), Some("paramvalue"));
        assert_eq!(ctx.param("TESTPARAM"), None);
    }

    #[test]
    fn test_environment_lookup() {
        let mut env = HashMap::new();
        env.insert("testenv".to_string(), "envvalue".to_string());
        let ctx = test_context().with_environment(Arc::new(env));

        assert_eq!(ctx.env_var("testenv").as_deref(), Some("envvalue"));
        assert_eq!(ctx.env_var("badenv"), None);
    }

    #[test]
    fn test_raw_body() {
        let ctx = RequestContext::new(Method::POST).with_body("test body");
        assert_eq!(ctx.raw_body().unwrap(), "test body");
        // Reading twice yields the same content.
        assert_eq!(ctx.raw_body().unwrap(), "test body");

        let empty = RequestContext::new(Method::POST);
        assert_eq!(empty.raw_body(), Err(VariableError::NoBody));
    }

    #[test]
    fn test_json_path() {
        let cases = [
            (r#"{"test": "value"}"#, "test", Ok("value")),
            (r#"{"test": {"nested": "value2"}}"#, "test.nested", Ok("value2")),
            (
                r#"{"test": {"nested": {"key": "value"}}}"#,
                "test.nested",
                Ok(r#"{"key":"value"}"#),
            ),
            (
                r#"{"test": {"nested": ["value1", "value2"]}}"#,
                "test.nested",
                Ok(r#"["value1","value2"]"#),
            ),
            (r#"{"test": 1}"#, "test", Ok("1")),
            (r#"{"test": true}"#, "test", Ok("true")),
            (r#"{"test": null}"#, "test", Ok("null")),
            (r#"{"test": "value""#, "test", Err(VariableError::InvalidJsonBody)),
            (r#"{"test": "value"}"#, "bad", Err(VariableError::VariableNotFound)),
            (r#"{"test": "value"}"#, "test.deeper", Err(VariableError::InvalidJsonBody)),
            (r#"["value"]"#, "0", Err(VariableError::InvalidJsonBody)),
            ("", "test", Err(VariableError::NoBody)),
        ];

        for (body, path, expected) in cases {
            let ctx = RequestContext::new(Method::POST).with_body(body);
            let result = ctx.json_path(path);
            assert_eq!(
                result.as_deref().map_err(|e| *e),
                expected,
                "body {:?} path {:?}",
                body,
                path
            );
        }
    }

    #[test]
    fn test_json_and_raw_body_share_buffer() {
        let ctx = RequestContext::new(Method::POST).with_body(r#"{"a": {"b": "c"}}"#);
        assert_eq!(ctx.json_path("a.b").unwrap(), "c");
        assert_eq!(ctx.raw_body().unwrap(), r#"{"a": {"b": "c"}}"#);
        assert_eq!(ctx.json_path("a").unwrap(), r#"{"b":"c"}"#);
    }
}
