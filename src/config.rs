//! Configuration for the mock server.
//!
//! Two layers: [`MocksConfig`] is the declarative routes file (YAML), and
//! [`ServerConfig`] holds listener/TLS/logging options gathered from the
//! command line and environment.

use crate::template::UnresolvedPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Example mocks file, printed by `--print-config`.
pub const EXAMPLE_MOCKS: &str = r#"# MockItOut routes file
settings:
  on_unresolved: keep

routes:
  hello:
    path: "/hi"
    response_headers:
      "content-type": "application/json"
      "server": "MockItOut"
    # Multi-line values can be created like this
    body: |
      {
        "greeting": "Hello",
        "name": "World"
      }

  deny:
    path: "/no"
    response_headers:
      "content-type": "application/json"
    body: |
      {"status": false}
    return_code: 403

  user:
    path: "/users/:id"
    methods: [GET]
    response_headers:
      "content-type": "application/json"
      "x-request-id": "{{$guid}}"
    body:
      type: json
      content:
        id: "{{param.id}}"
        name: "{{$randomFirstName}} {{$randomLastName}}"
        email: "{{$randomEmail}}"
        created: "{{$isoTimestamp}}"

  echo:
    path: "/echo"
    methods: [POST, PUT]
    response_headers:
      "content-type": "text/plain"
    body: "{{header.user-agent}} sent {{body}}"
"#;

/// The routes file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MocksConfig {
    /// Mocked endpoints, keyed by route name
    #[serde(default)]
    pub routes: BTreeMap<String, RouteDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MocksConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("could not read mocks file {}: {}", path.display(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| anyhow::anyhow!("error parsing mocks file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.routes.is_empty() {
            anyhow::bail!("no routes defined in mocks file");
        }
        for (name, route) in &self.routes {
            route
                .validate()
                .map_err(|e| anyhow::anyhow!("Route {}: {}", name, e))?;
        }
        Ok(())
    }
}

/// A single mocked endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    /// Path pattern, e.g. `/users/:id` or `/static/*file`
    pub path: String,

    /// HTTP methods served by this route
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,

    /// Response headers; values may contain variable tokens
    #[serde(default)]
    pub response_headers: HashMap<String, String>,

    /// HTTP status code
    #[serde(default = "default_status")]
    pub return_code: u16,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Whether variable tokens are resolved
    #[serde(default = "default_true")]
    pub template: bool,
}

fn default_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_status() -> u16 {
    200
}

fn default_true() -> bool {
    true
}

impl RouteDefinition {
    /// Validate the route definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.path.starts_with('/') {
            anyhow::bail!("path must start with '/': {}", self.path);
        }
        if !(100..=599).contains(&self.return_code) {
            anyhow::bail!("Invalid status code: {}", self.return_code);
        }
        if self.methods.is_empty() {
            anyhow::bail!("at least one method is required");
        }
        for method in &self.methods {
            http::Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| anyhow::anyhow!("Invalid method: {}", method))?;
        }
        for name in self.response_headers.keys() {
            http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| anyhow::anyhow!("Invalid header name: {}", name))?;
        }
        if let Some(body) = &self.body {
            body.validate()?;
        }
        Ok(())
    }

    /// Every template string of this route: header values and text bodies.
    pub fn templates(&self) -> Vec<&str> {
        let mut templates: Vec<&str> = self.response_headers.values().map(String::as_str).collect();
        match &self.body {
            Some(ResponseBody::Inline(content))
            | Some(ResponseBody::Typed(TypedBody::Text { content })) => templates.push(content),
            Some(ResponseBody::Typed(TypedBody::Json { content })) => collect_strings(content, &mut templates),
            _ => {}
        }
        templates
    }
}

fn collect_strings<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
    match value {
        serde_json::Value::String(s) => out.push(s),
        serde_json::Value::Array(arr) => arr.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(obj) => obj.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Response body: a plain string, or a typed body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Inline text body
    Inline(String),
    /// Typed body with an explicit `type` tag
    Typed(TypedBody),
}

/// Typed response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedBody {
    /// Plain text body
    Text { content: String },
    /// JSON body; string leaves are templates
    Json { content: serde_json::Value },
    /// Base64 encoded binary, served verbatim
    Base64 { content: String },
    /// Load from file, served verbatim
    File { path: PathBuf },
}

impl ResponseBody {
    /// Validate the body definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let ResponseBody::Typed(TypedBody::Base64 { content }) = self {
            decode_base64(content)?;
        }
        Ok(())
    }

    /// Content type implied by the body kind.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Inline(_) => None,
            ResponseBody::Typed(TypedBody::Text { .. }) => Some("text/plain"),
            ResponseBody::Typed(TypedBody::Json { .. }) => Some("application/json"),
            ResponseBody::Typed(TypedBody::Base64 { .. })
            | ResponseBody::Typed(TypedBody::File { .. }) => Some("application/octet-stream"),
        }
    }
}

pub(crate) fn decode_base64(content: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(content.trim())
        .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched routes
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type used when a route sets none
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// What unresolved variable tokens turn into
    #[serde(default)]
    pub on_unresolved: UnresolvedPolicy,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
            on_unresolved: UnresolvedPolicy::default(),
        }
    }
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

/// Listener, TLS and logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub listen_addr: SocketAddr,

    /// Path to the routes file
    pub mocks_file: PathBuf,

    /// TLS settings
    pub tls: TlsSettings,

    /// Enable debug logging
    pub debug: bool,

    /// Turn logging off entirely
    pub disable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 443)),
            mocks_file: PathBuf::from("mocks.yaml"),
            tls: TlsSettings::default(),
            debug: false,
            disable_logging: false,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.tls.validate()
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Serve HTTPS instead of plain HTTP
    pub enabled: bool,

    /// PEM certificate chain
    pub cert_file: Option<PathBuf>,

    /// PEM private key
    pub key_file: Option<PathBuf>,

    /// Generate a throwaway self-signed certificate at startup
    pub generate: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_file: None,
            key_file: None,
            generate: false,
        }
    }
}

impl TlsSettings {
    /// Validate the TLS settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled || self.generate {
            return Ok(());
        }
        match (&self.cert_file, &self.key_file) {
            (Some(_), Some(_)) => Ok(()),
            _ => anyhow::bail!(
                "TLS is enabled but no certificate was given: set CERT_FILE and KEY_FILE, \
                 enable GEN_CERTS, or disable TLS"
            ),
        }
    }
}
