//! HTTP mock server.
//!
//! Accepts connections, dispatches each request through the route table and
//! answers with the matched route's rendered response.

use crate::config::{decode_base64, MocksConfig, ResponseBody, ServerConfig, TypedBody};
use crate::context::{Environment, ProcessEnvironment, RequestContext};
use crate::error::{RenderError, TokenFailure};
use crate::generator::GeneratorRegistry;
use crate::matcher::{CompiledRoute, Matcher, RouteError, RouteLookup};
use crate::template::TemplateEngine;
use crate::tls;
use anyhow::Context;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Path of the built-in health endpoint.
pub const HEALTH_PATH: &str = "/health";

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Mock server
///
/// Replays the configured responses, resolving variable tokens against
/// each request.
pub struct MockServer {
    config: MocksConfig,
    matcher: Matcher,
    engine: TemplateEngine,
    env: Arc<dyn Environment>,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Total requests matched to routes.
    requests_matched: AtomicU64,
    /// Total requests unmatched.
    requests_unmatched: AtomicU64,
    /// Total variable tokens that failed to resolve.
    render_failures: AtomicU64,
}

impl MockServer {
    /// Create a mock server with the built-in generator catalog.
    pub fn new(config: MocksConfig) -> Result<Self, RouteError> {
        Self::with_generators(config, GeneratorRegistry::builtin())
    }

    /// Create a mock server with a custom generator registry.
    pub fn with_generators(
        config: MocksConfig,
        generators: GeneratorRegistry,
    ) -> Result<Self, RouteError> {
        let matcher = Matcher::new(&config)?;
        let engine = TemplateEngine::new(Arc::new(generators))
            .with_policy(config.settings.on_unresolved);

        for route in matcher.routes() {
            info!(
                route = %route.name,
                path = %route.definition.path,
                methods = ?route.methods(),
                "Registering mock route"
            );
        }

        info!(
            routes = config.routes.len(),
            generators = engine.resolver().generators().len(),
            on_unresolved = ?config.settings.on_unresolved,
            "Mock server initialized"
        );

        Ok(Self {
            config,
            matcher,
            engine,
            env: Arc::new(ProcessEnvironment),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            render_failures: AtomicU64::new(0),
        })
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config = MocksConfig::from_yaml(yaml)?;
        Ok(Self::new(config)?)
    }

    /// Replace the environment used by `{{environment.*}}` tokens.
    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn config(&self) -> &MocksConfig {
        &self.config
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Get total unresolved variable tokens.
    pub fn total_render_failures(&self) -> u64 {
        self.render_failures.load(Ordering::Relaxed)
    }

    /// Answer one request.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        debug!(
            method = %method,
            uri = %parts.uri,
            version = ?parts.version,
            headers = ?parts.headers,
            "HTTP request"
        );

        if method == Method::GET && path == HEALTH_PATH {
            return self.health_response();
        }

        let route_match = match self.matcher.find(&method, &path) {
            RouteLookup::Found(m) => m,
            RouteLookup::MethodNotAllowed(allowed) => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.config.settings.log_unmatched {
                    warn!(method = %method, path = %path, "Method not allowed for mocked path");
                }
                return method_not_allowed(&allowed);
            }
            RouteLookup::NotFound => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.config.settings.log_unmatched {
                    warn!(method = %method, path = %path, "No matching route found");
                }
                return not_found();
            }
        };

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        let route = route_match.route;

        if self.config.settings.log_matches {
            info!(
                route = %route.name,
                method = %method,
                path = %path,
                return_code = route.definition.return_code,
                "Mocked end-point found"
            );
        }

        // The body stream can only be consumed once; buffer it here if any
        // template of this route reads it.
        let payload = if route.needs_body() {
            match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(route = %route.name, error = %e, "Failed to read request body");
                    return plain_response(StatusCode::BAD_REQUEST, "Bad Request");
                }
            }
        } else {
            Bytes::new()
        };

        if !payload.is_empty() {
            debug!(
                path = %path,
                payload = %String::from_utf8_lossy(&payload),
                "Request payload"
            );
        }

        let ctx = RequestContext::new(method)
            .with_query_string(parts.uri.query().unwrap_or(""))
            .with_headers(parts.headers)
            .with_params(route_match.params)
            .with_body(payload)
            .with_environment(Arc::clone(&self.env));

        self.build_response(route, &ctx).await
    }

    /// Build a response from a route definition.
    async fn build_response(
        &self,
        route: &CompiledRoute,
        ctx: &RequestContext,
    ) -> Response<Full<Bytes>> {
        let definition = &route.definition;
        let mut failures = Vec::new();

        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() =
            StatusCode::from_u16(definition.return_code).unwrap_or(StatusCode::OK);

        // Add response headers
        for (name, template) in &definition.response_headers {
            let value = self.render_text(template, definition.template, ctx, &mut failures);
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().append(name, value);
                }
                _ => warn!(
                    route = %route.name,
                    header = %name,
                    "Skipping invalid response header"
                ),
            }
        }

        // Get body content
        let body = match &definition.body {
            Some(body_def) => {
                match self
                    .render_body(body_def, definition.template, ctx, &mut failures)
                    .await
                {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(route = %route.name, error = %e, "Failed to build response body");
                        Bytes::new()
                    }
                }
            }
            None => Bytes::new(),
        };

        // Determine content type
        if !response.headers().contains_key(CONTENT_TYPE) {
            let content_type = definition
                .body
                .as_ref()
                .and_then(ResponseBody::content_type)
                .unwrap_or(self.config.settings.default_content_type.as_str());
            if let Ok(value) = HeaderValue::from_str(content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
        }

        *response.body_mut() = Full::new(body);

        if let Some(err) = RenderError::from_failures(failures) {
            self.render_failures
                .fetch_add(err.failures().len() as u64, Ordering::Relaxed);
            warn!(route = %route.name, errors = %err, "Unresolved template variables");
        }

        response
    }

    fn render_text(
        &self,
        template: &str,
        enabled: bool,
        ctx: &RequestContext,
        failures: &mut Vec<TokenFailure>,
    ) -> String {
        if !enabled {
            return template.to_string();
        }
        let rendered = self.engine.render(template, ctx);
        failures.extend(rendered.failures);
        rendered.value
    }

    /// Render a body definition to bytes.
    async fn render_body(
        &self,
        body: &ResponseBody,
        enabled: bool,
        ctx: &RequestContext,
        failures: &mut Vec<TokenFailure>,
    ) -> anyhow::Result<Bytes> {
        let bytes = match body {
            ResponseBody::Inline(content) | ResponseBody::Typed(TypedBody::Text { content }) => {
                Bytes::from(self.render_text(content, enabled, ctx, failures))
            }
            ResponseBody::Typed(TypedBody::Json { content }) => {
                let value = if enabled {
                    let rendered = self.engine.render_json(content, ctx);
                    failures.extend(rendered.failures);
                    rendered.value
                } else {
                    content.clone()
                };
                Bytes::from(serde_json::to_vec(&value)?)
            }
            ResponseBody::Typed(TypedBody::Base64 { content }) => {
                Bytes::from(decode_base64(content)?)
            }
            ResponseBody::Typed(TypedBody::File { path }) => Bytes::from(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read file {}", path.display()))?,
            ),
        };
        Ok(bytes)
    }

    fn health_response(&self) -> Response<Full<Bytes>> {
        let body = serde_json::json!({
            "status": "ok",
            "routes": self.config.routes.len(),
            "requests_total": self.total_requests(),
            "requests_matched": self.total_matched(),
            "requests_unmatched": self.total_unmatched(),
            "render_failures": self.total_render_failures(),
        });
        json_response(StatusCode::OK, &body)
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self: Arc<Self>, config: &ServerConfig) -> anyhow::Result<()> {
        let acceptor = if config.tls.enabled {
            Some(tls::acceptor(&config.tls)?)
        } else {
            None
        };

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("could not bind {}", config.listen_addr))?;

        info!(
            addr = %config.listen_addr,
            tls = acceptor.is_some(),
            "Starting listener"
        );

        self.serve_listener(listener, acceptor, shutdown_signal())
            .await
    }

    /// Accept connections on `listener` until `shutdown` completes.
    pub async fn serve_listener<F>(
        self: Arc<Self>,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping listener");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);

                    let server = Arc::clone(&self);
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        match acceptor {
                            Some(acceptor) => {
                                match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                                    Ok(Ok(tls_stream)) => server.serve_connection(tls_stream, remote_addr).await,
                                    Ok(Err(e)) => debug!(remote = %remote_addr, error = %e, "TLS handshake failed"),
                                    Err(_) => debug!(remote = %remote_addr, "TLS handshake timeout"),
                                }
                            }
                            None => server.serve_connection(stream, remote_addr).await,
                        }
                    });
                }
            }
        }
    }

    async fn serve_connection<I>(self: Arc<Self>, io: I, remote_addr: SocketAddr)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&self);
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        if let Err(err) = builder.serve_connection(TokioIo::new(io), service).await {
            debug!(remote = %remote_addr, error = %err, "Connection error");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({"error": "not_found", "message": "No matching route found"}),
    )
}

fn method_not_allowed(allowed: &[Method]) -> Response<Full<Bytes>> {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({"error": "method_not_allowed", "message": "Method not allowed"}),
    );
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}
