//! MockItOut
//!
//! A declarative HTTP mock server. Each route of the routes file answers
//! with a canned response whose headers and body may embed `{{...}}`
//! variable tokens, resolved against the incoming request at reply time.
//!
//! # Variables
//!
//! - `{{header.NAME}}`: request header, case-insensitive
//! - `{{query.NAME}}`: first value of a query parameter
//! - `{{param.NAME}}`: path parameter captured by the route pattern
//! - `{{environment.NAME}}`: process environment variable
//! - `{{body}}`: the raw request body
//! - `{{body.a.b}}`: a value inside a JSON request body
//! - `{{$randomFirstName}}`, `{{$guid}}`, ...: generated fake data
//!
//! Tokens that cannot be resolved stay in the output as written, or are
//! erased with `settings.on_unresolved: erase`.
//!
//! # Example Configuration
//!
//! ```yaml
//! routes:
//!   user:
//!     path: /users/:id
//!     methods: [GET]
//!     response_headers:
//!       content-type: application/json
//!     body:
//!       type: json
//!       content:
//!         id: "{{param.id}}"
//!         name: "{{$randomFirstName}}"
//!         agent: "{{header.user-agent}}"
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod matcher;
pub mod resolver;
pub mod server;
pub mod template;
pub mod tls;

pub use config::{MocksConfig, ServerConfig};
pub use context::{Environment, RequestContext};
pub use error::{RenderError, TokenFailure, VariableError};
pub use generator::GeneratorRegistry;
pub use server::MockServer;
pub use template::{TemplateEngine, UnresolvedPolicy};
