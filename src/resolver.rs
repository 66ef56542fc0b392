//! Variable classification and resolution.
//!
//! A token's inner name is classified into exactly one [`Variable`] by
//! testing [`PREFIXES`] in order. The order matters: `$` is tested first so a
//! generator name can never be mistaken for another domain, and `body.` is
//! tested before the exact `body` name.

use crate::context::RequestContext;
use crate::error::VariableError;
use crate::generator::GeneratorRegistry;
use std::sync::Arc;
use tracing::trace;

/// Source a prefix maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Generator,
    Header,
    Query,
    Param,
    Environment,
    JsonBody,
}

/// Prefix dispatch table, tested top to bottom.
pub const PREFIXES: &[(&str, Domain)] = &[
    ("$", Domain::Generator),
    ("header.", Domain::Header),
    ("query.", Domain::Query),
    ("param.", Domain::Param),
    ("environment.", Domain::Environment),
    ("body.", Domain::JsonBody),
];

/// Name of the token that yields the raw request body.
pub const RAW_BODY: &str = "body";

/// A classified variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable<'a> {
    Generator(&'a str),
    Header(&'a str),
    Query(&'a str),
    Param(&'a str),
    Environment(&'a str),
    JsonBody(&'a str),
    RawBody,
    Unresolvable,
}

impl<'a> Variable<'a> {
    /// Classify an already cleaned variable name (no braces, no padding).
    pub fn parse(name: &'a str) -> Self {
        if name.is_empty() {
            return Variable::Unresolvable;
        }

        for (prefix, domain) in PREFIXES {
            if let Some(key) = name.strip_prefix(prefix) {
                return match domain {
                    Domain::Generator => Variable::Generator(key),
                    Domain::Header => Variable::Header(key),
                    Domain::Query => Variable::Query(key),
                    Domain::Param => Variable::Param(key),
                    Domain::Environment => Variable::Environment(key),
                    Domain::JsonBody => Variable::JsonBody(key),
                };
            }
        }

        if name == RAW_BODY {
            Variable::RawBody
        } else {
            Variable::Unresolvable
        }
    }

    /// Whether resolving this variable reads the request body.
    pub fn reads_body(&self) -> bool {
        matches!(self, Variable::JsonBody(_) | Variable::RawBody)
    }
}

/// Strip the `{{ }}` delimiters and surrounding spaces from a token.
pub fn clean_token(token: &str) -> &str {
    token.trim_matches(|c| c == '{' || c == '}' || c == ' ')
}

/// Resolves variable tokens against a request.
#[derive(Debug, Clone)]
pub struct Resolver {
    generators: Arc<GeneratorRegistry>,
}

impl Resolver {
    pub fn new(generators: Arc<GeneratorRegistry>) -> Self {
        Self { generators }
    }

    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    /// Resolve a token, with or without its braces.
    pub fn resolve(&self, token: &str, ctx: &RequestContext) -> Result<String, VariableError> {
        let name = clean_token(token);
        let variable = Variable::parse(name);
        trace!(token = %token, variable = ?variable, "Resolving variable");
        self.resolve_variable(variable, ctx)
    }

    /// Resolve an already classified variable.
    pub fn resolve_variable(
        &self,
        variable: Variable<'_>,
        ctx: &RequestContext,
    ) -> Result<String, VariableError> {
        match variable {
            Variable::Generator(name) => self
                .generators
                .lookup(name)
                .ok_or(VariableError::RandomVariableNotFound),
            Variable::Header(name) => ctx.header(name).ok_or(VariableError::InvalidVariableFormat),
            Variable::Query(name) => ctx.query(name).ok_or(VariableError::InvalidVariableFormat),
            Variable::Param(name) => ctx.param(name).ok_or(VariableError::InvalidVariableFormat),
            Variable::Environment(name) => ctx
                .env_var(name)
                .ok_or(VariableError::EnvironmentVariableNotFound),
            Variable::JsonBody(path) => ctx.json_path(path),
            Variable::RawBody => ctx.raw_body(),
            Variable::Unresolvable => Err(VariableError::InvalidVariablePrefix),
        }
    }
}
