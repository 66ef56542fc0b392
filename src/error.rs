//! Error types for variable resolution and template rendering.

use std::fmt;

/// Why a single variable token could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    /// The token does not start with a known prefix (or is empty).
    #[error("invalid variable prefix")]
    InvalidVariablePrefix,

    /// Known prefix, but the header, query or path parameter is absent or empty.
    #[error("invalid variable format")]
    InvalidVariableFormat,

    /// No generator is registered under the requested name.
    #[error("random variable not found")]
    RandomVariableNotFound,

    /// The environment variable is unset or empty.
    #[error("environment variable not found")]
    EnvironmentVariableNotFound,

    /// A body token was used but the request carried no body.
    #[error("no body found")]
    NoBody,

    /// The body is not valid JSON, or the path walks into a non-object.
    #[error("unable to parse json body")]
    InvalidJsonBody,

    /// The body is valid JSON but a path segment does not exist.
    #[error("unable to find json variable")]
    VariableNotFound,
}

/// A token that failed to resolve, together with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFailure {
    /// The token exactly as it appeared in the template, braces included.
    pub token: String,
    pub cause: VariableError,
}

impl fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.token, self.cause)
    }
}

/// Aggregate of every token failure from one or more render calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    failures: Vec<TokenFailure>,
}

impl RenderError {
    /// Build an aggregate; returns `None` when there is nothing to report.
    pub fn from_failures(failures: Vec<TokenFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn failures(&self) -> &[TokenFailure] {
        &self.failures
    }

    /// Whether any failure has the given cause.
    pub fn has_cause(&self, cause: VariableError) -> bool {
        self.failures.iter().any(|f| f.cause == cause)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {}
