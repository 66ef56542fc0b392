//! Template engine for dynamic responses.
//!
//! Scans text for `{{ variable }}` tokens and substitutes each one with the
//! value resolved against the request. Substitution happens positionally in
//! a single pass, so a resolved value is inserted literally and never
//! scanned again.

use crate::context::RequestContext;
use crate::error::{RenderError, TokenFailure};
use crate::generator::GeneratorRegistry;
use crate::resolver::{clean_token, Resolver, Variable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

/// Token grammar: `{{`, one or more of `[A-Za-z0-9_-. $]`, then `}}`.
pub const TOKEN_PATTERN: &str = r"\{\{[A-Za-z0-9_\-. $]+\}\}";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(TOKEN_PATTERN).unwrap());

/// What to put in place of a token that fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Leave the `{{token}}` text in the output as written.
    #[default]
    Keep,
    /// Replace the token with an empty string.
    Erase,
}

/// Output of a render call: the substituted value plus every failed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered<T = String> {
    pub value: T,
    pub failures: Vec<TokenFailure>,
}

impl<T> Rendered<T> {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Aggregated error, if any token failed.
    pub fn error(&self) -> Option<RenderError> {
        RenderError::from_failures(self.failures.clone())
    }

    pub fn into_parts(self) -> (T, Option<RenderError>) {
        (self.value, RenderError::from_failures(self.failures))
    }
}

/// All tokens in `template`, in order of appearance, duplicates included.
pub fn scan(template: &str) -> Vec<&str> {
    TOKEN_RE.find_iter(template).map(|m| m.as_str()).collect()
}

/// Whether any token in `template` reads the request body.
pub fn reads_body(template: &str) -> bool {
    scan(template)
        .into_iter()
        .any(|token| Variable::parse(clean_token(token)).reads_body())
}

/// Template engine for rendering dynamic responses.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    resolver: Resolver,
    policy: UnresolvedPolicy,
}

impl TemplateEngine {
    /// Create a new template engine backed by the given generators.
    pub fn new(generators: Arc<GeneratorRegistry>) -> Self {
        Self {
            resolver: Resolver::new(generators),
            policy: UnresolvedPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Render a template string with the given request context.
    pub fn render(&self, template: &str, ctx: &RequestContext) -> Rendered {
        let mut failures = Vec::new();
        let value = self.render_into(template, ctx, &mut failures);
        Rendered { value, failures }
    }

    /// Render every string inside a JSON value. Object keys are left as is.
    pub fn render_json(
        &self,
        json: &serde_json::Value,
        ctx: &RequestContext,
    ) -> Rendered<serde_json::Value> {
        let mut failures = Vec::new();
        let value = self.render_json_value(json, ctx, &mut failures);
        Rendered { value, failures }
    }

    fn render_into(
        &self,
        template: &str,
        ctx: &RequestContext,
        failures: &mut Vec<TokenFailure>,
    ) -> String {
        let mut output = String::with_capacity(template.len());
        let mut last = 0;

        for m in TOKEN_RE.find_iter(template) {
            output.push_str(&template[last..m.start()]);
            let token = m.as_str();

            match self.resolver.resolve(token, ctx) {
                Ok(value) => output.push_str(&value),
                Err(cause) => {
                    failures.push(TokenFailure {
                        token: token.to_string(),
                        cause,
                    });
                    if self.policy == UnresolvedPolicy::Keep {
                        output.push_str(token);
                    }
                }
            }
            last = m.end();
        }

        output.push_str(&template[last..]);
        output
    }

    fn render_json_value(
        &self,
        value: &serde_json::Value,
        ctx: &RequestContext,
        failures: &mut Vec<TokenFailure>,
    ) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => {
                if s.contains("{{") {
                    serde_json::Value::String(self.render_into(s, ctx, failures))
                } else {
                    value.clone()
                }
            }
            serde_json::Value::Array(arr) => serde_json::Value::Array(
                arr.iter()
                    .map(|v| self.render_json_value(v, ctx, failures))
                    .collect(),
            ),
            serde_json::Value::Object(obj) => {
                let mut rendered = serde_json::Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_json_value(v, ctx, failures));
                }
                serde_json::Value::Object(rendered)
            }
            _ => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VariableError;
    use http::Method;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_engine() -> TemplateEngine {
        let mut generators = GeneratorRegistry::builtin();
        generators.register("randomMock", || "randomValue".to_string());
        TemplateEngine::new(Arc::new(generators))
    }

    fn test_context() -> RequestContext {
        let mut env = HashMap::new();
        env.insert("testenv".to_string(), "envvalue".to_string());

        RequestContext::new(Method::GET)
            .with_header("testheader", "headervalue")
            .with_query_string("testquery=queryvalue")
            .with_param("testparam", "paramvalue")
            .with_environment(Arc::new(env))
    }

    #[test]
    fn test_replace_variables() {
        let cases = [
            ("Test Header Data: {{header.testheader}}", "Test Header Data: headervalue"),
            ("Test Header Data: {{header.badheader}}", "Test Header Data: {{header.badheader}}"),
            ("Test Query Data: {{query.testquery}}", "Test Query Data: queryvalue"),
            ("Test Query Data: {{query.badquery}}", "Test Query Data: {{query.badquery}}"),
            ("Test Param Data: {{param.testparam}}", "Test Param Data: paramvalue"),
            ("Test Param Data: {{param.badparam}}", "Test Param Data: {{param.badparam}}"),
            ("Test Env Data: {{environment.testenv}}", "Test Env Data: envvalue"),
            ("Test Env Data: {{environment.badenv}}", "Test Env Data: {{environment.badenv}}"),
            (
                "Double: {{header.testheader}} {{query.testquery}}",
                "Double: headervalue queryvalue",
            ),
            ("Random: {{$randomMock}}", "Random: randomValue"),
            ("Random: {{$badRandom}}", "Random: {{$badRandom}}"),
            ("Padded: {{ param.testparam }}", "Padded: paramvalue"),
            ("", ""),
        ];

        let engine = test_engine();
        let ctx = test_context();
        for (template, expected) in cases {
            let rendered = engine.render(template, &ctx);
            assert_eq!(rendered.value, expected, "template {:?}", template);
        }
    }

    #[test]
    fn test_malformed_delimiters_pass_through() {
        let engine = test_engine();
        let ctx = test_context();
        for template in [
            "Test Random Data: {{$badRandom",
            "Test Random Data: $}}",
            "Test Random Data: {$badRandom}",
            "Test Random Data: {{}}",
            "{{header.test header!}}",
            "plain text without tokens",
        ] {
            let rendered = engine.render(template, &ctx);
            assert_eq!(rendered.value, template);
            assert!(rendered.is_clean(), "template {:?}", template);
        }
    }

    #[test]
    fn test_hello_scenario() {
        let engine = test_engine();
        let ctx = RequestContext::new(Method::GET)
            .with_header("name", "Ada")
            .with_param("id", "42");

        let (value, error) = engine
            .render("Hello {{header.name}}, id={{param.id}}", &ctx)
            .into_parts();
        assert_eq!(value, "Hello Ada, id=42");
        assert!(error.is_none());
    }

    #[test]
    fn test_missing_query_keep_policy() {
        let engine = test_engine();
        let ctx = test_context();

        let (value, error) = engine.render("{{query.missing}}", &ctx).into_parts();
        assert_eq!(value, "{{query.missing}}");

        let error = error.unwrap();
        assert_eq!(error.failures().len(), 1);
        assert_eq!(error.failures()[0].token, "{{query.missing}}");
        assert_eq!(error.failures()[0].cause, VariableError::InvalidVariableFormat);
    }

    #[test]
    fn test_missing_query_erase_policy() {
        let engine = test_engine().with_policy(UnresolvedPolicy::Erase);
        let ctx = test_context();

        let rendered = engine.render("[{{query.missing}}] {{param.testparam}}", &ctx);
        assert_eq!(rendered.value, "[] paramvalue");
        assert!(rendered
            .error()
            .unwrap()
            .has_cause(VariableError::InvalidVariableFormat));
    }

    #[test]
    fn test_failures_are_aggregated() {
        let engine = test_engine();
        let ctx = test_context();

        let rendered = engine.render(
            "{{query.a}} {{header.testheader}} {{$nope}} {{ }} {{query.a}}",
            &ctx,
        );
        assert_eq!(
            rendered.value,
            "{{query.a}} headervalue {{$nope}} {{ }} {{query.a}}"
        );

        let causes: Vec<_> = rendered
            .failures
            .iter()
            .map(|f| (f.token.as_str(), f.cause))
            .collect();
        assert_eq!(
            causes,
            vec![
                ("{{query.a}}", VariableError::InvalidVariableFormat),
                ("{{$nope}}", VariableError::RandomVariableNotFound),
                ("{{ }}", VariableError::InvalidVariablePrefix),
                ("{{query.a}}", VariableError::InvalidVariableFormat),
            ]
        );

        let message = rendered.error().unwrap().to_string();
        assert!(message.contains("{{$nope}}: random variable not found"));
    }

    #[test]
    fn test_repeated_generator_tokens_resolve_each_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut generators = GeneratorRegistry::new();
        let c = Arc::clone(&counter);
        generators.register("seq", move || {
            (c.fetch_add(1, Ordering::SeqCst) + 1).to_string()
        });
        let engine = TemplateEngine::new(Arc::new(generators));

        let rendered = engine.render("{{$seq}}-{{$seq}}-{{$seq}}", &test_context());
        assert_eq!(rendered.value, "1-2-3");
    }

    #[test]
    fn test_resolved_values_are_not_rescanned() {
        let engine = test_engine();
        let ctx = RequestContext::new(Method::GET)
            .with_header("a", "{{header.b}}")
            .with_header("b", "secret");

        let rendered = engine.render("{{header.a}} {{header.b}}", &ctx);
        assert_eq!(rendered.value, "{{header.b}} secret");
        assert!(rendered.is_clean());
    }

    #[test]
    fn test_body_tokens() {
        let engine = test_engine();
        let ctx = RequestContext::new(Method::POST)
            .with_body(r#"{"test": {"nested": {"key": "value"}}, "name": "Ada"}"#);

        let rendered = engine.render("{{body.name}} {{body.test.nested}}", &ctx);
        assert_eq!(rendered.value, r#"Ada {"key":"value"}"#);

        let empty = RequestContext::new(Method::POST);
        let rendered = engine.render("{{body.name}}", &empty);
        assert!(rendered.error().unwrap().has_cause(VariableError::NoBody));
    }

    #[test]
    fn test_render_json() {
        let engine = test_engine();
        let ctx = RequestContext::new(Method::GET)
            .with_param("id", "123")
            .with_header("quote", r#"say "hi""#);

        let json = serde_json::json!({
            "id": "{{param.id}}",
            "name": "User {{param.id}}",
            "quote": "{{header.quote}}",
            "tags": ["{{param.id}}", 7],
            "missing": "{{param.nope}}",
            "static": "no template"
        });

        let rendered = engine.render_json(&json, &ctx);
        assert_eq!(rendered.value["id"], "123");
        assert_eq!(rendered.value["name"], "User 123");
        assert_eq!(rendered.value["tags"][0], "123");
        assert_eq!(rendered.value["tags"][1], 7);
        assert_eq!(rendered.value["missing"], "{{param.nope}}");
        assert_eq!(rendered.value["static"], "no template");
        assert_eq!(rendered.failures.len(), 1);

        let text = serde_json::to_string(&rendered.value).unwrap();
        assert!(text.contains(r#""quote":"say \"hi\"""#));
    }

    #[test]
    fn test_scan_and_reads_body() {
        assert_eq!(
            scan("a {{x}} b {{ $guid }} {{x}} {{}}"),
            vec!["{{x}}", "{{ $guid }}", "{{x}}"]
        );
        assert!(reads_body("echo: {{body}}"));
        assert!(reads_body("{{ body.user.id }}"));
        assert!(!reads_body("{{header.body}} {{$guid}}"));
    }
}
