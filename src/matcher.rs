//! Route table.
//!
//! Compiles the routes of a [`MocksConfig`] into segment patterns and maps an
//! incoming `(method, path)` pair to a route plus its captured parameters.
//!
//! Pattern syntax, one element per `/`-separated segment:
//! - `users`: literal
//! - `:id` or `{id}`: captures one segment
//! - `*rest`: captures the remainder of the path, leading `/` included;
//!   only allowed as the final segment

use crate::config::{MocksConfig, RouteDefinition};
use crate::template;
use http::Method;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Errors raised while compiling the route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route {route}: empty parameter name in {path}")]
    EmptyParam { route: String, path: String },

    #[error("route {route}: catch-all must be the last segment of {path}")]
    CatchAllNotLast { route: String, path: String },

    #[error("route {route}: invalid method {method}")]
    InvalidMethod { route: String, method: String },

    #[error("routes {first} and {second} both serve {method} {path}")]
    Conflict {
        first: String,
        second: String,
        method: String,
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(':') {
            Segment::Param(name.to_string())
        } else if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            Segment::Param(name.to_string())
        } else if let Some(name) = raw.strip_prefix('*') {
            Segment::CatchAll(name.to_string())
        } else {
            Segment::Literal(raw.to_string())
        }
    }

    /// Shape used for conflict detection: parameter names don't matter.
    fn shape(&self) -> &str {
        match self {
            Segment::Literal(lit) => lit,
            Segment::Param(_) => ":",
            Segment::CatchAll(_) => "*",
        }
    }
}

#[derive(Debug, Clone)]
struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    fn parse(route: &str, path: &str) -> Result<Self, RouteError> {
        let segments: Vec<Segment> = split_path(path).map(Segment::parse).collect();

        for (i, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Param(name) | Segment::CatchAll(name) if name.is_empty() => {
                    return Err(RouteError::EmptyParam {
                        route: route.to_string(),
                        path: path.to_string(),
                    });
                }
                Segment::CatchAll(_) if i + 1 != segments.len() => {
                    return Err(RouteError::CatchAllNotLast {
                        route: route.to_string(),
                        path: path.to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(Self { segments })
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn has_catch_all(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::CatchAll(_)))
    }

    fn shape(&self) -> String {
        self.segments
            .iter()
            .map(Segment::shape)
            .collect::<Vec<_>>()
            .join("/")
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = HashMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), decode(value));
                }
                Segment::CatchAll(name) => {
                    if i >= parts.len() {
                        return None;
                    }
                    let rest = parts[i..].join("/");
                    params.insert(name.clone(), format!("/{}", decode(&rest)));
                    return Some(params);
                }
            }
        }

        if parts.len() == self.segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// A route ready for lookup.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub name: String,
    pub definition: RouteDefinition,
    methods: Vec<Method>,
    pattern: PathPattern,
    needs_body: bool,
}

impl CompiledRoute {
    fn compile(name: &str, definition: &RouteDefinition) -> Result<Self, RouteError> {
        let pattern = PathPattern::parse(name, &definition.path)?;

        let mut methods = Vec::with_capacity(definition.methods.len());
        for method in &definition.methods {
            let parsed = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
                RouteError::InvalidMethod {
                    route: name.to_string(),
                    method: method.clone(),
                }
            })?;
            if !methods.contains(&parsed) {
                methods.push(parsed);
            }
        }

        let needs_body = definition.template
            && definition
                .templates()
                .into_iter()
                .any(template::reads_body);

        Ok(Self {
            name: name.to_string(),
            definition: definition.clone(),
            methods,
            pattern,
            needs_body,
        })
    }

    /// Whether rendering this route's templates reads the request body.
    pub fn needs_body(&self) -> bool {
        self.needs_body
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn serves(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// Result of a route lookup.
#[derive(Debug)]
pub enum RouteLookup<'a> {
    Found(RouteMatch<'a>),
    /// The path exists, but not for this method.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// A matched route and the parameters captured from the path.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a CompiledRoute,
    pub params: HashMap<String, String>,
}

/// Request matcher engine.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// Sorted by precedence
    routes: Vec<CompiledRoute>,
}

impl Matcher {
    /// Compile every route of the configuration.
    pub fn new(config: &MocksConfig) -> Result<Self, RouteError> {
        let mut routes = config
            .routes
            .iter()
            .map(|(name, def)| CompiledRoute::compile(name, def))
            .collect::<Result<Vec<_>, _>>()?;

        // Literal-only patterns first, then more literal segments, catch-alls
        // last, and the route name as a stable tie breaker.
        routes.sort_by(|a, b| {
            let a_static = a.pattern.literal_count() == a.pattern.segments.len();
            let b_static = b.pattern.literal_count() == b.pattern.segments.len();
            b_static
                .cmp(&a_static)
                .then(a.pattern.has_catch_all().cmp(&b.pattern.has_catch_all()))
                .then(b.pattern.literal_count().cmp(&a.pattern.literal_count()))
                .then(a.name.cmp(&b.name))
        });

        check_conflicts(&routes)?;
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    /// Find the route serving `method` on `path`.
    pub fn find(&self, method: &Method, path: &str) -> RouteLookup<'_> {
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };
            if route.serves(method) {
                return RouteLookup::Found(RouteMatch { route, params });
            }
            for m in &route.methods {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if allowed.is_empty() {
            RouteLookup::NotFound
        } else {
            RouteLookup::MethodNotAllowed(allowed)
        }
    }
}

fn check_conflicts(routes: &[CompiledRoute]) -> Result<(), RouteError> {
    let mut seen: HashMap<(String, Method), &str> = HashMap::new();
    for route in routes {
        let shape = route.pattern.shape();
        for method in &route.methods {
            if let Some(first) = seen.insert((shape.clone(), method.clone()), &route.name) {
                return Err(RouteError::Conflict {
                    first: first.to_string(),
                    second: route.name.clone(),
                    method: method.to_string(),
                    path: route.definition.path.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(routes: &[(&str, &str, &[&str])]) -> MocksConfig {
        let mut yaml = String::from("routes:\n");
        for (name, path, methods) in routes {
            yaml.push_str(&format!("  {}:\n    path: \"{}\"\n", name, path));
            if !methods.is_empty() {
                yaml.push_str(&format!("    methods: [{}]\n", methods.join(", ")));
            }
        }
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn found<'a>(lookup: RouteLookup<'a>) -> RouteMatch<'a> {
        match lookup {
            RouteLookup::Found(m) => m,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_path_matching() {
        let matcher = Matcher::new(&config(&[("users", "/api/users", &[])])).unwrap();

        let m = found(matcher.find(&Method::GET, "/api/users"));
        assert_eq!(m.route.name, "users");
        assert!(m.params.is_empty());

        assert!(matches!(matcher.find(&Method::GET, "/api/posts"), RouteLookup::NotFound));
        assert!(matches!(matcher.find(&Method::GET, "/api/users/"), RouteLookup::NotFound));
        assert!(matches!(matcher.find(&Method::GET, "/api"), RouteLookup::NotFound));
    }

    #[test]
    fn test_param_matching() {
        let matcher = Matcher::new(&config(&[
            ("colon", "/users/:id", &[]),
            ("braces", "/orders/{order}/items/{item}", &[]),
        ]))
        .unwrap();

        let m = found(matcher.find(&Method::GET, "/users/123"));
        assert_eq!(m.route.name, "colon");
        assert_eq!(m.params.get("id"), Some(&"123".to_string()));

        let m = found(matcher.find(&Method::GET, "/orders/7/items/John%20Doe"));
        assert_eq!(m.params.get("order"), Some(&"7".to_string()));
        assert_eq!(m.params.get("item"), Some(&"John Doe".to_string()));

        assert!(matches!(matcher.find(&Method::GET, "/users/"), RouteLookup::NotFound));
        assert!(matches!(matcher.find(&Method::GET, "/users/1/2"), RouteLookup::NotFound));
    }

    #[test]
    fn test_catch_all_matching() {
        let matcher = Matcher::new(&config(&[("files", "/static/*file", &[])])).unwrap();

        let m = found(matcher.find(&Method::GET, "/static/css/site.css"));
        assert_eq!(m.params.get("file"), Some(&"/css/site.css".to_string()));

        let m = found(matcher.find(&Method::GET, "/static/"));
        assert_eq!(m.params.get("file"), Some(&"/".to_string()));

        assert!(matches!(matcher.find(&Method::GET, "/static"), RouteLookup::NotFound));
    }

    #[test]
    fn test_method_matching() {
        let matcher = Matcher::new(&config(&[("users", "/api/users", &["get", "POST"])])).unwrap();

        assert!(matches!(matcher.find(&Method::GET, "/api/users"), RouteLookup::Found(_)));
        assert!(matches!(matcher.find(&Method::POST, "/api/users"), RouteLookup::Found(_)));

        match matcher.find(&Method::DELETE, "/api/users") {
            RouteLookup::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            other => panic!("expected method not allowed, got {:?}", other),
        }
    }

    #[test]
    fn test_default_methods() {
        let matcher = Matcher::new(&config(&[("hi", "/hi", &[])])).unwrap();
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            assert!(matches!(matcher.find(&method, "/hi"), RouteLookup::Found(_)));
        }
        assert!(matches!(
            matcher.find(&Method::PATCH, "/hi"),
            RouteLookup::MethodNotAllowed(_)
        ));
    }

    #[test]
    fn test_precedence() {
        let matcher = Matcher::new(&config(&[
            ("a-catch-all", "/api/*rest", &[]),
            ("b-param", "/api/users/:id", &[]),
            ("c-static", "/api/users/me", &[]),
        ]))
        .unwrap();

        assert_eq!(found(matcher.find(&Method::GET, "/api/users/me")).route.name, "c-static");
        assert_eq!(found(matcher.find(&Method::GET, "/api/users/42")).route.name, "b-param");
        assert_eq!(found(matcher.find(&Method::GET, "/api/other")).route.name, "a-catch-all");
    }

    #[test]
    fn test_method_split_across_routes() {
        let matcher = Matcher::new(&config(&[
            ("read", "/items/:id", &["GET"]),
            ("write", "/items/{key}", &["PUT"]),
        ]))
        .unwrap();

        assert_eq!(found(matcher.find(&Method::GET, "/items/1")).route.name, "read");
        let m = found(matcher.find(&Method::PUT, "/items/1"));
        assert_eq!(m.route.name, "write");
        assert_eq!(m.params.get("key"), Some(&"1".to_string()));
    }

    #[test]
    fn test_invalid_patterns() {
        let err = Matcher::new(&config(&[("bad", "/users/:", &[])])).unwrap_err();
        assert!(matches!(err, RouteError::EmptyParam { .. }));

        let err = Matcher::new(&config(&[("bad", "/files/*rest/more", &[])])).unwrap_err();
        assert!(matches!(err, RouteError::CatchAllNotLast { .. }));

        let err = Matcher::new(&config(&[
            ("one", "/users/:id", &[]),
            ("two", "/users/{name}", &["GET"]),
        ]))
        .unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
    }

    #[test]
    fn test_needs_body() {
        let yaml = r#"
routes:
  echo:
    path: /echo
    body: "got {{body}}"
  field:
    path: /field
    body:
      type: json
      content:
        name: "{{ body.user.name }}"
  header:
    path: /header
    response_headers:
      x-echo: "{{body.id}}"
  plain:
    path: /plain
    body: "{{header.body}} {{$guid}}"
  static:
    path: /static
    template: false
    body: "{{body}}"
"#;
        let config: MocksConfig = serde_yaml::from_str(yaml).unwrap();
        let matcher = Matcher::new(&config).unwrap();
        let needs: HashMap<&str, bool> = matcher
            .routes()
            .iter()
            .map(|r| (r.name.as_str(), r.needs_body()))
            .collect();

        assert!(needs["echo"]);
        assert!(needs["field"]);
        assert!(needs["header"]);
        assert!(!needs["plain"]);
        assert!(!needs["static"]);
    }
}
