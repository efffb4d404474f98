//! REST facade routing: path templates, parameter extraction, and the
//! input-mapper registry.
//!
//! A routing table maps `(method, path template)` pairs onto
//! `(unit, request type, input mapper)`. Templates use `{name}`
//! placeholders; matching requires equal segment counts, literal equality
//! outside placeholders, and binds placeholders left to right.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use asms_core::RequestType;

/// Builds a unit input from the matched path parameters, the parsed JSON
/// body, and the query string.
pub trait InputMapper: Send + Sync {
    fn map(
        &self,
        path_params: &HashMap<String, String>,
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Map<String, Value>;
}

/// Default mapper: body fields, then query parameters, then path
/// parameters, later sources overriding earlier ones.
pub struct MergeMapper;

impl InputMapper for MergeMapper {
    fn map(
        &self,
        path_params: &HashMap<String, String>,
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Map<String, Value> {
        let mut input = Map::new();
        if let Some(Value::Object(fields)) = body {
            input.extend(fields.clone());
        }
        for (key, value) in query {
            input.insert(key.clone(), Value::String(value.clone()));
        }
        for (key, value) in path_params {
            input.insert(key.clone(), Value::String(value.clone()));
        }
        input
    }
}

#[derive(Clone)]
pub struct RestRoute {
    pub method: String,
    pub template: String,
    pub unit: String,
    pub request_type: RequestType,
    pub mapper: String,
}

/// Route table plus the named mapper registry.
pub struct RestRouter {
    routes: Vec<RestRoute>,
    mappers: HashMap<String, Arc<dyn InputMapper>>,
}

pub const DEFAULT_MAPPER: &str = "merge";

impl RestRouter {
    pub fn new() -> Self {
        let mut mappers: HashMap<String, Arc<dyn InputMapper>> = HashMap::new();
        mappers.insert(DEFAULT_MAPPER.to_string(), Arc::new(MergeMapper));
        Self {
            routes: Vec::new(),
            mappers,
        }
    }

    pub fn register_mapper(&mut self, name: impl Into<String>, mapper: Arc<dyn InputMapper>) {
        self.mappers.insert(name.into(), mapper);
    }

    pub fn route(
        mut self,
        method: &str,
        template: &str,
        unit: &str,
        request_type: RequestType,
    ) -> Self {
        self.routes.push(RestRoute {
            method: method.to_uppercase(),
            template: template.to_string(),
            unit: unit.to_string(),
            request_type,
            mapper: DEFAULT_MAPPER.to_string(),
        });
        self
    }

    pub fn route_with_mapper(
        mut self,
        method: &str,
        template: &str,
        unit: &str,
        request_type: RequestType,
        mapper: &str,
    ) -> Self {
        self.routes.push(RestRoute {
            method: method.to_uppercase(),
            template: template.to_string(),
            unit: unit.to_string(),
            request_type,
            mapper: mapper.to_string(),
        });
        self
    }

    /// Resolves a request. `HEAD` falls back to `GET`.
    pub fn resolve(&self, method: &str, path: &str) -> RouteMatch<'_> {
        let method = method.to_uppercase();
        let effective = if method == "HEAD" { "GET" } else { method.as_str() };

        let mut allowed: Vec<String> = Vec::new();
        for route in &self.routes {
            if let Some(params) = match_template(&route.template, path) {
                if route.method == effective {
                    let mapper = self
                        .mappers
                        .get(&route.mapper)
                        .or_else(|| self.mappers.get(DEFAULT_MAPPER))
                        .cloned();
                    return match mapper {
                        Some(mapper) => RouteMatch::Matched {
                            route,
                            params,
                            mapper,
                        },
                        None => RouteMatch::NotFound,
                    };
                }
                if !allowed.contains(&route.method) {
                    allowed.push(route.method.clone());
                }
            }
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allowed }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RestRouter {
    fn default() -> Self {
        Self::new()
    }
}

pub enum RouteMatch<'a> {
    Matched {
        route: &'a RestRoute,
        params: HashMap<String, String>,
        mapper: Arc<dyn InputMapper>,
    },
    MethodNotAllowed {
        allowed: Vec<String>,
    },
    NotFound,
}

/// Splits pattern and path by `/`, requires equal segment counts, binds
/// `{name}` placeholders, and requires literal equality elsewhere.
pub fn match_template(template: &str, path: &str) -> Option<HashMap<String, String>> {
    let template_parts: Vec<&str> = template.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();
    if template_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pattern, actual) in template_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = pattern.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            if actual.is_empty() {
                return None;
            }
            params.insert(name.to_string(), (*actual).to_string());
        } else if pattern != actual {
            return None;
        }
    }
    Some(params)
}
