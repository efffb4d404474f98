//! # Unit Registry
//!
//! Names map to unit handles through four parallel tables — commands,
//! queries, streaming commands, resources — plus a factory list for dynamic
//! resource URIs. Registration happens at startup; afterwards the registry
//! is treated as read-only and lookups are safe for parallel readers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::ErrorInfo;
use crate::units::{Command, Query, Resource, ResourceFactory, StreamingCommand};

/// Registry errors. Registration fails when a name or URI collides.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unit name already registered: {name}")]
    DuplicateName { name: String },

    #[error("resource URI already registered: {uri}")]
    DuplicateUri { uri: String },
}

impl From<RegistryError> for ErrorInfo {
    fn from(err: RegistryError) -> Self {
        ErrorInfo::already_exists(err.to_string())
    }
}

/// Read side of the registry, consumed by the gateway and the adapters.
pub trait UnitRegistry: Send + Sync {
    fn get_command(&self, name: &str) -> Option<Arc<dyn Command>>;
    fn get_query(&self, name: &str) -> Option<Arc<dyn Query>>;
    fn get_streaming_command(&self, name: &str) -> Option<Arc<dyn StreamingCommand>>;
    fn get_resource(&self, uri: &str) -> Option<Arc<dyn Resource>>;
    /// Direct lookup first, then dynamic factories (`asms://model/{id}`).
    fn get_resource_with_factory(&self, uri: &str) -> Option<Arc<dyn Resource>>;
    fn list_commands(&self) -> Vec<Arc<dyn Command>>;
    fn list_queries(&self) -> Vec<Arc<dyn Query>>;
    fn list_resources(&self) -> Vec<Arc<dyn Resource>>;

    fn has_command(&self, name: &str) -> bool {
        self.get_command(name).is_some()
    }

    fn has_query(&self, name: &str) -> bool {
        self.get_query(name).is_some()
    }
}

/// Lock-guarded in-memory registry.
#[derive(Default)]
pub struct InMemoryRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
    queries: RwLock<HashMap<String, Arc<dyn Query>>>,
    streaming: RwLock<HashMap<String, Arc<dyn StreamingCommand>>>,
    resources: RwLock<HashMap<String, Arc<dyn Resource>>>,
    factories: RwLock<Vec<Arc<dyn ResourceFactory>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit names are globally unique across commands and queries.
    fn check_name_free(&self, name: &str) -> Result<(), RegistryError> {
        let commands = self.commands.read().expect("registry lock poisoned");
        let queries = self.queries.read().expect("registry lock poisoned");
        if commands.contains_key(name) || queries.contains_key(name) {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn register_command(&self, command: Arc<dyn Command>) -> Result<(), RegistryError> {
        let name = command.name().to_string();
        self.check_name_free(&name)?;
        self.commands
            .write()
            .expect("registry lock poisoned")
            .insert(name, command);
        Ok(())
    }

    /// Streaming commands land in both the command table and the streaming
    /// table, so unary dispatch and the streaming path resolve the same unit
    /// without a type test.
    pub fn register_streaming_command(
        &self,
        command: Arc<dyn StreamingCommand>,
    ) -> Result<(), RegistryError> {
        let name = command.name().to_string();
        self.check_name_free(&name)?;
        self.streaming
            .write()
            .expect("registry lock poisoned")
            .insert(name.clone(), command.clone());
        self.commands
            .write()
            .expect("registry lock poisoned")
            .insert(name, command);
        Ok(())
    }

    pub fn register_query(&self, query: Arc<dyn Query>) -> Result<(), RegistryError> {
        let name = query.name().to_string();
        self.check_name_free(&name)?;
        self.queries
            .write()
            .expect("registry lock poisoned")
            .insert(name, query);
        Ok(())
    }

    pub fn register_resource(&self, resource: Arc<dyn Resource>) -> Result<(), RegistryError> {
        let uri = resource.uri().to_string();
        let mut resources = self.resources.write().expect("registry lock poisoned");
        if resources.contains_key(&uri) {
            return Err(RegistryError::DuplicateUri { uri });
        }
        resources.insert(uri, resource);
        Ok(())
    }

    pub fn register_resource_factory(&self, factory: Arc<dyn ResourceFactory>) {
        self.factories
            .write()
            .expect("registry lock poisoned")
            .push(factory);
    }
}

impl UnitRegistry for InMemoryRegistry {
    fn get_command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    fn get_query(&self, name: &str) -> Option<Arc<dyn Query>> {
        self.queries
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    fn get_streaming_command(&self, name: &str) -> Option<Arc<dyn StreamingCommand>> {
        self.streaming
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    fn get_resource(&self, uri: &str) -> Option<Arc<dyn Resource>> {
        self.resources
            .read()
            .expect("registry lock poisoned")
            .get(uri)
            .cloned()
    }

    fn get_resource_with_factory(&self, uri: &str) -> Option<Arc<dyn Resource>> {
        if let Some(resource) = self.get_resource(uri) {
            return Some(resource);
        }
        let factories = self.factories.read().expect("registry lock poisoned");
        for factory in factories.iter() {
            if let Some(params) = match_uri_template(factory.uri_template(), uri) {
                if let Some(resource) = factory.create(uri, &params) {
                    return Some(resource);
                }
            }
        }
        None
    }

    fn list_commands(&self) -> Vec<Arc<dyn Command>> {
        let mut commands: Vec<_> = self
            .commands
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }

    fn list_queries(&self) -> Vec<Arc<dyn Query>> {
        let mut queries: Vec<_> = self
            .queries
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        queries.sort_by(|a, b| a.name().cmp(b.name()));
        queries
    }

    fn list_resources(&self) -> Vec<Arc<dyn Resource>> {
        let mut resources: Vec<_> = self
            .resources
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.uri().cmp(b.uri()));
        resources
    }
}

/// Binds `{name}` placeholders in a URI template against a concrete URI.
/// Segment counts must match; non-placeholder segments must match literally.
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let template_parts: Vec<&str> = template.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();
    if template_parts.len() != uri_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pattern, actual) in template_parts.iter().zip(uri_parts.iter()) {
        if let Some(name) = pattern
            .strip_prefix('{')
            .and_then(|p| p.strip_suffix('}'))
        {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::error::UnitError;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    struct EchoCommand {
        name: String,
    }

    #[async_trait]
    impl Command for EchoCommand {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(
            &self,
            _ctx: &RequestContext,
            input: &Map<String, Value>,
        ) -> Result<Value, UnitError> {
            Ok(Value::Object(input.clone()))
        }
    }

    struct StatusQuery;

    #[async_trait]
    impl Query for StatusQuery {
        fn name(&self) -> &str {
            "system.status"
        }

        async fn execute(
            &self,
            _ctx: &RequestContext,
            _input: &Map<String, Value>,
        ) -> Result<Value, UnitError> {
            Ok(json!({"status": "ok"}))
        }
    }

    struct ModelResource {
        uri: String,
    }

    #[async_trait]
    impl Resource for ModelResource {
        fn uri(&self) -> &str {
            &self.uri
        }

        fn name(&self) -> &str {
            "model"
        }

        async fn get(&self, _ctx: &RequestContext) -> Result<Value, UnitError> {
            Ok(json!({"uri": self.uri}))
        }
    }

    struct ModelFactory;

    impl ResourceFactory for ModelFactory {
        fn uri_template(&self) -> &str {
            "asms://model/{id}"
        }

        fn create(
            &self,
            uri: &str,
            params: &HashMap<String, String>,
        ) -> Option<Arc<dyn Resource>> {
            params.get("id")?;
            Some(Arc::new(ModelResource {
                uri: uri.to_string(),
            }))
        }
    }

    #[test]
    fn duplicate_command_name_is_rejected() {
        let registry = InMemoryRegistry::new();
        registry
            .register_command(Arc::new(EchoCommand { name: "a.echo".into() }))
            .unwrap();
        let err = registry
            .register_command(Arc::new(EchoCommand { name: "a.echo".into() }))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
    }

    #[test]
    fn names_are_unique_across_commands_and_queries() {
        let registry = InMemoryRegistry::new();
        registry.register_query(Arc::new(StatusQuery)).unwrap();
        let err = registry
            .register_command(Arc::new(EchoCommand { name: "system.status".into() }))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
    }

    #[test]
    fn factory_resolves_dynamic_uri() {
        let registry = InMemoryRegistry::new();
        registry.register_resource_factory(Arc::new(ModelFactory));

        assert!(registry.get_resource("asms://model/m1").is_none());
        let resource = registry.get_resource_with_factory("asms://model/m1").unwrap();
        assert_eq!(resource.uri(), "asms://model/m1");
        assert!(registry.get_resource_with_factory("asms://engine/e1").is_none());
    }

    #[test]
    fn uri_template_matching() {
        let params = match_uri_template("asms://model/{id}", "asms://model/m42").unwrap();
        assert_eq!(params["id"], "m42");

        assert!(match_uri_template("asms://model/{id}", "asms://model").is_none());
        assert!(match_uri_template("asms://model/{id}", "asms://engine/e1").is_none());
        assert!(match_uri_template("asms://model/{id}", "asms://model/").is_none());
    }

    #[test]
    fn listings_are_sorted_by_name() {
        let registry = InMemoryRegistry::new();
        registry
            .register_command(Arc::new(EchoCommand { name: "b.cmd".into() }))
            .unwrap();
        registry
            .register_command(Arc::new(EchoCommand { name: "a.cmd".into() }))
            .unwrap();
        let names: Vec<_> = registry.list_commands().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["a.cmd", "b.cmd"]);
    }
}
