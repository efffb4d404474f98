//! Unit ↔ tool name mapping and JSON-Schema generation.
//!
//! Every command and query becomes a tool whose name is the unit name with
//! dots replaced by underscores. The quick inverse replaces the first
//! underscore with a dot; call-time resolution additionally scans the
//! registry so unit names with underscores inside segments still resolve.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use asms_core::{FieldSchema, RequestType, UnitRegistry, UnitSchema};

use crate::protocol::ToolDefinition;

/// `model.list` → `model_list`.
pub fn tool_name(unit: &str) -> String {
    unit.replace('.', "_")
}

/// `model_list` → `model.list`: the first underscore becomes the dot.
pub fn unit_name(tool: &str) -> String {
    tool.replacen('_', ".", 1)
}

/// Resolves a tool name back to a unit and its dispatch type. Tries the
/// quick inverse first, then scans the registry for units whose generated
/// tool name matches.
pub fn resolve_unit(
    registry: &Arc<dyn UnitRegistry>,
    tool: &str,
) -> Option<(String, RequestType)> {
    let quick = unit_name(tool);
    if registry.has_command(&quick) {
        return Some((quick, RequestType::Command));
    }
    if registry.has_query(&quick) {
        return Some((quick, RequestType::Query));
    }

    for command in registry.list_commands() {
        if tool_name(command.name()) == tool {
            return Some((command.name().to_string(), RequestType::Command));
        }
    }
    for query in registry.list_queries() {
        if tool_name(query.name()) == tool {
            return Some((query.name().to_string(), RequestType::Query));
        }
    }
    None
}

/// Builds the full tool listing from the registry: commands first, then
/// queries, each with a derived JSON Schema.
pub fn list_tools(registry: &Arc<dyn UnitRegistry>) -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    for command in registry.list_commands() {
        tools.push(ToolDefinition {
            name: tool_name(command.name()),
            description: command.description().to_string(),
            input_schema: json_schema(&command.input_schema()),
        });
    }
    for query in registry.list_queries() {
        tools.push(ToolDefinition {
            name: tool_name(query.name()),
            description: query.description().to_string(),
            input_schema: json_schema(&query.input_schema()),
        });
    }
    tools
}

/// Renders a declared unit schema as a JSON Schema object.
pub fn json_schema(schema: &UnitSchema) -> Value {
    let mut properties = Map::new();
    for field in &schema.fields {
        properties.insert(field.name.clone(), field_schema(field));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": schema.required_fields(),
    })
}

fn field_schema(field: &FieldSchema) -> Value {
    let mut property = Map::new();
    property.insert("type".into(), json!(field.field_type.as_str()));
    if !field.description.is_empty() {
        property.insert("description".into(), json!(field.description));
    }
    if let Some(values) = &field.enum_values {
        property.insert("enum".into(), json!(values));
    }
    if let Some(minimum) = field.minimum {
        property.insert("minimum".into(), json!(minimum));
    }
    if let Some(maximum) = field.maximum {
        property.insert("maximum".into(), json!(maximum));
    }
    if let Some(pattern) = &field.pattern {
        property.insert("pattern".into(), json!(pattern));
    }
    if let Some(items) = &field.items {
        property.insert("items".into(), field_schema(items));
    }
    Value::Object(property)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asms_core::FieldType;

    #[test]
    fn name_mapping_is_a_bijection_on_two_segment_names() {
        for unit in ["model.list", "engine.status", "inference.submit"] {
            let tool = tool_name(unit);
            assert!(!tool.contains('.'));
            assert_eq!(unit_name(&tool), unit);
        }
        for tool in ["model_list", "engine_status"] {
            assert_eq!(tool_name(&unit_name(tool)), tool);
        }
    }

    #[test]
    fn deep_names_resolve_through_the_registry_scan() {
        use asms_core::{Command, InMemoryRegistry, RequestContext, UnitError};
        use async_trait::async_trait;
        use serde_json::json;

        struct Named(&'static str);

        #[async_trait]
        impl Command for Named {
            fn name(&self) -> &str {
                self.0
            }

            async fn execute(
                &self,
                _ctx: &RequestContext,
                _input: &Map<String, Value>,
            ) -> Result<Value, UnitError> {
                Ok(json!({}))
            }
        }

        let registry = InMemoryRegistry::new();
        registry
            .register_command(Arc::new(Named("device.gpu.reset")))
            .unwrap();
        registry
            .register_command(Arc::new(Named("model.list_all")))
            .unwrap();
        let registry: Arc<dyn UnitRegistry> = Arc::new(registry);

        // The quick inverse yields "device.gpu_reset", which is not
        // registered; the scan over generated tool names recovers it.
        let (unit, _) = resolve_unit(&registry, "device_gpu_reset").unwrap();
        assert_eq!(unit, "device.gpu.reset");
        // The quick inverse handles this one directly.
        let (unit, _) = resolve_unit(&registry, "model_list_all").unwrap();
        assert_eq!(unit, "model.list_all");
        assert!(resolve_unit(&registry, "absent_tool").is_none());
    }

    #[test]
    fn json_schema_includes_constraints() {
        let schema = UnitSchema::new()
            .field(FieldSchema::new("model", FieldType::String, "Model name").required())
            .field(
                FieldSchema::new("temperature", FieldType::Number, "Sampling temperature")
                    .with_minimum(0.0)
                    .with_maximum(2.0),
            )
            .field(
                FieldSchema::new("mode", FieldType::String, "")
                    .with_enum(vec!["fast".into(), "accurate".into()]),
            )
            .field(
                FieldSchema::new("tags", FieldType::Array, "")
                    .with_items(FieldSchema::new("tag", FieldType::String, "")),
            );

        let rendered = json_schema(&schema);
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["model"]));
        assert_eq!(rendered["properties"]["model"]["type"], "string");
        assert_eq!(rendered["properties"]["temperature"]["minimum"], 0.0);
        assert_eq!(rendered["properties"]["temperature"]["maximum"], 2.0);
        assert_eq!(rendered["properties"]["mode"]["enum"], json!(["fast", "accurate"]));
        assert_eq!(rendered["properties"]["tags"]["items"]["type"], "string");
    }

    #[test]
    fn empty_schema_renders_as_bare_object() {
        let rendered = json_schema(&UnitSchema::default());
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!([]));
    }
}
