//! Variable interpolation against the execution context.
//!
//! Strings are scanned for `${…}` references. A single reference filling
//! the whole string resolves to the referenced value's native type; a string
//! with embedded references resolves to a string with each reference
//! stringified in place. Maps and arrays are resolved recursively; other
//! values pass through untouched.
//!
//! Reference grammar: `input.<path>`, `config.<path>`,
//! `steps.<stepID>.<path>`. Path traversal descends only into maps.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use asms_core::ErrorInfo;

use crate::context::ExecutionContext;

static VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("variable pattern is valid"));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown variable source in reference: {reference}")]
    UnknownSource { reference: String },

    #[error("malformed variable reference: {reference}")]
    Malformed { reference: String },

    #[error("missing key {key:?} while resolving {reference}")]
    MissingKey { reference: String, key: String },

    #[error("cannot descend into non-map value at {key:?} while resolving {reference}")]
    NotAMap { reference: String, key: String },

    #[error("unknown step {step:?} in reference: {reference}")]
    UnknownStep { reference: String, step: String },
}

impl From<ResolveError> for ErrorInfo {
    fn from(err: ResolveError) -> Self {
        ErrorInfo::validation_failed(err.to_string())
    }
}

/// Resolves every `${…}` occurrence in `value` against `ctx`.
pub fn resolve_value(value: &Value, ctx: &ExecutionContext) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, ctx)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_value(item, ctx)?);
            }
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Convenience wrapper for step inputs and output mappings.
pub fn resolve_map(
    map: &Map<String, Value>,
    ctx: &ExecutionContext,
) -> Result<Map<String, Value>, ResolveError> {
    let mut resolved = Map::with_capacity(map.len());
    for (key, item) in map {
        resolved.insert(key.clone(), resolve_value(item, ctx)?);
    }
    Ok(resolved)
}

fn resolve_string(s: &str, ctx: &ExecutionContext) -> Result<Value, ResolveError> {
    // A single reference spanning the whole string keeps its native type.
    if let Some(captures) = VAR_PATTERN.captures(s) {
        let whole = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
        if whole == s {
            let reference = &captures[1];
            return lookup(reference, ctx);
        }
    } else {
        return Ok(Value::String(s.to_string()));
    }

    // Embedded references are stringified in place.
    let mut result = String::with_capacity(s.len());
    let mut last_end = 0;
    for captures in VAR_PATTERN.captures_iter(s) {
        let whole = captures.get(0).expect("capture 0 always present");
        result.push_str(&s[last_end..whole.start()]);
        let value = lookup(&captures[1], ctx)?;
        result.push_str(&stringify(&value));
        last_end = whole.end();
    }
    result.push_str(&s[last_end..]);
    Ok(Value::String(result))
}

fn lookup(reference: &str, ctx: &ExecutionContext) -> Result<Value, ResolveError> {
    let mut segments = reference.split('.');
    let source = segments.next().unwrap_or_default();

    let root: Value = match source {
        "input" => Value::Object(ctx.input.clone()),
        "config" => Value::Object(ctx.config.clone()),
        "steps" => {
            let step_id = segments.next().ok_or_else(|| ResolveError::Malformed {
                reference: reference.to_string(),
            })?;
            ctx.steps
                .get(step_id)
                .cloned()
                .ok_or_else(|| ResolveError::UnknownStep {
                    reference: reference.to_string(),
                    step: step_id.to_string(),
                })?
        }
        _ => {
            return Err(ResolveError::UnknownSource {
                reference: reference.to_string(),
            })
        }
    };

    let mut current = root;
    for key in segments {
        match current {
            Value::Object(ref map) => match map.get(key) {
                Some(next) => current = next.clone(),
                None => {
                    return Err(ResolveError::MissingKey {
                        reference: reference.to_string(),
                        key: key.to_string(),
                    })
                }
            },
            _ => {
                return Err(ResolveError::NotAMap {
                    reference: reference.to_string(),
                    key: key.to_string(),
                })
            }
        }
    }
    Ok(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            json!({"file": "a.wav", "count": 3, "nested": {"deep": true}})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            json!({"language": "en"}).as_object().cloned().unwrap_or_default(),
        );
        ctx.set_step_output("transcribe", json!({"text": "hi", "words": 1}));
        ctx
    }

    #[test]
    fn whole_string_reference_keeps_native_type() {
        let resolved = resolve_value(&json!("${input.count}"), &ctx()).unwrap();
        assert_eq!(resolved, json!(3));

        let resolved = resolve_value(&json!("${input.nested}"), &ctx()).unwrap();
        assert_eq!(resolved, json!({"deep": true}));
    }

    #[test]
    fn embedded_references_stringify_in_place() {
        let resolved =
            resolve_value(&json!("file=${input.file} words=${steps.transcribe.words}"), &ctx())
                .unwrap();
        assert_eq!(resolved, json!("file=a.wav words=1"));
    }

    #[test]
    fn bare_source_returns_sub_value() {
        let resolved = resolve_value(&json!("${steps.transcribe}"), &ctx()).unwrap();
        assert_eq!(resolved, json!({"text": "hi", "words": 1}));

        let resolved = resolve_value(&json!("${config}"), &ctx()).unwrap();
        assert_eq!(resolved, json!({"language": "en"}));
    }

    #[test]
    fn maps_and_arrays_resolve_recursively() {
        let resolved = resolve_value(
            &json!({"msg": "${steps.transcribe.text}", "all": ["${input.file}", 7]}),
            &ctx(),
        )
        .unwrap();
        assert_eq!(resolved, json!({"msg": "hi", "all": ["a.wav", 7]}));
    }

    #[test]
    fn non_string_scalars_pass_through() {
        assert_eq!(resolve_value(&json!(42), &ctx()).unwrap(), json!(42));
        assert_eq!(resolve_value(&json!(true), &ctx()).unwrap(), json!(true));
        assert_eq!(resolve_value(&Value::Null, &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn resolution_is_idempotent_without_references() {
        let value = json!("plain text with $dollar but no braces");
        assert_eq!(resolve_value(&value, &ctx()).unwrap(), value);
    }

    #[test]
    fn unknown_source_is_an_error() {
        let err = resolve_value(&json!("${env.HOME}"), &ctx()).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownSource { .. }));
    }

    #[test]
    fn missing_key_is_an_error() {
        let err = resolve_value(&json!("${input.absent}"), &ctx()).unwrap_err();
        assert!(matches!(err, ResolveError::MissingKey { .. }));
    }

    #[test]
    fn descending_into_scalar_is_an_error() {
        let err = resolve_value(&json!("${input.count.deeper}"), &ctx()).unwrap_err();
        assert!(matches!(err, ResolveError::NotAMap { .. }));
    }

    #[test]
    fn unknown_step_is_an_error() {
        let err = resolve_value(&json!("${steps.absent.text}"), &ctx()).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownStep { .. }));
    }

    #[test]
    fn bare_steps_reference_is_malformed() {
        let err = resolve_value(&json!("${steps}"), &ctx()).unwrap_err();
        assert!(matches!(err, ResolveError::Malformed { .. }));
    }
}
