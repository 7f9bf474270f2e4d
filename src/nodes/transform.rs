/// Data-shaping nodes: `set`, `extract`, `noop`

use crate::nodes::{require_str, NodeContext, NodeError, NodeHandler, SettingsError};
use crate::workflow::path::{DocPath, PathError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Writes values at document paths and removes paths
///
/// Settings:
/// - `values`: `{ "customer.id": 42, "total": { "$ref": "trigger.body.amount" } }`
/// - `remove`: `["internal.debug"]`
/// - `keep_input` (default true): start from the previous output instead of `{}`
///
/// `$ref` resolves against `{ trigger, variables, nodes, input }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetNode;

impl SetNode {
    fn resolve(value: &Value, root: &Value) -> Result<Value, NodeError> {
        match value {
            Value::Object(map) if map.len() == 1 && map.contains_key("$ref") => {
                let raw = map.get("$ref").and_then(Value::as_str).unwrap_or_default();
                let path: DocPath = raw
                    .parse()
                    .map_err(|e: PathError| NodeError::data(format!("bad reference '{}': {}", raw, e)))?;
                path.get(root)
                    .cloned()
                    .map_err(|e| NodeError::data(format!("reference '{}' unresolved: {}", raw, e)))
            }
            other => Ok(other.clone()),
        }
    }
}

#[async_trait]
impl NodeHandler for SetNode {
    fn node_type(&self) -> &'static str {
        "set"
    }

    fn settings_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "values": { "type": "object" },
                "remove": { "type": "array", "items": { "type": "string" } },
                "keep_input": { "type": "boolean", "default": true }
            }
        })
    }

    fn validate_settings(&self, settings: &Value) -> Result<(), SettingsError> {
        let mut errors = SettingsError::default();
        match settings.get("values") {
            None => {}
            Some(Value::Object(values)) => {
                for key in values.keys() {
                    if key.parse::<DocPath>().is_err() {
                        errors.push(format!("values.{}", key), "is not a valid path");
                    }
                }
            }
            Some(_) => errors.push("values", "must be an object"),
        }
        match settings.get("remove") {
            None => {}
            Some(Value::Array(paths)) if paths.iter().all(Value::is_string) => {}
            Some(_) => errors.push("remove", "must be an array of paths"),
        }
        errors.into_result()
    }

    async fn execute(&self, ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        let settings = ctx.settings();
        let keep_input = settings.get("keep_input").and_then(Value::as_bool).unwrap_or(true);
        let root = ctx.reference_root(&previous_output);

        let mut doc = if keep_input && !previous_output.is_null() {
            previous_output
        } else {
            Value::Object(Map::new())
        };

        if let Some(Value::Object(values)) = settings.get("values") {
            for (raw_path, raw_value) in values {
                let path: DocPath = raw_path
                    .parse()
                    .map_err(|e: PathError| NodeError::validation(format!("bad path '{}': {}", raw_path, e)))?;
                let value = Self::resolve(raw_value, &root)?;
                path.set(&mut doc, value)
                    .map_err(|e| NodeError::data(format!("cannot set '{}': {}", raw_path, e)))?;
            }
        }

        if let Some(Value::Array(paths)) = settings.get("remove") {
            for raw_path in paths.iter().filter_map(Value::as_str) {
                let path: DocPath = raw_path
                    .parse()
                    .map_err(|e: PathError| NodeError::validation(format!("bad path '{}': {}", raw_path, e)))?;
                match path.delete(&mut doc) {
                    Ok(_) | Err(PathError::NotFound(_)) => {}
                    Err(e) => return Err(NodeError::data(format!("cannot remove '{}': {}", raw_path, e))),
                }
            }
        }

        Ok(doc)
    }
}

/// Selects part of the previous output with a JSONPath expression
///
/// Settings: `path` (e.g. `$.items[*].id`), `first` (default false) to return
/// the first match instead of the list of matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractNode;

#[async_trait]
impl NodeHandler for ExtractNode {
    fn node_type(&self) -> &'static str {
        "extract"
    }

    fn settings_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string" },
                "first": { "type": "boolean", "default": false }
            }
        })
    }

    fn validate_settings(&self, settings: &Value) -> Result<(), SettingsError> {
        let mut errors = SettingsError::default();
        if let Some(path) = require_str(settings, "path", &mut errors) {
            if !path.starts_with('$') {
                errors.push("path", "must be a JSONPath starting with '$'");
            }
        }
        errors.into_result()
    }

    async fn execute(&self, ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        let settings = ctx.settings();
        let path = settings
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("extract node missing 'path'"))?;
        let first = settings.get("first").and_then(Value::as_bool).unwrap_or(false);

        let matches = jsonpath_lib::select(&previous_output, path)
            .map_err(|e| NodeError::validation(format!("invalid JSONPath '{}': {:?}", path, e)))?;

        tracing::debug!("🔎 JSONPath '{}' matched {} values", path, matches.len());

        if first {
            matches
                .first()
                .map(|v| (*v).clone())
                .ok_or_else(|| NodeError::data(format!("JSONPath '{}' matched nothing", path)))
        } else {
            Ok(Value::Array(matches.into_iter().cloned().collect()))
        }
    }
}

/// Passes its input through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNode;

#[async_trait]
impl NodeHandler for NoopNode {
    fn node_type(&self) -> &'static str {
        "noop"
    }

    async fn execute(&self, _ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        Ok(previous_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionContext;
    use crate::nodes::ErrorCategory;
    use crate::workflow::types::Node;

    fn make_node(node_type: &str, settings: Value) -> Node {
        Node { id: "n".into(), node_type: node_type.into(), settings, position: None }
    }

    fn context() -> ExecutionContext {
        let mut vars = Map::new();
        vars.insert("currency".into(), json!("EUR"));
        ExecutionContext::from_trigger("wf", "ex", json!({ "body": { "amount": 12 } }), &vars)
    }

    #[tokio::test]
    async fn set_writes_references_and_removes() {
        let node = make_node(
            "set",
            json!({
                "values": {
                    "order.total": { "$ref": "trigger.body.amount" },
                    "order.currency": { "$ref": "variables.currency" },
                    "flag": true
                },
                "remove": ["debug", "never.there"]
            }),
        );
        let exec = context();
        let ctx = NodeContext { node: &node, execution: &exec, integration: None };

        let out = SetNode.execute(&ctx, json!({ "debug": 1, "keep": "me" })).await.unwrap();
        assert_eq!(
            out,
            json!({ "keep": "me", "flag": true, "order": { "total": 12, "currency": "EUR" } })
        );
    }

    #[tokio::test]
    async fn set_reports_missing_reference_as_data_error() {
        let node = make_node("set", json!({ "values": { "x": { "$ref": "trigger.nope" } } }));
        let exec = context();
        let ctx = NodeContext { node: &node, execution: &exec, integration: None };

        let err = SetNode.execute(&ctx, Value::Null).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Data);
    }

    #[tokio::test]
    async fn extract_selects_matches() {
        let node = make_node("extract", json!({ "path": "$.items[*].id" }));
        let exec = context();
        let ctx = NodeContext { node: &node, execution: &exec, integration: None };
        let input = json!({ "items": [ { "id": 1 }, { "id": 2 } ] });

        let out = ExtractNode.execute(&ctx, input.clone()).await.unwrap();
        assert_eq!(out, json!([1, 2]));

        let first = make_node("extract", json!({ "path": "$.items[*].id", "first": true }));
        let ctx = NodeContext { node: &first, execution: &exec, integration: None };
        assert_eq!(ExtractNode.execute(&ctx, input).await.unwrap(), json!(1));
    }

    #[test]
    fn set_validation_flags_bad_shapes() {
        let err = SetNode
            .validate_settings(&json!({ "values": [1], "remove": "x" }))
            .unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["values", "remove"]);
        assert!(ExtractNode.validate_settings(&json!({ "path": "items" })).is_err());
    }
}
