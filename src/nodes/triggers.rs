/// Trigger (start-typed) nodes
///
/// Triggers do no work of their own: the gateway or the manual API has already
/// built the payload, so they emit it unchanged as their output. Their settings
/// carry what the gateway needs to bind them (webhook key, signing secret).

use crate::nodes::{require_str, NodeContext, NodeError, NodeHandler, SettingsError};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Entry point for runs started from the API or by the engine itself
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTrigger;

#[async_trait]
impl NodeHandler for ManualTrigger {
    fn node_type(&self) -> &'static str {
        "manual_trigger"
    }

    fn is_trigger(&self) -> bool {
        true
    }

    async fn execute(&self, _ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        Ok(previous_output)
    }
}

/// Generic webhook: JSON, form, XML or raw bodies at `/{base}/{webhook_key}`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookTrigger;

#[async_trait]
impl NodeHandler for WebhookTrigger {
    fn node_type(&self) -> &'static str {
        "webhook_trigger"
    }

    fn is_trigger(&self) -> bool {
        true
    }

    fn settings_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["webhook_key"],
            "properties": {
                "webhook_key": { "type": "string" }
            }
        })
    }

    fn validate_settings(&self, settings: &Value) -> Result<(), SettingsError> {
        let mut errors = SettingsError::default();
        require_str(settings, "webhook_key", &mut errors);
        errors.into_result()
    }

    async fn execute(&self, _ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        Ok(previous_output)
    }
}

/// HMAC-signed webhook at `/{signed_base}/{webhook_key}`
///
/// The secret comes from `secret` or from the `secret` key of the integration
/// named by `integration_id`. `events_path` points at the event batch inside
/// the body (default `events`); each event becomes its own execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedWebhookTrigger;

#[async_trait]
impl NodeHandler for SignedWebhookTrigger {
    fn node_type(&self) -> &'static str {
        "signed_webhook_trigger"
    }

    fn is_trigger(&self) -> bool {
        true
    }

    fn settings_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["webhook_key"],
            "properties": {
                "webhook_key": { "type": "string" },
                "secret": { "type": "string" },
                "integration_id": { "type": "string" },
                "events_path": { "type": "string", "default": "events" }
            }
        })
    }

    fn validate_settings(&self, settings: &Value) -> Result<(), SettingsError> {
        let mut errors = SettingsError::default();
        require_str(settings, "webhook_key", &mut errors);

        let has_secret = settings.get("secret").and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        let has_integration = settings
            .get("integration_id")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has_secret && !has_integration {
            errors.push("secret", "either secret or integration_id is required");
        }
        errors.into_result()
    }

    async fn execute(&self, _ctx: &NodeContext<'_>, previous_output: Value) -> Result<Value, NodeError> {
        Ok(previous_output)
    }
}
