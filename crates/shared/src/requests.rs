//! Request DTOs submitted by the embedding application.

use serde::{Deserialize, Serialize};

/// A player action request as it arrives from the outside.
///
/// All identifiers are raw strings; the engine resolves them against its
/// caches and rejects anything unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Tenant (community/server) the request belongs to.
    pub tenant_id: String,
    /// Channel the request came from; replies and notifications go here.
    pub channel_id: String,
    /// Acting character's id.
    pub character_id: String,
    /// Action keyword (e.g., "move", "use_item", "craft").
    pub action: String,
    /// Action-specific parameters; shape depends on the action keyword.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Requested duration in world-seconds. The engine may override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl ActionRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        channel_id: impl Into<String>,
        character_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            channel_id: channel_id.into(),
            character_id: character_id.into(),
            action: action.into(),
            params: serde_json::Value::Null,
            duration: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_deserializes_with_defaults() {
        let request: ActionRequest = serde_json::from_value(serde_json::json!({
            "tenant_id": "guild-1",
            "channel_id": "channel-9",
            "character_id": "f9168c5e-ceb2-4faa-b6bf-329bf39fa1e4",
            "action": "rest",
        }))
        .expect("deserialize");
        assert!(request.params.is_null());
        assert!(request.duration.is_none());
    }
}
