//! Response and notification DTOs handed back to the embedding application.

use serde::{Deserialize, Serialize};

// =============================================================================
// Action Outcome
// =============================================================================

/// Result of a command or completed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    /// Outcome keyword (e.g., "success", "failure", "queued") used by event
    /// stages to pick a destination.
    pub outcome: String,
    /// Human-readable summary for the player.
    pub message: String,
    /// Whether world state changed; callers can skip refreshes when false.
    pub state_changed: bool,
    /// Optional structured payload (varies by command).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActionOutcome {
    pub fn success(outcome: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            outcome: outcome.into(),
            message: message.into(),
            state_changed: true,
            data: None,
        }
    }

    pub fn failure(outcome: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: outcome.into(),
            message: message.into(),
            state_changed: false,
            data: None,
        }
    }

    pub fn with_data<T: Serialize>(mut self, data: T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn without_state_change(mut self) -> Self {
        self.state_changed = false;
        self
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// An asynchronous message the world pushes to a channel (action completed,
/// event stage changed, narrative text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: String,
    pub channel_id: String,
    pub body: String,
}

impl Notification {
    pub fn new(
        tenant_id: impl Into<String>,
        channel_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            channel_id: channel_id.into(),
            body: body.into(),
        }
    }
}

// =============================================================================
// World Status
// =============================================================================

/// Snapshot of a tenant's world for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldStatus {
    /// In-game calendar line (e.g., "Day 3, 1:05 PM").
    pub date_display: String,
    /// Time-of-day period name (e.g., "Morning").
    pub period: String,
    pub active_events: u32,
    /// Characters currently running an action.
    pub busy_characters: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_outcome_reports_no_state_change() {
        let outcome = ActionOutcome::failure("failure", "The door is locked.");
        assert!(!outcome.success);
        assert!(!outcome.state_changed);
    }

    #[test]
    fn with_data_attaches_payload() {
        let outcome = ActionOutcome::success("success", "You picked the lock.")
            .with_data(serde_json::json!({"skill": "lockpicking"}));
        assert_eq!(
            outcome.data.expect("payload")["skill"],
            serde_json::json!("lockpicking")
        );
    }
}
