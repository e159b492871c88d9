//! Action value objects - the duration-bound activity state carried by
//! characters, NPCs and parties.
//!
//! An actor holds at most one running [`ActiveAction`] plus a FIFO queue of
//! [`QueuedAction`] requests. Progress is advanced by the world tick and is
//! persisted with the owning entity so a restart resumes mid-action.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A running action with accumulated progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAction {
    /// Action keyword (e.g., "move", "rest", "gather"); resolved against the
    /// command registry on completion.
    pub action_type: String,
    /// Free-form parameters supplied by the requesting layer.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Wall-clock moment the action started (diagnostic, not used for math).
    pub started_at: DateTime<Utc>,
    /// World-seconds accumulated so far. Non-decreasing.
    pub progress: f64,
    /// Total world-seconds required for completion.
    pub duration: f64,
}

impl ActiveAction {
    pub fn is_complete(&self) -> bool {
        self.progress >= self.duration
    }

    /// Fraction complete in `[0, 1]` for progress displays.
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.progress / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// A pending action request waiting for the actor to become idle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub action_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Duration the requester suggested; used when the rules capability
    /// returns nothing for this action type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint: Option<f64>,
}

impl QueuedAction {
    pub fn new(action_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            action_type: action_type.into(),
            params,
            duration_hint: None,
        }
    }

    pub fn with_hint(mut self, duration: f64) -> Self {
        self.duration_hint = Some(duration);
        self
    }
}

/// Per-actor action bookkeeping: the single current action and the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<ActiveAction>,
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub queue: VecDeque<QueuedAction>,
}

impl ActionState {
    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Idle with nothing pending.
    pub fn is_quiet(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn begin(&mut self, action: ActiveAction) {
        self.current = Some(action);
    }

    pub fn enqueue(&mut self, request: QueuedAction) {
        self.queue.push_back(request);
    }

    /// Clears the running action and hands back the next queued request, if
    /// any. The caller decides whether (and how) to start it.
    pub fn finish_current(&mut self) -> Option<QueuedAction> {
        self.current = None;
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(progress: f64, duration: f64) -> ActiveAction {
        ActiveAction {
            action_type: "move".to_string(),
            params: serde_json::Value::Null,
            started_at: Utc::now(),
            progress,
            duration,
        }
    }

    #[test]
    fn test_completion_threshold() {
        assert!(!running(4.9, 5.0).is_complete());
        assert!(running(5.0, 5.0).is_complete());
        assert!(running(7.2, 5.0).is_complete());
    }

    #[test]
    fn test_zero_duration_is_instantly_complete() {
        assert!(running(0.0, 0.0).is_complete());
        assert_eq!(running(0.0, 0.0).fraction(), 1.0);
    }

    #[test]
    fn test_finish_current_pops_queue_in_fifo_order() {
        let mut state = ActionState::default();
        state.begin(running(5.0, 5.0));
        state.enqueue(QueuedAction::new("rest", serde_json::Value::Null));
        state.enqueue(QueuedAction::new("gather", serde_json::Value::Null));

        let next = state.finish_current().expect("queue entry");
        assert_eq!(next.action_type, "rest");
        assert!(state.current.is_none());
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn test_action_state_roundtrips_through_json() {
        let mut state = ActionState::default();
        state.begin(running(1.5, 10.0));
        state.enqueue(QueuedAction::new("rest", serde_json::json!({"spot": "inn"})).with_hint(3.0));

        let json = serde_json::to_string(&state).expect("serialize");
        let back: ActionState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(state, back);
    }
}
