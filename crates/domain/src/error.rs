//! Unified error types for the domain layer
//!
//! Provides a common error type used across all manager operations, enabling
//! consistent handling without forcing the engine to use String or anyhow.
//! Validation failures never cross the command boundary as panics; they are
//! converted to player-facing failure results there.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values, incompatible item type)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Actor already has a running action (or its party does)
    #[error("{actor} is busy with another action")]
    Busy { actor: String },

    /// Stage id not present in the event's stage table
    #[error("Unknown stage '{stage}' for event {event}")]
    UnknownStage { event: String, stage: String },

    /// Optional capability is not configured; the operation degrades
    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(&'static str),

    /// Parse error (for value objects and stored enum strings)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// Creates a validation error for business rule violations.
    ///
    /// Use this when input to a manager operation is rejected: required
    /// fields empty, values out of range, incompatible equip targets.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create a busy-actor error
    pub fn busy(actor: impl ToString) -> Self {
        Self::Busy {
            actor: actor.to_string(),
        }
    }

    /// Create an unknown-stage error
    pub fn unknown_stage(event: impl ToString, stage: impl Into<String>) -> Self {
        Self::UnknownStage {
            event: event.to_string(),
            stage: stage.into(),
        }
    }

    /// Create a parse error for string-to-type conversion failures
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
