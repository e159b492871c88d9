//! Engine error taxonomy.
//!
//! `StoreError` covers the persistence path (SQL + row serialization);
//! `EngineError` is the umbrella the service facade and commands return.
//! Validation problems stay `DomainError` and surface to players as failed
//! outcomes, never as transport errors.

use thiserror::Error;
use wayfarer_domain::{DomainError, TenantId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("tenant '{0}' is not loaded")]
    TenantNotLoaded(TenantId),
}

impl StoreError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    pub fn tenant_not_loaded(tenant: &TenantId) -> Self {
        Self::TenantNotLoaded(tenant.clone())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("content error: {0}")]
    Content(String),

    #[error("{0}")]
    Validation(String),

    #[error("narrative generation failed: {0}")]
    Narrative(String),
}

impl EngineError {
    pub fn content(message: impl Into<String>) -> Self {
        Self::Content(message.into())
    }

    pub fn narrative(message: impl Into<String>) -> Self {
        Self::Narrative(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// User-facing rejections become failed outcomes instead of propagating.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}
