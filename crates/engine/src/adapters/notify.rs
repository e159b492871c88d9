//! Null notifier adapter.

use async_trait::async_trait;
use tracing::debug;
use wayfarer_shared::Notification;

use crate::error::EngineError;
use crate::ports::NotifierPort;

/// Default notifier: logs and drops. The presentation layer registers a real
/// one that pushes to chat channels.
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl NotifierPort for NullNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), EngineError> {
        debug!(
            tenant = %notification.tenant_id,
            channel = %notification.channel_id,
            body = %notification.body,
            "No notifier attached, dropping notification"
        );
        Ok(())
    }
}
