//! Notification capability for verdict messages.
//!
//! Delivery is best-effort: the pipeline logs a failed delivery and moves on.

use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

pub trait NotificationSink {
    fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Emits each message as a tracing event.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(message, "acne alert");
        Ok(())
    }
}

/// Buffers messages for the caller to drain.
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain buffered messages in delivery order.
    pub fn take(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|mut m| std::mem::take(&mut *m))
            .unwrap_or_default()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .map_err(|_| NotifyError::Delivery("collector lock poisoned".into()))?
            .push(message.to_string());
        Ok(())
    }
}
