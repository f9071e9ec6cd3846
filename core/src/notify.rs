//! Notifier abstraction for outbound notifications.
//!
//! Engines never deliver anything themselves. A reducer returns
//! [`Effect::Publish`](crate::effect::Effect::Publish) values, and once the
//! aggregate's lock has been released the runtime hands each payload to a
//! [`Notifier`]. The notifier is the boundary to the external real-time
//! transport (websocket fan-out, push, email).
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌───────────┐
//! │   Command   │────▶│   Reducer   │────▶│    Store     │────▶│ Notifier  │──▶ transport
//! └─────────────┘     └─────────────┘     │ (unlock, then│     └───────────┘
//!                                         │  dispatch)   │
//!                                         └──────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! - **Fire-and-forget**: the state change is already committed when a
//!   notification is published. A [`NotifyError`] is logged by the runtime and
//!   never reaches the caller of the triggering operation.
//! - **At-most-once**: notifiers are not retried by the runtime.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while handing a notification to the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// No subscriber is currently attached to the transport
    #[error("No active subscribers for notification '{0}'")]
    NoSubscribers(String),

    /// The transport rejected or failed to accept the notification
    #[error("Delivery failed for '{subject}': {reason}")]
    DeliveryFailed {
        /// The notification subject
        subject: String,
        /// The reason for failure
        reason: String,
    },

    /// The notification could not be encoded for the transport
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Boxed future returned by [`Notifier::notify`].
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Outbound port for notifications.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so stores can hold an `Arc<dyn Notifier<N>>`.
pub trait Notifier<N>: Send + Sync {
    /// Hand a notification to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the transport cannot accept the payload.
    fn notify(&self, notification: N) -> NotifyFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_subject() {
        let err = NotifyError::DeliveryFailed {
            subject: "booking created".to_string(),
            reason: "socket closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Delivery failed for 'booking created': socket closed"
        );
    }
}
