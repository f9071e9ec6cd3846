//! Ready-made [`Notifier`] implementations.
//!
//! - [`BroadcastNotifier`]: fans notifications out over a `tokio::sync::broadcast`
//!   channel. The external real-time transport subscribes and forwards to
//!   connected clients.
//! - [`TracingNotifier`]: logs every notification; useful for demos and for
//!   deployments without a live transport.

use chagua_core::notify::{Notifier, NotifyError, NotifyFuture};
use std::fmt::Debug;
use tokio::sync::broadcast;

/// Notifier backed by a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier<N> {
    sender: broadcast::Sender<N>,
}

impl<N> BroadcastNotifier<N>
where
    N: Clone + Send + 'static,
{
    /// Create a notifier whose channel buffers up to `capacity` messages per
    /// subscriber before the slowest one starts lagging.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach a new subscriber
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<N> {
        self.sender.subscribe()
    }

    /// Number of attached subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<N> Notifier<N> for BroadcastNotifier<N>
where
    N: Clone + Send + Sync + 'static,
{
    fn notify(&self, notification: N) -> NotifyFuture<'_> {
        let result = self
            .sender
            .send(notification)
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers(std::any::type_name::<N>().to_string()));
        Box::pin(async move { result })
    }
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl<N> Notifier<N> for TracingNotifier
where
    N: Debug + Send + 'static,
{
    fn notify(&self, notification: N) -> NotifyFuture<'_> {
        tracing::info!(?notification, "Notification published");
        Box::pin(async { Ok(()) })
    }
}
