// Copyright 2025 Cowboy AI, LLC.

//! Process-wide event notification channel

use crate::events::AnyEvent;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// Default number of events buffered per receiver
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel of decoded events for projections and sagas
///
/// Receivers that fall more than `capacity` events behind lose the oldest
/// events rather than slowing publishers down.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AnyEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Notify every current receiver, returning how many there were
    pub fn publish(&self, event: AnyEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<AnyEvent> {
        self.sender.subscribe()
    }

    /// Events published after this call as a stream, skipping over lag
    pub fn stream(&self) -> BoxStream<'static, AnyEvent> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|item| async move {
                match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event bus receiver lagged");
                        None
                    }
                }
            })
            .boxed()
    }

    /// Number of live receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
