// Copyright 2025 Cowboy AI, LLC.

//! In-process event store
//!
//! Streams live in a map from stream id to an ordered list of events; an
//! event's revision is the length of its stream when it was appended. Nothing
//! survives the process.
//!
//! Subscribers are fed at append time, under the same lock that orders the
//! appends, so each subscription sees events in append order. Listeners run on
//! their own task and never hold up an append. When that task ends, its
//! registration is dropped from the store.

use crate::events::Event;
use crate::infrastructure::event_store::{
    AppendResult, EventListener, EventReadStream, EventStore, EventStoreError, ExpectedRevision,
    StoredRecord, Subscription,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    streams: HashMap<String, Vec<Event>>,
    stream_subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Event>>>,
    all_subscribers: Vec<mpsc::UnboundedSender<Event>>,
    fail_on_append: bool,
}

impl StoreState {
    fn last_revision(&self, stream_id: &str) -> Option<u64> {
        self.streams
            .get(stream_id)
            .and_then(|events| events.len().checked_sub(1))
            .map(|revision| revision as u64)
    }

    fn fan_out(&mut self, stream_id: &str, recorded: &[Event]) {
        let deliver = |subscriber: &mpsc::UnboundedSender<Event>| {
            recorded
                .iter()
                .all(|event| subscriber.send(event.clone()).is_ok())
        };

        if let Some(subscribers) = self.stream_subscribers.get_mut(stream_id) {
            subscribers.retain(deliver);
            if subscribers.is_empty() {
                self.stream_subscribers.remove(stream_id);
            }
        }
        self.all_subscribers.retain(deliver);
    }

    /// Forget subscribers whose delivery task has ended
    fn prune_closed(&mut self) {
        self.stream_subscribers.retain(|_, subscribers| {
            subscribers.retain(|subscriber| !subscriber.is_closed());
            !subscribers.is_empty()
        });
        self.all_subscribers.retain(|subscriber| !subscriber.is_closed());
    }
}

/// Event store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following append fail with a storage error
    pub async fn set_fail_on_append(&self, fail: bool) {
        self.state.write().await.fail_on_append = fail;
    }

    /// Ids of every stream with at least one event
    pub async fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.streams.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of events in a stream
    pub async fn event_count(&self, stream_id: &str) -> usize {
        self.state
            .read()
            .await
            .streams
            .get(stream_id)
            .map_or(0, Vec::len)
    }
}

fn spawn_listener(
    state: Arc<RwLock<StoreState>>,
    mut events: mpsc::UnboundedReceiver<Event>,
    listener: EventListener,
) -> Subscription {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                event = events.recv() => match event {
                    Some(event) => listener(event),
                    None => break,
                },
            }
        }

        drop(events);
        state.write().await.prune_closed();
    });

    Subscription::new(shutdown_tx, task)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<Event>,
        expected_revision: Option<ExpectedRevision>,
    ) -> Result<AppendResult, EventStoreError> {
        let mut state = self.state.write().await;
        if state.fail_on_append {
            return Err(EventStoreError::StorageError("Append rejected".to_string()));
        }

        let current = state.last_revision(stream_id);
        let expected = expected_revision.unwrap_or(ExpectedRevision::Any);
        if !expected.is_satisfied_by(current) {
            return Err(EventStoreError::conflict(stream_id, expected, current));
        }
        if events.is_empty() {
            return Ok(AppendResult::at(current));
        }

        let stream = state.streams.entry(stream_id.to_string()).or_default();
        let recorded: Vec<Event> = events
            .into_iter()
            .enumerate()
            .map(|(offset, event)| {
                let revision = (stream.len() + offset) as u64;
                StoredRecord::assign(stream_id, revision, event).into_event()
            })
            .collect();
        stream.extend(recorded.iter().cloned());
        let last = (stream.len() - 1) as u64;

        state.fan_out(stream_id, &recorded);

        debug!(
            stream_id = %stream_id,
            count = recorded.len(),
            revision = last,
            "Appended events"
        );
        Ok(AppendResult::at(Some(last)))
    }

    async fn read_from_start(&self, stream_id: &str) -> Result<EventReadStream, EventStoreError> {
        let events = self
            .state
            .read()
            .await
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| EventStoreError::stream_not_found(stream_id))?;

        debug!(stream_id = %stream_id, count = events.len(), "Reading stream");
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    async fn subscribe_to_stream(
        &self,
        stream_id: &str,
        listener: EventListener,
    ) -> Result<Subscription, EventStoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.write().await;
            state.prune_closed();
            state
                .stream_subscribers
                .entry(stream_id.to_string())
                .or_default()
                .push(tx);
        }

        let subscription = spawn_listener(self.state.clone(), rx, listener);
        debug!(
            stream_id = %stream_id,
            subscription_id = %subscription.id(),
            "Subscribed to stream"
        );
        Ok(subscription)
    }

    async fn subscribe_to_all(&self, listener: EventListener) -> Result<Subscription, EventStoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.write().await;
            state.prune_closed();
            state.all_subscribers.push(tx);
        }

        let subscription = spawn_listener(self.state.clone(), rx, listener);
        debug!(subscription_id = %subscription.id(), "Subscribed to all streams");
        Ok(subscription)
    }
}
