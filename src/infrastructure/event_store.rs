// Copyright 2025 Cowboy AI, LLC.

//! Event store trait and related types

use crate::events::{Event, RecordedPosition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Errors that can occur when working with the event store
#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// The stream has never been appended to
    #[error("Stream {stream_id} not found")]
    StreamNotFound {
        /// Stream that was read
        stream_id: String,
    },

    /// Optimistic concurrency check failed
    #[error("Expected revision {expected} in {stream_id} does not match current revision {}", display_revision(.actual))]
    ConcurrencyConflict {
        /// Stream the append targeted
        stream_id: String,
        /// The token supplied by the caller
        expected: ExpectedRevision,
        /// Revision of the last event in the stream, `None` when the stream is empty
        actual: Option<u64>,
    },

    /// The stream id cannot be used by this store
    #[error("Invalid stream id: {0}")]
    InvalidStreamId(String),

    /// Failed to connect to the event store
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize event data
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Event data is malformed or invalid
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// General storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),
}

fn display_revision(revision: &Option<u64>) -> String {
    match revision {
        Some(revision) => revision.to_string(),
        None => "none".to_string(),
    }
}

impl From<serde_json::Error> for EventStoreError {
    fn from(err: serde_json::Error) -> Self {
        EventStoreError::SerializationError(err.to_string())
    }
}

impl EventStoreError {
    /// Build a concurrency conflict for `stream_id`
    pub fn conflict(
        stream_id: impl Into<String>,
        expected: ExpectedRevision,
        actual: Option<u64>,
    ) -> Self {
        EventStoreError::ConcurrencyConflict {
            stream_id: stream_id.into(),
            expected,
            actual,
        }
    }

    /// Build a stream-not-found error for `stream_id`
    pub fn stream_not_found(stream_id: impl Into<String>) -> Self {
        EventStoreError::StreamNotFound {
            stream_id: stream_id.into(),
        }
    }
}

/// Concurrency token supplied on append
///
/// A stream's token is the revision of its last event. `NoStream` and
/// `StreamExists` express expectations about an empty or non-empty stream
/// without naming a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedRevision {
    /// Append unconditionally
    Any,
    /// The stream must not have any events
    NoStream,
    /// The stream must have at least one event
    StreamExists,
    /// The last event in the stream must have this revision
    Exact(u64),
}

impl ExpectedRevision {
    /// Token describing a stream whose last revision is `current`
    pub fn from_current(current: Option<u64>) -> Self {
        match current {
            Some(revision) => ExpectedRevision::Exact(revision),
            None => ExpectedRevision::NoStream,
        }
    }

    /// Check the token against the stream's current last revision
    pub fn is_satisfied_by(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (ExpectedRevision::Any, _) => true,
            (ExpectedRevision::NoStream, current) => current.is_none(),
            (ExpectedRevision::StreamExists, current) => current.is_some(),
            (ExpectedRevision::Exact(expected), Some(current)) => *expected == current,
            (ExpectedRevision::Exact(_), None) => false,
        }
    }
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedRevision::Any => write!(f, "any"),
            ExpectedRevision::NoStream => write!(f, "no_stream"),
            ExpectedRevision::StreamExists => write!(f, "stream_exists"),
            ExpectedRevision::Exact(revision) => write!(f, "{revision}"),
        }
    }
}

/// Outcome of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResult {
    /// Token to pass on the next append to this stream
    ///
    /// `Exact` with the revision of the last event, or `NoStream` when an
    /// empty batch was appended to a stream that still has no events.
    pub next_expected_revision: ExpectedRevision,
}

impl AppendResult {
    /// Result for a stream whose last revision is `current`
    pub fn at(current: Option<u64>) -> Self {
        Self {
            next_expected_revision: ExpectedRevision::from_current(current),
        }
    }

    /// Revision of the last event in the stream
    pub fn last_revision(&self) -> Option<u64> {
        match self.next_expected_revision {
            ExpectedRevision::Exact(revision) => Some(revision),
            _ => None,
        }
    }
}

/// Wire-level shape of an event held by a store
///
/// All fields are mandatory once an event has been appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Stream the event belongs to
    pub stream_id: String,
    /// Unique event ID
    pub id: Uuid,
    /// Event type tag
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload
    pub data: serde_json::Value,
    /// Zero-based position within the stream
    pub revision: u64,
    /// When the store accepted the event
    pub created: DateTime<Utc>,
    /// Auxiliary information, not interpreted by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl StoredRecord {
    /// Assign a position to an event that is being appended
    pub fn assign(stream_id: &str, revision: u64, event: Event) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            id: Uuid::new_v4(),
            event_type: event.event_type,
            data: event.data,
            revision,
            created: Utc::now(),
            metadata: event.metadata,
        }
    }

    /// Turn the record back into an event carrying its position
    pub fn into_event(self) -> Event {
        let mut event = Event::raw(self.event_type, self.data);
        event.metadata = self.metadata;
        event.position = Some(RecordedPosition {
            stream_id: self.stream_id,
            id: self.id,
            revision: self.revision,
            created: self.created,
        });
        event
    }
}

/// Listener invoked for each event delivered by a subscription
pub type EventListener = Arc<dyn Fn(Event) + Send + Sync>;

/// Lazy, finite, oldest-first sequence of events read from a stream
pub type EventReadStream = BoxStream<'static, Result<Event, EventStoreError>>;

/// Handle to an active subscription
///
/// Dropping the handle detaches the listener; [`Subscription::unsubscribe`]
/// additionally waits until the delivery task has stopped.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a delivery task that stops when `shutdown` fires
    pub fn new(shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Subscription identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop delivering events to the listener
    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::debug!(subscription_id = %self.id, "Unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Append-only, per-stream event log with subscription fan-out
#[async_trait]
pub trait EventStore: Send + Sync + fmt::Debug {
    /// Append events to a stream
    ///
    /// `expected_revision` of `None` appends unconditionally.
    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<Event>,
        expected_revision: Option<ExpectedRevision>,
    ) -> Result<AppendResult, EventStoreError>;

    /// Read a stream from its first event
    ///
    /// Fails with [`EventStoreError::StreamNotFound`] if the stream has never
    /// been appended to.
    async fn read_from_start(&self, stream_id: &str) -> Result<EventReadStream, EventStoreError>;

    /// Deliver every event appended to `stream_id` after this call
    async fn subscribe_to_stream(
        &self,
        stream_id: &str,
        listener: EventListener,
    ) -> Result<Subscription, EventStoreError>;

    /// Deliver every event appended to any stream after this call, in global append order
    async fn subscribe_to_all(&self, listener: EventListener) -> Result<Subscription, EventStoreError>;
}
