// Copyright 2025 Cowboy AI, LLC.

//! Event-sourced aggregate repository
//!
//! Loading reads the aggregate's stream from the start and replays every
//! event through its handlers. Saving settles the pending events locally and
//! appends them against the revision the aggregate last observed, which is
//! the only optimistic concurrency guard.
//!
//! ```mermaid
//! sequenceDiagram
//!     participant C as Caller
//!     participant R as AggregateRepository
//!     participant S as EventStore
//!     participant T as TransformRegistry
//!     C->>R: load(id)
//!     R->>S: read_from_start(stream_id)
//!     S-->>R: events
//!     R->>T: decode(event)
//!     R->>R: apply_from_history(event)
//!     R-->>C: aggregate
//!     C->>R: save(&mut aggregate)
//!     R->>R: settle pending events
//!     R->>S: append_to_stream(expected revision)
//! ```

use crate::aggregate::{flush_pending, AggregateRoot};
use crate::errors::DomainResult;
use crate::event_publisher::{AggregateFactory, EventPublisher};
use crate::infrastructure::event_store::{AppendResult, EventStore};
use crate::transform::TransformRegistry;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Either an aggregate id or an aggregate that is already loaded
#[derive(Debug, Clone)]
pub enum IdOrAggregate<A> {
    /// Raw id, loaded on demand
    Id(String),
    /// Hydrated instance
    Aggregate(A),
}

impl<A> From<&str> for IdOrAggregate<A> {
    fn from(id: &str) -> Self {
        IdOrAggregate::Id(id.to_string())
    }
}

impl<A> From<String> for IdOrAggregate<A> {
    fn from(id: String) -> Self {
        IdOrAggregate::Id(id)
    }
}

/// Loads and saves aggregates of type `A`
pub struct AggregateRepository<A> {
    store: Arc<dyn EventStore>,
    registry: Arc<TransformRegistry>,
    publisher: EventPublisher,
    factory: AggregateFactory<A>,
}

impl<A: AggregateRoot> AggregateRepository<A> {
    /// Create a repository over `store`
    ///
    /// Every event type `A` handles is registered in `registry`. Fails when
    /// one of those tags already decodes to another payload type.
    pub fn new(store: Arc<dyn EventStore>, registry: Arc<TransformRegistry>) -> DomainResult<Self> {
        let publisher = EventPublisher::new(store.clone(), registry.clone());
        let factory = publisher.merge_class_context::<A>()?;
        Ok(Self {
            store,
            registry,
            publisher,
            factory,
        })
    }

    /// Create a repository sharing a publisher's store and registry
    pub fn with_publisher(publisher: &EventPublisher) -> DomainResult<Self> {
        Self::new(publisher.store().clone(), publisher.registry().clone())
    }

    /// Fresh aggregate, bound so that `commit` and `publish` append directly
    pub fn create(&self, id: impl Into<String>) -> A {
        self.factory.create(id)
    }

    /// Rebuild an aggregate from its stream
    ///
    /// Fails with a not-found error when the stream has never been appended to.
    pub async fn load(&self, id: impl Into<String>) -> DomainResult<A> {
        let mut aggregate = self.create(id);
        let stream_id = aggregate.stream_id().to_string();

        let mut events = self.store.read_from_start(&stream_id).await?;
        while let Some(raw) = events.next().await {
            let event = self.registry.decode(raw?)?;
            aggregate.apply_from_history(&event).await?;
        }

        debug!(
            stream_id = %stream_id,
            version = aggregate.version(),
            revision = ?aggregate.revision(),
            "Loaded aggregate"
        );
        Ok(aggregate)
    }

    /// Alias of [`load`](Self::load)
    pub async fn find_one(&self, id: impl Into<String>) -> DomainResult<A> {
        self.load(id).await
    }

    /// Settle and append the aggregate's pending events
    ///
    /// Returns `None` when nothing was pending. On failure the aggregate is
    /// left exactly as it was, pending events included.
    pub async fn save(&self, aggregate: &mut A) -> DomainResult<Option<AppendResult>> {
        flush_pending(aggregate, self.store.as_ref()).await
    }

    /// Resolve an id or an instance into `(id, aggregate)`, loading ids
    pub async fn stream_id_and_aggregate(
        &self,
        target: impl Into<IdOrAggregate<A>>,
    ) -> DomainResult<(String, A)> {
        match target.into() {
            IdOrAggregate::Id(id) => {
                let aggregate = self.load(id.as_str()).await?;
                Ok((id, aggregate))
            }
            IdOrAggregate::Aggregate(aggregate) => Ok((aggregate.id().to_string(), aggregate)),
        }
    }

    /// The publisher instances from this repository are bound to
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }
}

impl<A> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            publisher: self.publisher.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<A> fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("aggregate", &std::any::type_name::<A>())
            .field("store", &self.store)
            .finish()
    }
}
