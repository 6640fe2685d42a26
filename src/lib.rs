// Copyright 2025 Cowboy AI, LLC.

//! # CIM Event Source
//!
//! Event-sourced aggregates for the Composable Information Machine.
//!
//! This crate provides the building blocks for persisting aggregates as
//! append-only event streams:
//! - **Events**: Typed payloads with a type tag, positioned once recorded
//! - **Aggregates**: State rebuilt by replaying events through handlers
//! - **Event Handlers**: Declaration-ordered handler tables per aggregate type
//! - **Transform Registry**: Type tags mapped to typed event decoders
//! - **Event Stores**: In-memory and NATS JetStream backends
//! - **Repositories**: Load by replay, save with optimistic concurrency
//! - **Event Bridge**: Every appended event forwarded to an in-process bus
//!
//! ## Design Principles
//!
//! 1. **Events are the source of truth**: State is only ever derived from them
//! 2. **Optimistic Concurrency**: Appends carry the revision last observed
//! 3. **All or Nothing**: A failed save leaves the aggregate as it was
//! 4. **Explicit Registration**: Handlers and transforms are declared, never discovered
//! 5. **Pluggable Storage**: Aggregates never know which store backs them

#![warn(missing_docs)]

mod aggregate;
mod errors;
mod event_handler;
mod event_publisher;
mod events;
mod transform;
pub mod infrastructure;
pub mod integration;
pub mod persistence;

// Re-export core types
pub use aggregate::{AggregateCore, AggregateRoot};
pub use errors::{DomainError, DomainResult};
pub use event_handler::{EventHandlers, HandlerFuture};
pub use event_publisher::{AggregateFactory, EventPublisher};
pub use events::{short_type_name, AnyEvent, DomainEvent, ErasedEvent, Event, RecordedPosition};
pub use transform::{decode_as, TransformFn, TransformRegistry, Transformer};

pub use infrastructure::{
    AppendResult, EventListener, EventReadStream, EventStore, EventStoreConfig, EventStoreError,
    ExpectedRevision, InMemoryEventStore, JetStreamConfig, JetStreamEventStore, NatsClient,
    NatsConfig, StoredRecord, Subscription,
};
pub use integration::{EventBridge, EventBus};
pub use persistence::{AggregateRepository, IdOrAggregate};
