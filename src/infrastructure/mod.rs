// Copyright 2025 Cowboy AI, LLC.

//! Infrastructure layer for cim-eventsource
//!
//! This module contains the storage side of event sourcing:
//! - The event store contract and its error taxonomy
//! - An in-process store for tests and single-process deployments
//! - A NATS JetStream store for durable deployments
//! - Store selection from configuration

pub mod config;
pub mod event_store;
pub mod in_memory_event_store;
pub mod jetstream_event_store;
pub mod nats_client;

pub use config::EventStoreConfig;
pub use event_store::{
    AppendResult, EventListener, EventReadStream, EventStore, EventStoreError, ExpectedRevision,
    StoredRecord, Subscription,
};
pub use in_memory_event_store::InMemoryEventStore;
pub use jetstream_event_store::{JetStreamConfig, JetStreamEventStore, StorageKind};
pub use nats_client::{NatsClient, NatsConfig, NatsError};
