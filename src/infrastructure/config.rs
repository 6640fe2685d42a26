// Copyright 2025 Cowboy AI, LLC.

//! Event store selection

use crate::infrastructure::event_store::{EventStore, EventStoreError};
use crate::infrastructure::in_memory_event_store::InMemoryEventStore;
use crate::infrastructure::jetstream_event_store::{JetStreamConfig, JetStreamEventStore};
use crate::infrastructure::nats_client::NatsConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Which event store backs the process, and how to reach it
///
/// ```rust
/// use cim_eventsource::infrastructure::EventStoreConfig;
///
/// let config: EventStoreConfig = serde_json::from_str(
///     r#"{"backend": "jet_stream", "nats": {"url": "nats://events:4222"}}"#,
/// )
/// .unwrap();
///
/// match config {
///     EventStoreConfig::JetStream { nats, jetstream } => {
///         assert_eq!(nats.url, "nats://events:4222");
///         assert_eq!(jetstream.subject_prefix, "events");
///     }
///     EventStoreConfig::InMemory => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EventStoreConfig {
    /// Process-local store, lost on exit
    #[default]
    InMemory,
    /// NATS JetStream
    JetStream {
        /// Connection settings
        #[serde(default)]
        nats: NatsConfig,
        /// Stream settings
        #[serde(default)]
        jetstream: JetStreamConfig,
    },
}

impl EventStoreConfig {
    /// Build the configured store
    pub async fn connect(&self) -> Result<Arc<dyn EventStore>, EventStoreError> {
        match self {
            EventStoreConfig::InMemory => {
                info!("Using in-memory event store");
                Ok(Arc::new(InMemoryEventStore::new()))
            }
            EventStoreConfig::JetStream { nats, jetstream } => {
                let store = JetStreamEventStore::connect(nats.clone(), jetstream.clone()).await?;
                Ok(Arc::new(store))
            }
        }
    }
}
