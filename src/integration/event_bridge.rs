// Copyright 2025 Cowboy AI, LLC.

//! Bridge from the store's global append feed to the [`EventBus`]
//!
//! Every event appended to any stream is decoded through the
//! [`TransformRegistry`] and published on the bus. Events whose registered
//! transform rejects the payload are forwarded untyped so reactors still see
//! them.

use crate::events::{AnyEvent, Event};
use crate::infrastructure::event_store::{EventListener, EventStore, EventStoreError, Subscription};
use crate::integration::event_bus::EventBus;
use crate::transform::TransformRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// Running all-stream subscription feeding an [`EventBus`]
///
/// Dropping the bridge detaches it from the store; [`EventBridge::shutdown`]
/// also waits for in-flight deliveries to finish.
#[derive(Debug)]
pub struct EventBridge {
    subscription: Subscription,
    bus: EventBus,
}

impl EventBridge {
    /// Subscribe to every stream of `store` and forward to `bus`
    pub async fn start(
        store: &dyn EventStore,
        registry: Arc<TransformRegistry>,
        bus: EventBus,
    ) -> Result<Self, EventStoreError> {
        let forward = bus.clone();
        let listener: EventListener = Arc::new(move |raw: Event| {
            forward.publish(decode_or_untyped(&registry, raw));
        });

        let subscription = store.subscribe_to_all(listener).await?;
        info!(subscription_id = %subscription.id(), "Event bridge started");

        Ok(Self { subscription, bus })
    }

    /// Bus the bridge publishes to
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Stop forwarding and wait for the listener to detach
    pub async fn shutdown(self) {
        let subscription_id = self.subscription.id();
        self.subscription.unsubscribe().await;
        info!(subscription_id = %subscription_id, "Event bridge stopped");
    }
}

fn decode_or_untyped(registry: &TransformRegistry, raw: Event) -> AnyEvent {
    let fallback = raw.clone();
    match registry.decode(raw) {
        Ok(event) => event,
        Err(err) => {
            warn!(
                event_type = %fallback.event_type,
                stream_id = ?fallback.stream_id(),
                error = %err,
                "Forwarding undecodable event untyped"
            );
            AnyEvent::untyped(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DomainEvent;
    use crate::infrastructure::in_memory_event_store::InMemoryEventStore;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        total: u32,
    }

    impl DomainEvent for OrderPlaced {}

    fn registry() -> Arc<TransformRegistry> {
        let registry = TransformRegistry::new();
        registry.register_event::<OrderPlaced>();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_decodes_known_events() {
        let store = InMemoryEventStore::new();
        let bridge = EventBridge::start(&store, registry(), EventBus::new(16))
            .await
            .unwrap();
        let mut receiver = bridge.bus().subscribe();

        let event = Event::new(OrderPlaced { total: 12 }).to_raw().unwrap();
        store.append_to_stream("order_1", vec![event], None).await.unwrap();

        let received = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        let typed = received.downcast_ref::<OrderPlaced>().unwrap();
        assert_eq!(typed.data, OrderPlaced { total: 12 });
        assert_eq!(received.stream_id(), Some("order_1"));
        assert_eq!(received.revision(), Some(0));

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_forwarded_untyped() {
        let store = InMemoryEventStore::new();
        let bridge = EventBridge::start(&store, registry(), EventBus::new(16))
            .await
            .unwrap();
        let mut receiver = bridge.bus().subscribe();

        store
            .append_to_stream(
                "order_2",
                vec![Event::raw("OrderPlaced", json!({ "total": "lots" }))],
                None,
            )
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!received.is_typed());
        assert_eq!(received.event_type(), "OrderPlaced");

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_forwarding() {
        let store = InMemoryEventStore::new();
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let bridge = EventBridge::start(&store, registry(), bus.clone()).await.unwrap();

        bridge.shutdown().await;
        store
            .append_to_stream("order_3", vec![Event::raw("Ignored", json!({}))], None)
            .await
            .unwrap();

        let outcome = timeout(Duration::from_millis(50), receiver.recv()).await;
        assert!(outcome.is_err());
    }
}
