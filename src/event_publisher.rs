// Copyright 2025 Cowboy AI, LLC.

//! Binding aggregates to an event store
//!
//! An [`EventPublisher`] gives aggregates a publish path: once bound, an
//! aggregate's [`commit`](crate::AggregateRoot::commit) and
//! [`publish`](crate::AggregateRoot::publish) append straight to the store and
//! keep the aggregate's revision in step with its stream.

use crate::aggregate::{AggregateCore, AggregateRoot};
use crate::errors::DomainResult;
use crate::events::{AnyEvent, DomainEvent};
use crate::infrastructure::event_store::{AppendResult, EventStore};
use crate::transform::TransformRegistry;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Publish path shared by every aggregate bound to one store
#[derive(Debug, Clone)]
pub struct EventPublisher {
    store: Arc<dyn EventStore>,
    registry: Arc<TransformRegistry>,
}

impl EventPublisher {
    /// Create a publisher appending to `store`
    pub fn new(store: Arc<dyn EventStore>, registry: Arc<TransformRegistry>) -> Self {
        Self { store, registry }
    }

    /// The store appends go to
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Registry shared with repositories and the bridge
    pub fn registry(&self) -> &Arc<TransformRegistry> {
        &self.registry
    }

    /// Bind an existing aggregate to this publisher
    pub fn merge_object_context<A: AggregateRoot>(&self, mut aggregate: A) -> DomainResult<A> {
        self.registry.register_handlers::<A>()?;
        aggregate.core_mut().bind(self.clone());
        Ok(aggregate)
    }

    /// Factory producing instances of `A` that are bound at construction
    pub fn merge_class_context<A: AggregateRoot>(&self) -> DomainResult<AggregateFactory<A>> {
        self.registry.register_handlers::<A>()?;
        Ok(AggregateFactory {
            publisher: self.clone(),
            _aggregate: PhantomData,
        })
    }

    /// Fresh instance of `A`, already bound
    pub fn create<A: AggregateRoot>(&self, id: impl Into<String>) -> DomainResult<A> {
        Ok(self.merge_class_context::<A>()?.create(id))
    }

    /// Append events to any stream without touching aggregate state
    pub async fn publish(&self, stream_id: &str, events: Vec<AnyEvent>) -> DomainResult<AppendResult> {
        let raw = events
            .iter()
            .map(AnyEvent::to_raw)
            .collect::<Result<Vec<_>, _>>()?;
        let count = raw.len();

        let result = self.store.append_to_stream(stream_id, raw, None).await?;
        debug!(stream_id = %stream_id, count, "Published events");
        Ok(result)
    }

    /// Append a single event to any stream
    pub async fn publish_event<E: DomainEvent>(
        &self,
        stream_id: &str,
        data: E,
    ) -> DomainResult<AppendResult> {
        self.publish(stream_id, vec![AnyEvent::new(data)]).await
    }

    /// Append events to an aggregate's stream without touching its state
    pub async fn publish_for<A: AggregateRoot>(
        &self,
        aggregate: &A,
        events: Vec<AnyEvent>,
    ) -> DomainResult<AppendResult> {
        self.publish(aggregate.stream_id(), events).await
    }
}

/// Constructor for bound instances of `A`
pub struct AggregateFactory<A> {
    publisher: EventPublisher,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: AggregateRoot> AggregateFactory<A> {
    /// Fresh bound instance
    pub fn create(&self, id: impl Into<String>) -> A {
        A::from_core(AggregateCore::bound(
            A::CATEGORY,
            id,
            self.publisher.clone(),
        ))
    }
}

impl<A> Clone for AggregateFactory<A> {
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A> fmt::Debug for AggregateFactory<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateFactory")
            .field("aggregate", &std::any::type_name::<A>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_handler::EventHandlers;
    use crate::events::Event;
    use crate::infrastructure::event_store::ExpectedRevision;
    use crate::infrastructure::in_memory_event_store::InMemoryEventStore;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct LightSwitched {
        on: bool,
    }

    impl DomainEvent for LightSwitched {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct BulbReplaced;

    impl DomainEvent for BulbReplaced {}

    #[derive(Debug, Clone)]
    struct Lamp {
        core: AggregateCore,
        on: bool,
    }

    impl AggregateRoot for Lamp {
        const CATEGORY: &'static str = "lamp";

        fn from_core(core: AggregateCore) -> Self {
            Self { core, on: false }
        }

        fn core(&self) -> &AggregateCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut AggregateCore {
            &mut self.core
        }

        fn register_handlers(handlers: &mut EventHandlers<Self>) {
            handlers.on(|lamp: &mut Lamp, event: &Event<LightSwitched>| {
                lamp.on = event.data.on;
                Ok(())
            });
        }
    }

    fn publisher() -> (EventPublisher, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        let publisher = EventPublisher::new(store.clone(), Arc::new(TransformRegistry::new()));
        (publisher, store)
    }

    #[tokio::test]
    async fn test_merge_object_context_binds_existing_instance() {
        let (publisher, store) = publisher();
        let lamp = Lamp::new("kitchen");
        assert!(!lamp.is_bound());

        let mut lamp = publisher.merge_object_context(lamp).unwrap();
        assert!(lamp.is_bound());
        assert!(publisher.registry().contains("LightSwitched"));

        let result = lamp.publish(LightSwitched { on: true }).await.unwrap().unwrap();
        assert_eq!(result.last_revision(), Some(0));
        assert!(lamp.on);
        assert_eq!(lamp.revision(), Some(0));
        assert_eq!(store.event_count("lamp_kitchen").await, 1);
    }

    #[tokio::test]
    async fn test_merge_class_context_binds_at_construction() {
        let (publisher, _store) = publisher();
        let factory = publisher.merge_class_context::<Lamp>().unwrap();

        let mut lamp = factory.create("hall");
        assert!(lamp.is_bound());

        lamp.apply(LightSwitched { on: true });
        lamp.apply(LightSwitched { on: false });
        lamp.commit().await.unwrap();

        assert!(!lamp.on);
        assert_eq!(lamp.version(), 2);
        assert_eq!(lamp.expected_revision(), ExpectedRevision::Exact(1));
    }

    #[tokio::test]
    async fn test_publish_appends_unconditionally() {
        let (publisher, store) = publisher();

        publisher
            .publish_event("lamp_garage", LightSwitched { on: true })
            .await
            .unwrap();
        let result = publisher
            .publish("lamp_garage", vec![AnyEvent::new(BulbReplaced)])
            .await
            .unwrap();

        assert_eq!(result.last_revision(), Some(1));
        let types: Vec<String> = store
            .read_from_start("lamp_garage")
            .await
            .unwrap()
            .map_ok(|event| event.event_type)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(types, vec!["LightSwitched", "BulbReplaced"]);
    }

    #[tokio::test]
    async fn test_publish_for_leaves_aggregate_untouched() {
        let (publisher, store) = publisher();
        let lamp = publisher.create::<Lamp>("porch").unwrap();

        publisher
            .publish_for(&lamp, vec![AnyEvent::new(LightSwitched { on: true })])
            .await
            .unwrap();

        assert!(!lamp.on);
        assert_eq!(lamp.revision(), None);
        assert_eq!(store.event_count("lamp_porch").await, 1);
    }
}
