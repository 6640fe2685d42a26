// Copyright 2025 Cowboy AI, LLC.

//! Saved aggregates reach reactors through the bridge

use cim_eventsource::{
    AggregateCore, AggregateRepository, AggregateRoot, DomainEvent, Event, EventBridge, EventBus,
    EventHandlers, EventStoreConfig, TransformRegistry,
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TicketOpened {
    title: String,
}

impl DomainEvent for TicketOpened {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TicketClosed;

impl DomainEvent for TicketClosed {}

#[derive(Debug, Clone)]
struct Ticket {
    core: AggregateCore,
    open: bool,
}

impl AggregateRoot for Ticket {
    const CATEGORY: &'static str = "ticket";

    fn from_core(core: AggregateCore) -> Self {
        Self { core, open: false }
    }

    fn core(&self) -> &AggregateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore {
        &mut self.core
    }

    fn register_handlers(handlers: &mut EventHandlers<Self>) {
        handlers
            .on(|ticket: &mut Ticket, _: &Event<TicketOpened>| {
                ticket.open = true;
                Ok(())
            })
            .on(|ticket: &mut Ticket, _: &Event<TicketClosed>| {
                ticket.open = false;
                Ok(())
            });
    }
}

#[tokio::test]
async fn test_saved_events_reach_the_bus_in_append_order() {
    let store = EventStoreConfig::InMemory.connect().await.unwrap();
    let registry = Arc::new(TransformRegistry::new());
    let repository: AggregateRepository<Ticket> =
        AggregateRepository::new(store.clone(), registry.clone()).unwrap();

    let bridge = EventBridge::start(store.as_ref(), registry, EventBus::default())
        .await
        .unwrap();
    let mut feed = bridge.bus().stream();

    let mut first = repository.create("1");
    first.apply(TicketOpened {
        title: "Printer on fire".to_string(),
    });
    repository.save(&mut first).await.unwrap();

    let mut second = repository.create("2");
    second.apply(TicketOpened {
        title: "Coffee machine".to_string(),
    });
    second.apply(TicketClosed);
    repository.save(&mut second).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(1), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert!(event.is_typed());
        seen.push((
            event.stream_id().map(str::to_string),
            event.event_type().to_string(),
            event.revision(),
        ));
    }

    assert_eq!(
        seen,
        vec![
            (Some("ticket_1".to_string()), "TicketOpened".to_string(), Some(0)),
            (Some("ticket_2".to_string()), "TicketOpened".to_string(), Some(0)),
            (Some("ticket_2".to_string()), "TicketClosed".to_string(), Some(1)),
        ]
    );

    let opened = repository.load("1").await.unwrap();
    assert!(opened.open);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_dropping_the_bridge_detaches_it() {
    let store = EventStoreConfig::InMemory.connect().await.unwrap();
    let registry = Arc::new(TransformRegistry::new());
    let bus = EventBus::new(8);
    let mut receiver = bus.subscribe();

    let bridge = EventBridge::start(store.as_ref(), registry.clone(), bus.clone())
        .await
        .unwrap();
    drop(bridge);
    tokio::task::yield_now().await;

    let repository: AggregateRepository<Ticket> = AggregateRepository::new(store, registry).unwrap();
    let mut ticket = repository.create("3");
    ticket.apply(TicketClosed);
    repository.save(&mut ticket).await.unwrap();

    assert!(timeout(Duration::from_millis(50), receiver.recv()).await.is_err());
}
