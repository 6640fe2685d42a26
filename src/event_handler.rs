// Copyright 2025 Cowboy AI, LLC.

//! Per-aggregate event handler tables
//!
//! Each aggregate type declares its handlers once, in
//! [`AggregateRoot::register_handlers`]. The resulting table maps an event's
//! payload type to the ordered list of handlers for it and is built the first
//! time the type is used, then shared by every instance.
//!
//! ```mermaid
//! graph LR
//!     E[AnyEvent] -->|payload TypeId| T[EventHandlers]
//!     T -->|declaration order| H1[handler 1]
//!     T --> H2[handler 2]
//!     H1 --> A[Aggregate state]
//!     H2 --> A
//! ```

use crate::aggregate::AggregateRoot;
use crate::errors::{DomainError, DomainResult};
use crate::events::{AnyEvent, DomainEvent, Event};
use crate::transform::decode_as;
use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Future returned by asynchronous handlers
pub type HandlerFuture<'a> = BoxFuture<'a, DomainResult<()>>;

/// Decoder producing the typed event a table entry expects
pub type DecodeFn = fn(&Event) -> DomainResult<AnyEvent>;

type ErasedHandler<A> =
    Arc<dyn for<'a> Fn(&'a mut A, &'a AnyEvent) -> HandlerFuture<'a> + Send + Sync>;

fn erase<A, F>(handler: F) -> ErasedHandler<A>
where
    F: for<'a> Fn(&'a mut A, &'a AnyEvent) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    Arc::new(handler)
}

struct HandlerEntry<A> {
    event_type: &'static str,
    decode: DecodeFn,
    handlers: Vec<ErasedHandler<A>>,
}

impl<A> Clone for HandlerEntry<A> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type,
            decode: self.decode,
            handlers: self.handlers.clone(),
        }
    }
}

/// Handlers of aggregate type `A`, keyed by event payload type
pub struct EventHandlers<A> {
    entries: IndexMap<TypeId, HandlerEntry<A>>,
}

impl<A> Default for EventHandlers<A> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<A> Clone for EventHandlers<A> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<A> fmt::Debug for EventHandlers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .values()
                    .map(|entry| (entry.event_type, entry.handlers.len())),
            )
            .finish()
    }
}

impl<A: Send + 'static> EventHandlers<A> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn entry<E: DomainEvent>(&mut self) -> &mut HandlerEntry<A> {
        self.entries
            .entry(TypeId::of::<E>())
            .or_insert_with(|| HandlerEntry {
                event_type: E::event_type(),
                decode: decode_as::<E>,
                handlers: Vec::new(),
            })
    }

    /// Add a synchronous handler for `E`
    pub fn on<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: DomainEvent,
        F: Fn(&mut A, &Event<E>) -> DomainResult<()> + Send + Sync + 'static,
    {
        let handler = erase(move |aggregate: &mut A, event: &AnyEvent| {
            let result = match event.downcast_ref::<E>() {
                Some(event) => handler(aggregate, event),
                None => Ok(()),
            };
            Box::pin(future::ready(result)) as HandlerFuture<'_>
        });
        self.entry::<E>().handlers.push(handler);
        self
    }

    /// Add an asynchronous handler for `E`
    ///
    /// The event counts as applied only once the returned future completes.
    pub fn on_async<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: DomainEvent,
        F: for<'a> Fn(&'a mut A, &'a Event<E>) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        let handler = erase(move |aggregate: &mut A, event: &AnyEvent| {
            match event.downcast_ref::<E>() {
                Some(event) => handler(aggregate, event),
                None => Box::pin(future::ok::<(), DomainError>(())),
            }
        });
        self.entry::<E>().handlers.push(handler);
        self
    }

    /// Merge the handlers of a component type `P`, reached through `project`
    ///
    /// Inherited handlers keep their order and run before handlers added later
    /// for the same event type.
    pub fn inherit<P: Send + 'static>(
        &mut self,
        parent: &EventHandlers<P>,
        project: fn(&mut A) -> &mut P,
    ) -> &mut Self {
        for (type_id, parent_entry) in &parent.entries {
            let entry = self
                .entries
                .entry(*type_id)
                .or_insert_with(|| HandlerEntry {
                    event_type: parent_entry.event_type,
                    decode: parent_entry.decode,
                    handlers: Vec::new(),
                });

            for parent_handler in &parent_entry.handlers {
                let parent_handler = parent_handler.clone();
                entry.handlers.push(erase(
                    move |aggregate: &mut A, event: &AnyEvent| {
                        parent_handler(project(aggregate), event)
                    },
                ));
            }
        }
        self
    }

    /// Whether any handler is registered for payload type `E`
    pub fn handles<E: DomainEvent>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<E>())
    }

    /// Number of handlers registered for the event's type
    pub fn handler_count(&self, event: &AnyEvent) -> usize {
        self.lookup(event)
            .map(|entry| entry.handlers.len())
            .unwrap_or(0)
    }

    /// Tags of handled event types, in declaration order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.entries.values().map(|entry| entry.event_type).collect()
    }

    /// Tag, payload type and decoder of every handled event type
    pub fn transforms(&self) -> impl Iterator<Item = (&'static str, TypeId, DecodeFn)> + '_ {
        self.entries
            .iter()
            .map(|(payload, entry)| (entry.event_type, *payload, entry.decode))
    }

    fn lookup(&self, event: &AnyEvent) -> Option<&HandlerEntry<A>> {
        match event.payload_type_id() {
            Some(type_id) => self.entries.get(&type_id),
            None => self
                .entries
                .values()
                .find(|entry| entry.event_type == event.event_type()),
        }
    }

    /// Run every handler for `event` in declaration order
    ///
    /// Untyped events whose tag matches a handled type are decoded first.
    /// Events with no handler are accepted without effect.
    pub async fn dispatch(&self, aggregate: &mut A, event: &AnyEvent) -> DomainResult<()> {
        let Some(entry) = self.lookup(event) else {
            return Ok(());
        };

        let decoded;
        let event = match event.as_untyped() {
            Some(raw) => {
                decoded = (entry.decode)(raw)?;
                &decoded
            }
            None => event,
        };

        for handler in &entry.handlers {
            handler(&mut *aggregate, event).await?;
        }
        Ok(())
    }
}

type TableCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static TABLES: OnceLock<TableCache> = OnceLock::new();

impl<A: AggregateRoot> EventHandlers<A> {
    /// Handler table of `A`, built on first use
    pub fn resolve() -> Arc<Self> {
        let tables = TABLES.get_or_init(TableCache::default);

        let cached = tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<A>())
            .cloned();
        if let Some(table) = cached.and_then(|table| table.downcast::<Self>().ok()) {
            return table;
        }

        let mut handlers = Self::new();
        A::register_handlers(&mut handlers);
        tracing::debug!(
            aggregate = A::CATEGORY,
            event_types = ?handlers.event_types(),
            "Resolved event handlers"
        );

        let handlers = Arc::new(handlers);
        let mut tables = tables.write().unwrap_or_else(PoisonError::into_inner);
        let raced = tables
            .get(&TypeId::of::<A>())
            .cloned()
            .and_then(|table| table.downcast::<Self>().ok());

        match raced {
            Some(table) => table,
            None => {
                tables.insert(TypeId::of::<A>(), handlers.clone());
                handlers
            }
        }
    }
}
