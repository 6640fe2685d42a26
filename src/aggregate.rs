// Copyright 2025 Cowboy AI, LLC.

//! Event-sourced aggregate roots
//!
//! An aggregate is an in-memory projection of its stream. Domain operations
//! queue pending events with [`AggregateRoot::apply`]; state only changes when
//! an event is settled through the aggregate's handlers, either while
//! replaying history or while committing.
//!
//! ```mermaid
//! stateDiagram-v2
//!     [*] --> Fresh
//!     Fresh --> Hydrated: apply_from_history
//!     Hydrated --> Hydrated: apply_from_history
//!     Fresh --> Dirty: apply
//!     Hydrated --> Dirty: apply
//!     Dirty --> Hydrated: commit / save
//!     Dirty --> Hydrated: uncommit
//! ```

use crate::errors::{DomainError, DomainResult};
use crate::event_handler::EventHandlers;
use crate::event_publisher::EventPublisher;
use crate::events::{AnyEvent, DomainEvent};
use crate::infrastructure::event_store::{AppendResult, EventStore, ExpectedRevision};
use async_trait::async_trait;
use tracing::debug;

/// Identity, counters and queues shared by every aggregate
#[derive(Debug, Clone)]
pub struct AggregateCore {
    id: String,
    stream_id: String,
    version: u64,
    revision: Option<u64>,
    pending: Vec<AnyEvent>,
    publisher: Option<EventPublisher>,
}

impl AggregateCore {
    /// Fresh core for `id` in stream category `category`
    pub fn new(category: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            stream_id: format!("{category}_{id}"),
            id,
            version: 0,
            revision: None,
            pending: Vec::new(),
            publisher: None,
        }
    }

    /// Fresh core whose publish path is already wired to `publisher`
    pub fn bound(category: &str, id: impl Into<String>, publisher: EventPublisher) -> Self {
        let mut core = Self::new(category, id);
        core.publisher = Some(publisher);
        core
    }

    pub(crate) fn bind(&mut self, publisher: EventPublisher) {
        self.publisher = Some(publisher);
    }
}

/// An aggregate whose state is derived from its event stream
///
/// # Examples
///
/// ```rust
/// use cim_eventsource::{
///     AggregateCore, AggregateRoot, DomainEvent, Event, EventHandlers,
/// };
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct UserCreated {
///     name: String,
/// }
///
/// impl DomainEvent for UserCreated {}
///
/// #[derive(Debug, Clone)]
/// struct User {
///     core: AggregateCore,
///     name: Option<String>,
/// }
///
/// impl AggregateRoot for User {
///     const CATEGORY: &'static str = "user";
///
///     fn from_core(core: AggregateCore) -> Self {
///         Self { core, name: None }
///     }
///
///     fn core(&self) -> &AggregateCore {
///         &self.core
///     }
///
///     fn core_mut(&mut self) -> &mut AggregateCore {
///         &mut self.core
///     }
///
///     fn register_handlers(handlers: &mut EventHandlers<Self>) {
///         handlers.on(|user: &mut User, event: &Event<UserCreated>| {
///             user.name = Some(event.data.name.clone());
///             Ok(())
///         });
///     }
/// }
///
/// let mut user = User::new("42");
/// user.apply(UserCreated { name: "Ivan".to_string() });
///
/// assert_eq!(user.stream_id(), "user_42");
/// assert_eq!(user.uncommitted_events().len(), 1);
/// assert_eq!(user.version(), 0);
/// assert!(user.name.is_none());
/// ```
#[async_trait]
pub trait AggregateRoot: Clone + Send + Sync + Sized + 'static {
    /// Stream category; the stream id is `{CATEGORY}_{id}`
    const CATEGORY: &'static str;

    /// Build an instance around a core, with empty domain state
    fn from_core(core: AggregateCore) -> Self;

    /// Shared bookkeeping
    fn core(&self) -> &AggregateCore;

    /// Shared bookkeeping, mutably
    fn core_mut(&mut self) -> &mut AggregateCore;

    /// Declare the event handlers of this aggregate type
    fn register_handlers(handlers: &mut EventHandlers<Self>);

    /// Fresh, unbound instance
    fn new(id: impl Into<String>) -> Self {
        Self::from_core(AggregateCore::new(Self::CATEGORY, id))
    }

    /// Caller-supplied identity
    fn id(&self) -> &str {
        &self.core().id
    }

    /// Stream this aggregate is stored in
    fn stream_id(&self) -> &str {
        &self.core().stream_id
    }

    /// Number of events settled into this instance
    fn version(&self) -> u64 {
        self.core().version
    }

    /// Revision of the last event observed in the stream, `None` before any
    fn revision(&self) -> Option<u64> {
        self.core().revision
    }

    /// Token the next append must be made against
    fn expected_revision(&self) -> ExpectedRevision {
        ExpectedRevision::from_current(self.revision())
    }

    /// Whether publish and commit have a store to append to
    fn is_bound(&self) -> bool {
        self.core().publisher.is_some()
    }

    /// Queue a new event; state is untouched until commit
    fn apply<E: DomainEvent>(&mut self, data: E) {
        self.apply_event(AnyEvent::new(data));
    }

    /// Queue an already built event
    fn apply_event(&mut self, event: AnyEvent) {
        self.core_mut().pending.push(event);
    }

    /// Pending events, oldest first
    fn uncommitted_events(&self) -> &[AnyEvent] {
        &self.core().pending
    }

    /// Drop every pending event without handling or appending it
    fn uncommit(&mut self) {
        self.core_mut().pending.clear();
    }

    /// Run the handlers for one event, then advance `version` and `revision`
    async fn apply_from_history(&mut self, event: &AnyEvent) -> DomainResult<()> {
        let handlers = EventHandlers::<Self>::resolve();
        handlers.dispatch(self, event).await?;

        let core = self.core_mut();
        core.version += 1;
        if let Some(revision) = event.revision() {
            core.revision = Some(revision);
        }
        Ok(())
    }

    /// Replay a batch of events in order
    async fn load_from_history(&mut self, events: Vec<AnyEvent>) -> DomainResult<()> {
        for event in &events {
            self.apply_from_history(event).await?;
        }
        Ok(())
    }

    /// Settle and append the given events directly, bypassing the pending queue
    async fn publish_all(&mut self, events: Vec<AnyEvent>) -> DomainResult<Option<AppendResult>> {
        let publisher = self
            .core()
            .publisher
            .clone()
            .ok_or_else(|| DomainError::PublisherNotBound {
                stream_id: self.stream_id().to_string(),
            })?;
        settle_and_append(self, events, publisher.store().as_ref()).await
    }

    /// Settle and append a single event directly
    async fn publish<E: DomainEvent>(&mut self, data: E) -> DomainResult<Option<AppendResult>> {
        self.publish_all(vec![AnyEvent::new(data)]).await
    }

    /// Settle and append every pending event through the bound publisher
    ///
    /// With nothing pending this is a no-op, bound or not.
    async fn commit(&mut self) -> DomainResult<Option<AppendResult>> {
        if self.core().pending.is_empty() {
            return Ok(None);
        }
        let pending = self.core().pending.clone();
        let result = self.publish_all(pending).await?;
        self.uncommit();
        Ok(result)
    }
}

/// Settle `events` through the handlers, then append them
///
/// Handlers run before the append, against the token the aggregate held on
/// entry. On any failure the aggregate is restored to its state on entry.
pub(crate) async fn settle_and_append<A: AggregateRoot>(
    aggregate: &mut A,
    events: Vec<AnyEvent>,
    store: &dyn EventStore,
) -> DomainResult<Option<AppendResult>> {
    if events.is_empty() {
        return Ok(None);
    }

    let checkpoint = aggregate.clone();
    match settle(aggregate, events, store).await {
        Ok(result) => Ok(Some(result)),
        Err(err) => {
            *aggregate = checkpoint;
            Err(err)
        }
    }
}

async fn settle<A: AggregateRoot>(
    aggregate: &mut A,
    events: Vec<AnyEvent>,
    store: &dyn EventStore,
) -> DomainResult<AppendResult> {
    let expected = aggregate.expected_revision();
    let stream_id = aggregate.stream_id().to_string();

    for event in &events {
        aggregate.apply_from_history(event).await?;
    }

    let raw = events
        .iter()
        .map(AnyEvent::to_raw)
        .collect::<Result<Vec<_>, _>>()?;
    let count = raw.len();
    let result = store
        .append_to_stream(&stream_id, raw, Some(expected))
        .await?;

    aggregate.core_mut().revision = result.last_revision();
    debug!(
        stream_id = %stream_id,
        events = count,
        expected = %expected,
        next = %result.next_expected_revision,
        "Committed events"
    );
    Ok(result)
}

/// Flush the pending queue of `aggregate` to `store`
pub(crate) async fn flush_pending<A: AggregateRoot>(
    aggregate: &mut A,
    store: &dyn EventStore,
) -> DomainResult<Option<AppendResult>> {
    let pending = aggregate.core().pending.clone();
    let result = settle_and_append(aggregate, pending, store).await?;
    aggregate.uncommit();
    Ok(result)
}
