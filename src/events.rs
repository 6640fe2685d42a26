// Copyright (c) 2025 - Cowboy AI, LLC.

//! Domain events for event-sourced aggregates
//!
//! Events represent facts that have occurred in the domain. They are immutable
//! and form the basis of event sourcing. An [`Event`] carries a type tag, a
//! payload and optional metadata; once a store has accepted it, it also carries
//! its [`RecordedPosition`] in a stream.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Payload of a typed domain event
///
/// # Examples
///
/// ```rust
/// use cim_eventsource::{DomainEvent, Event};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct UserCreated {
///     name: String,
/// }
///
/// impl DomainEvent for UserCreated {}
///
/// let event = Event::new(UserCreated { name: "Ivan".to_string() });
/// assert_eq!(event.event_type, "UserCreated");
/// assert!(!event.is_recorded());
/// ```
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Type tag written to the store
    ///
    /// Defaults to the unqualified name of the implementing type.
    fn event_type() -> &'static str
    where
        Self: Sized,
    {
        short_type_name::<Self>()
    }
}

/// Unqualified name of `T`, without module path or generic arguments
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = match full.find('<') {
        Some(index) => &full[..index],
        None => full,
    };
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Position of an event once a store has accepted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedPosition {
    /// Stream the event belongs to
    pub stream_id: String,
    /// Unique event ID assigned by the store
    pub id: Uuid,
    /// Zero-based position within the stream
    pub revision: u64,
    /// When the store accepted the event
    pub created: DateTime<Utc>,
}

/// An event with a payload of type `P`
///
/// `Event` with the default payload is the untyped form produced by stores;
/// `Event<E>` for a [`DomainEvent`] `E` is the typed form handlers receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<P = serde_json::Value> {
    /// Tag identifying the event's domain meaning
    pub event_type: String,
    /// Payload, never mutated after construction
    pub data: P,
    /// Side-channel information (causation, correlation...)
    pub metadata: Option<serde_json::Value>,
    /// Present once the event was read from or appended to a store
    pub position: Option<RecordedPosition>,
}

impl<E: DomainEvent> Event<E> {
    /// Create a fresh event, tagged with `E`'s type name
    pub fn new(data: E) -> Self {
        Self {
            event_type: E::event_type().to_string(),
            data,
            metadata: None,
            position: None,
        }
    }

    /// Serialize the payload into an untyped event
    pub fn to_raw(&self) -> Result<Event, serde_json::Error> {
        Ok(Event {
            event_type: self.event_type.clone(),
            data: serde_json::to_value(&self.data)?,
            metadata: self.metadata.clone(),
            position: self.position.clone(),
        })
    }
}

impl Event {
    /// Create an untyped event
    pub fn raw(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: None,
            position: None,
        }
    }

    /// Copy any serializable value into an untyped event tagged with its type name
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::raw(short_type_name::<T>(), serde_json::to_value(value)?))
    }
}

impl<P> Event<P> {
    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether all position fields are present
    pub fn is_recorded(&self) -> bool {
        self.position.is_some()
    }

    /// Stream the event was recorded in
    pub fn stream_id(&self) -> Option<&str> {
        self.position.as_ref().map(|p| p.stream_id.as_str())
    }

    /// Store-assigned ID
    pub fn id(&self) -> Option<Uuid> {
        self.position.as_ref().map(|p| p.id)
    }

    /// Position within the stream
    pub fn revision(&self) -> Option<u64> {
        self.position.as_ref().map(|p| p.revision)
    }

    /// Store acceptance time
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.position.as_ref().map(|p| p.created)
    }
}

/// Object-safe view of a typed event, implemented for every `Event<E>`
pub trait ErasedEvent: Any + Send + Sync + fmt::Debug {
    /// Type tag
    fn event_type(&self) -> &str;
    /// `TypeId` of the payload
    fn payload_type_id(&self) -> TypeId;
    /// Recorded position
    fn position(&self) -> Option<&RecordedPosition>;
    /// Metadata
    fn metadata(&self) -> Option<&serde_json::Value>;
    /// Serialize into the untyped form
    fn to_raw(&self) -> Result<Event, serde_json::Error>;
    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl<E: DomainEvent> ErasedEvent for Event<E> {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn payload_type_id(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn position(&self) -> Option<&RecordedPosition> {
        self.position.as_ref()
    }

    fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    fn to_raw(&self) -> Result<Event, serde_json::Error> {
        Event::to_raw(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An event that is either strongly typed or passed through untyped
///
/// Decoding a stored record produces the `Typed` variant when a transform is
/// registered for its tag, and falls back to `Untyped` otherwise.
#[derive(Debug, Clone)]
pub enum AnyEvent {
    /// A decoded [`Event<E>`] for some [`DomainEvent`] `E`
    Typed(Arc<dyn ErasedEvent>),
    /// A record with no registered transform
    Untyped(Event),
}

impl AnyEvent {
    /// Wrap a fresh typed payload
    pub fn new<E: DomainEvent>(data: E) -> Self {
        Self::typed(Event::new(data))
    }

    /// Wrap a typed event
    pub fn typed<E: DomainEvent>(event: Event<E>) -> Self {
        AnyEvent::Typed(Arc::new(event))
    }

    /// Wrap an untyped event
    pub fn untyped(event: Event) -> Self {
        AnyEvent::Untyped(event)
    }

    /// Type tag
    pub fn event_type(&self) -> &str {
        match self {
            AnyEvent::Typed(event) => event.event_type(),
            AnyEvent::Untyped(event) => &event.event_type,
        }
    }

    /// `TypeId` of the payload for typed events
    pub fn payload_type_id(&self) -> Option<TypeId> {
        match self {
            AnyEvent::Typed(event) => Some(event.payload_type_id()),
            AnyEvent::Untyped(_) => None,
        }
    }

    /// Whether a transform produced this event
    pub fn is_typed(&self) -> bool {
        matches!(self, AnyEvent::Typed(_))
    }

    /// Borrow as `Event<E>` if this is a typed event of payload `E`
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&Event<E>> {
        match self {
            AnyEvent::Typed(event) => event.as_any().downcast_ref::<Event<E>>(),
            AnyEvent::Untyped(_) => None,
        }
    }

    /// Borrow the untyped form, if no transform applied
    pub fn as_untyped(&self) -> Option<&Event> {
        match self {
            AnyEvent::Typed(_) => None,
            AnyEvent::Untyped(event) => Some(event),
        }
    }

    /// Serialize into the untyped form written to stores
    pub fn to_raw(&self) -> Result<Event, serde_json::Error> {
        match self {
            AnyEvent::Typed(event) => event.to_raw(),
            AnyEvent::Untyped(event) => Ok(event.clone()),
        }
    }

    /// Recorded position
    pub fn position(&self) -> Option<&RecordedPosition> {
        match self {
            AnyEvent::Typed(event) => event.position(),
            AnyEvent::Untyped(event) => event.position.as_ref(),
        }
    }

    /// Metadata
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        match self {
            AnyEvent::Typed(event) => event.metadata(),
            AnyEvent::Untyped(event) => event.metadata.as_ref(),
        }
    }

    /// Position within the stream
    pub fn revision(&self) -> Option<u64> {
        self.position().map(|p| p.revision)
    }

    /// Stream the event was recorded in
    pub fn stream_id(&self) -> Option<&str> {
        self.position().map(|p| p.stream_id.as_str())
    }
}

impl<E: DomainEvent> From<Event<E>> for AnyEvent {
    fn from(event: Event<E>) -> Self {
        AnyEvent::typed(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CatFed {
        portion: u32,
    }

    impl DomainEvent for CatFed {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct CatRenamed {
        name: String,
    }

    impl DomainEvent for CatRenamed {
        fn event_type() -> &'static str {
            "cat.renamed.v2"
        }
    }

    #[test]
    fn test_type_name_defaults_to_payload_name() {
        let event = Event::new(CatFed { portion: 2 });
        assert_eq!(event.event_type, "CatFed");
        assert!(event.position.is_none());
        assert!(!event.is_recorded());
    }

    #[test]
    fn test_type_name_override() {
        let event = Event::new(CatRenamed { name: "Tom".into() });
        assert_eq!(event.event_type, "cat.renamed.v2");
    }

    #[test]
    fn test_short_type_name_strips_generics() {
        assert_eq!(short_type_name::<Vec<CatFed>>(), "Vec");
        assert_eq!(short_type_name::<CatFed>(), "CatFed");
    }

    #[test]
    fn test_from_value_copies_payload() {
        #[derive(Serialize)]
        struct TestEvent {
            test_id: String,
        }

        let event = Event::from_value(&TestEvent { test_id: "964".into() }).unwrap();
        assert_eq!(event.event_type, "TestEvent");
        assert_eq!(event.data["test_id"], "964");
    }

    #[test]
    fn test_any_event_downcast() {
        let any = AnyEvent::new(CatFed { portion: 1 });

        assert!(any.is_typed());
        assert_eq!(any.event_type(), "CatFed");
        assert_eq!(any.payload_type_id(), Some(TypeId::of::<CatFed>()));
        assert_eq!(any.downcast_ref::<CatFed>().unwrap().data, CatFed { portion: 1 });
        assert!(any.downcast_ref::<CatRenamed>().is_none());
        assert!(any.as_untyped().is_none());
    }

    #[test]
    fn test_any_event_to_raw_keeps_metadata() {
        let any: AnyEvent = Event::new(CatFed { portion: 3 })
            .with_metadata(json!({"correlation_id": "abc"}))
            .into();

        let raw = any.to_raw().unwrap();
        assert_eq!(raw.event_type, "CatFed");
        assert_eq!(raw.data, json!({"portion": 3}));
        assert_eq!(raw.metadata, Some(json!({"correlation_id": "abc"})));
    }

    #[test]
    fn test_untyped_passthrough() {
        let any = AnyEvent::untyped(Event::raw("Unknown", json!({})));
        assert!(!any.is_typed());
        assert_eq!(any.payload_type_id(), None);
        assert_eq!(any.event_type(), "Unknown");
    }
}
