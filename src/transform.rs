// Copyright 2025 Cowboy AI, LLC.

//! Event transform registry
//!
//! Stores hand back untyped [`Event`]s. The registry maps each type tag to a
//! decoder that rebuilds the typed [`Event<E>`], keeping its position and
//! metadata. Tags with no decoder pass through untouched as
//! [`AnyEvent::Untyped`].

use crate::aggregate::AggregateRoot;
use crate::errors::{DomainError, DomainResult};
use crate::event_handler::EventHandlers;
use crate::events::{short_type_name, AnyEvent, DomainEvent, Event};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Decoder from an untyped stored event to a typed one
pub type TransformFn = Arc<dyn Fn(&Event) -> DomainResult<AnyEvent> + Send + Sync>;

/// Decode `raw` as `Event<E>`
pub fn decode_as<E: DomainEvent>(raw: &Event) -> DomainResult<AnyEvent> {
    let data: E = serde_json::from_value(raw.data.clone()).map_err(|err| {
        DomainError::EventDecodeFailed {
            event_type: raw.event_type.clone(),
            reason: err.to_string(),
        }
    })?;
    Ok(AnyEvent::typed(retag(raw, data)))
}

fn retag<E>(raw: &Event, data: E) -> Event<E> {
    Event {
        event_type: raw.event_type.clone(),
        data,
        metadata: raw.metadata.clone(),
        position: raw.position.clone(),
    }
}

/// A registry configuration entry
///
/// # Examples
///
/// ```rust
/// use cim_eventsource::{DomainEvent, TransformRegistry, Transformer};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct UserCreated {
///     name: String,
/// }
///
/// impl DomainEvent for UserCreated {}
///
/// let registry = TransformRegistry::from_transformers([
///     Transformer::event::<UserCreated>(),
///     Transformer::tagged("user.created.v1", |raw| {
///         Ok(UserCreated {
///             name: raw.data["fullName"].as_str().unwrap_or_default().to_string(),
///         })
///     }),
/// ])
/// .unwrap();
///
/// assert!(registry.contains("UserCreated"));
/// assert!(registry.contains("user.created.v1"));
/// ```
#[derive(Clone)]
pub struct Transformer {
    tag: String,
    decode: TransformFn,
}

impl Transformer {
    /// Decode events tagged with `E`'s type name straight from their payload
    pub fn event<E: DomainEvent>() -> Self {
        Self {
            tag: E::event_type().to_string(),
            decode: Arc::new(decode_as::<E>),
        }
    }

    /// Decode events tagged `tag` with a custom function
    pub fn tagged<E, F>(tag: impl Into<String>, decode: F) -> Self
    where
        E: DomainEvent,
        F: Fn(&Event) -> DomainResult<E> + Send + Sync + 'static,
    {
        Self {
            tag: tag.into(),
            decode: Arc::new(move |raw: &Event| -> DomainResult<AnyEvent> {
                Ok(AnyEvent::typed(retag(raw, decode(raw)?)))
            }),
        }
    }

    /// Tag the entry applies to
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer").field("tag", &self.tag).finish()
    }
}

struct Registration {
    decode: TransformFn,
    // Payload type an automatic registration decodes to; explicit ones have none
    payload: Option<TypeId>,
}

/// Tag to decoder mapping shared by repositories, publishers and the bridge
#[derive(Default)]
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, Registration>>,
}

impl TransformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration entries
    pub fn from_transformers(
        transformers: impl IntoIterator<Item = Transformer>,
    ) -> DomainResult<Self> {
        let registry = Self::new();
        for transformer in transformers {
            registry.register(transformer.tag, transformer.decode)?;
        }
        Ok(registry)
    }

    /// Register a decoder for `tag`, replacing any earlier one
    pub fn register(&self, tag: impl Into<String>, decode: TransformFn) -> DomainResult<()> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(DomainError::InvalidTransform {
                tag,
                reason: "tag must not be blank".to_string(),
            });
        }

        self.transforms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                tag,
                Registration {
                    decode,
                    payload: None,
                },
            );
        Ok(())
    }

    /// Register `E` under its own type name
    pub fn register_event<E: DomainEvent>(&self) {
        self.transforms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                E::event_type().to_string(),
                Registration {
                    decode: Arc::new(decode_as::<E>),
                    payload: Some(TypeId::of::<E>()),
                },
            );
    }

    /// Register a configuration entry
    pub fn register_transformer(&self, transformer: Transformer) -> DomainResult<()> {
        self.register(transformer.tag, transformer.decode)
    }

    /// Register every event type `A` has a handler for
    ///
    /// Tags that already have a decoder keep it. A tag already decoding to a
    /// different payload type of the same name is rejected with
    /// [`DomainError::InvalidTransform`] and nothing is registered.
    pub fn register_handlers<A: AggregateRoot>(&self) -> DomainResult<()> {
        let handlers = EventHandlers::<A>::resolve();
        let mut transforms = self
            .transforms
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for (tag, payload, _) in handlers.transforms() {
            let claimed = transforms.get(tag).and_then(|existing| existing.payload);
            if claimed.is_some_and(|claimed| claimed != payload) {
                return Err(DomainError::InvalidTransform {
                    tag: tag.to_string(),
                    reason: format!(
                        "{} handles a payload type that differs from the one already registered",
                        short_type_name::<A>()
                    ),
                });
            }
        }

        for (tag, payload, decode) in handlers.transforms() {
            transforms
                .entry(tag.to_string())
                .or_insert_with(|| Registration {
                    decode: Arc::new(decode),
                    payload: Some(payload),
                });
        }
        Ok(())
    }

    /// Decoder registered for `tag`
    pub fn get(&self, tag: &str) -> Option<TransformFn> {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .map(|registration| registration.decode.clone())
    }

    /// Whether `tag` has a decoder
    pub fn contains(&self, tag: &str) -> bool {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(tag)
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    /// Decode a stored event, passing unknown tags through untyped
    pub fn decode(&self, raw: Event) -> DomainResult<AnyEvent> {
        match self.get(&raw.event_type) {
            Some(decode) => decode(&raw),
            None => Ok(AnyEvent::untyped(raw)),
        }
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
