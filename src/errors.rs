// Copyright 2025 Cowboy AI, LLC.

//! Error types for aggregate, repository and registry operations

use crate::infrastructure::event_store::{EventStoreError, ExpectedRevision};
use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Failure reported by the event store, surfaced unchanged
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    /// A transform entry is malformed
    #[error("Invalid transform for '{tag}': {reason}")]
    InvalidTransform {
        /// Tag the entry was registered under
        tag: String,
        /// What is wrong with it
        reason: String,
    },

    /// A registered transform rejected a stored payload
    #[error("Failed to decode {event_type}: {reason}")]
    EventDecodeFailed {
        /// Tag of the stored event
        event_type: String,
        /// Decoder message
        reason: String,
    },

    /// The aggregate has no publish path
    #[error("Aggregate {stream_id} is not bound to a publisher")]
    PublisherNotBound {
        /// Stream of the unbound aggregate
        stream_id: String,
    },

    /// Invalid operation
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Reason why the operation is invalid
        reason: String,
    },

    /// Invariant violation
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Business rule violation
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation {
        /// Description of the violated rule
        rule: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Already exists error (generic)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Generic domain error
    #[error("Domain error: {0}")]
    Generic(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl DomainError {
    /// Create a generic domain error
    pub fn generic(msg: impl Into<String>) -> Self {
        DomainError::Generic(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::StreamNotFound { .. })
        )
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_)
                | DomainError::InvariantViolation(_)
                | DomainError::BusinessRuleViolation { .. }
        )
    }

    /// Check if this is a concurrency error
    pub fn is_concurrency_error(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }

    /// Structured data of a concurrency conflict: stream, expected token, actual revision
    pub fn concurrency_conflict(&self) -> Option<(&str, ExpectedRevision, Option<u64>)> {
        match self {
            DomainError::EventStore(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            }) => Some((stream_id.as_str(), *expected, *actual)),
            _ => None,
        }
    }
}
