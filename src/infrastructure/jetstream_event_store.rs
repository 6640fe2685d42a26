// Copyright 2025 Cowboy AI, LLC.

//! JetStream-based event store
//!
//! One JetStream stream holds every event stream; the events of stream `id`
//! are the messages on subject `{subject_prefix}.{id}`, each carrying a
//! [`StoredRecord`]. Appends are guarded by JetStream's expected last subject
//! sequence, so a concurrent writer makes the append fail instead of
//! interleaving.

use crate::events::Event;
use crate::infrastructure::event_store::{
    AppendResult, EventListener, EventReadStream, EventStore, EventStoreError, ExpectedRevision,
    StoredRecord, Subscription,
};
use crate::infrastructure::nats_client::{NatsClient, NatsConfig};
use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy};
use async_nats::jetstream::context::{Publish, PublishError, PublishErrorKind};
use async_nats::jetstream::stream::{
    self as js_stream, LastRawMessageErrorKind, RetentionPolicy, StorageType,
};
use async_nats::jetstream::Context as JetStreamContext;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Where JetStream keeps the stream's messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// On disk
    File,
    /// In server memory
    Memory,
}

impl From<StorageKind> for StorageType {
    fn from(kind: StorageKind) -> Self {
        match kind {
            StorageKind::File => StorageType::File,
            StorageKind::Memory => StorageType::Memory,
        }
    }
}

/// Configuration for JetStream event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetStreamConfig {
    /// Name of the JetStream stream to use
    pub stream_name: String,
    /// Subject patterns for the stream (e.g., "events.>")
    pub stream_subjects: Vec<String>,
    /// Prefix for event subjects (e.g., "events")
    pub subject_prefix: String,
    /// Storage backing the stream
    pub storage: StorageKind,
    /// How often an unconditional append retries after losing a race
    pub max_append_retries: u32,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            stream_name: "event-store".to_string(),
            stream_subjects: vec!["events.>".to_string()],
            subject_prefix: "events".to_string(),
            storage: StorageKind::File,
            max_append_retries: 3,
        }
    }
}

/// JetStream-based event store
#[derive(Debug, Clone)]
pub struct JetStreamEventStore {
    jetstream: JetStreamContext,
    stream: js_stream::Stream,
    subject_prefix: String,
    max_append_retries: u32,
}

/// Check that a stream id can be used as a single NATS subject token
pub fn validate_stream_id(stream_id: &str) -> Result<(), EventStoreError> {
    if stream_id.is_empty() {
        return Err(EventStoreError::InvalidStreamId(
            "stream id must not be empty".to_string(),
        ));
    }
    if let Some(c) = stream_id
        .chars()
        .find(|c| matches!(c, '.' | '*' | '>') || c.is_whitespace())
    {
        return Err(EventStoreError::InvalidStreamId(format!(
            "{stream_id:?} contains {c:?}"
        )));
    }
    Ok(())
}

fn decode_record(payload: &[u8]) -> Result<Event, EventStoreError> {
    serde_json::from_slice::<StoredRecord>(payload)
        .map(StoredRecord::into_event)
        .map_err(|e| EventStoreError::InvalidEventData(e.to_string()))
}

impl JetStreamEventStore {
    /// Create the store on an existing JetStream context, creating the stream if needed
    pub async fn new(
        jetstream: JetStreamContext,
        config: JetStreamConfig,
    ) -> Result<Self, EventStoreError> {
        let stream_config = js_stream::Config {
            name: config.stream_name.clone(),
            subjects: config.stream_subjects.clone(),
            retention: RetentionPolicy::Limits,
            storage: config.storage.into(),
            ..Default::default()
        };

        let stream = jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| {
                EventStoreError::ConnectionError(format!("Failed to create stream: {}", e))
            })?;

        info!(
            stream = %config.stream_name,
            subject_prefix = %config.subject_prefix,
            "JetStream event store ready"
        );

        Ok(Self {
            jetstream,
            stream,
            subject_prefix: config.subject_prefix,
            max_append_retries: config.max_append_retries,
        })
    }

    /// Connect to NATS and create the store
    pub async fn connect(
        nats: NatsConfig,
        config: JetStreamConfig,
    ) -> Result<Self, EventStoreError> {
        let client = NatsClient::connect(nats).await?;
        if !client.is_connected().await {
            return Err(EventStoreError::ConnectionError(format!(
                "NATS server at {} did not answer",
                client.config().url
            )));
        }
        Self::new(client.jetstream().clone(), config).await
    }

    /// Subject holding the events of `stream_id`
    pub fn subject(&self, stream_id: &str) -> Result<String, EventStoreError> {
        validate_stream_id(stream_id)?;
        Ok(format!("{}.{}", self.subject_prefix, stream_id))
    }

    /// Subject sequence and record of the last event on `subject`
    async fn last_record(
        &self,
        subject: &str,
    ) -> Result<Option<(u64, StoredRecord)>, EventStoreError> {
        match self.stream.get_last_raw_message_by_subject(subject).await {
            Ok(message) => {
                let record: StoredRecord = serde_json::from_slice(&message.payload)
                    .map_err(|e| EventStoreError::InvalidEventData(e.to_string()))?;
                Ok(Some((message.sequence, record)))
            }
            Err(e) if e.kind() == LastRawMessageErrorKind::NoMessageFound => Ok(None),
            Err(e) => Err(EventStoreError::StorageError(format!(
                "Failed to get last message: {}",
                e
            ))),
        }
    }

    async fn current_revision(&self, subject: &str) -> Option<u64> {
        self.last_record(subject)
            .await
            .ok()
            .flatten()
            .map(|(_, record)| record.revision)
    }

    async fn consumer(
        &self,
        filter_subject: String,
        deliver_policy: DeliverPolicy,
    ) -> Result<pull::Stream, EventStoreError> {
        let consumer = self
            .stream
            .create_consumer(pull::Config {
                durable_name: None,
                deliver_policy,
                ack_policy: AckPolicy::None,
                filter_subject,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                EventStoreError::StorageError(format!("Failed to create consumer: {}", e))
            })?;

        consumer
            .messages()
            .await
            .map_err(|e| EventStoreError::StorageError(format!("Failed to get messages: {}", e)))
    }

    async fn subscribe(
        &self,
        filter_subject: String,
        listener: EventListener,
    ) -> Result<Subscription, EventStoreError> {
        let mut messages = self.consumer(filter_subject.clone(), DeliverPolicy::New).await?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    message = messages.next() => match message {
                        Some(Ok(message)) => match decode_record(&message.payload) {
                            Ok(event) => listener(event),
                            Err(e) => warn!(subject = %message.subject, error = %e, "Skipping undecodable event"),
                        },
                        Some(Err(e)) => warn!(subject = %filter_subject, error = %e, "Subscription message error"),
                        None => break,
                    },
                }
            }
        });

        Ok(Subscription::new(shutdown_tx, task))
    }

    /// Publish encoded records one by one, each expecting the previous as last on the subject
    ///
    /// A rejection reports how many records were already stored.
    async fn publish_chain(
        &self,
        subject: &str,
        mut subject_sequence: u64,
        records: Vec<(String, Bytes)>,
    ) -> Result<(), (usize, PublishError)> {
        for (index, (message_id, payload)) in records.into_iter().enumerate() {
            let publish = Publish::build()
                .payload(payload)
                .message_id(message_id)
                .expected_last_subject_sequence(subject_sequence);

            let ack = self
                .jetstream
                .send_publish(subject.to_string(), publish)
                .await
                .map_err(|e| (index, e))?
                .await
                .map_err(|e| (index, e))?;

            subject_sequence = ack.sequence;
        }
        Ok(())
    }
}

fn encode_records(
    stream_id: &str,
    first_revision: u64,
    events: &[Event],
) -> Result<Vec<(String, Bytes)>, EventStoreError> {
    events
        .iter()
        .zip(first_revision..)
        .map(|(event, revision)| {
            let record = StoredRecord::assign(stream_id, revision, event.clone());
            let payload = serde_json::to_vec(&record)?;
            Ok((record.id.to_string(), Bytes::from(payload)))
        })
        .collect()
}

#[async_trait]
impl EventStore for JetStreamEventStore {
    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<Event>,
        expected_revision: Option<ExpectedRevision>,
    ) -> Result<AppendResult, EventStoreError> {
        let subject = self.subject(stream_id)?;
        let expected = expected_revision.unwrap_or(ExpectedRevision::Any);
        let mut attempt = 0;

        loop {
            let last = self.last_record(&subject).await?;
            let current = last.as_ref().map(|(_, record)| record.revision);
            if !expected.is_satisfied_by(current) {
                return Err(EventStoreError::conflict(stream_id, expected, current));
            }
            if events.is_empty() {
                return Ok(AppendResult::at(current));
            }

            let subject_sequence = last.as_ref().map_or(0, |(sequence, _)| *sequence);
            let first_revision = current.map_or(0, |revision| revision + 1);
            let records = encode_records(stream_id, first_revision, &events)?;
            let last_revision = first_revision + records.len() as u64 - 1;

            match self.publish_chain(&subject, subject_sequence, records).await {
                Ok(()) => {
                    debug!(
                        stream_id = %stream_id,
                        count = events.len(),
                        revision = last_revision,
                        "Appended events"
                    );
                    return Ok(AppendResult::at(Some(last_revision)));
                }
                Err((0, e))
                    if e.kind() == PublishErrorKind::WrongLastSequence
                        && expected == ExpectedRevision::Any
                        && attempt < self.max_append_retries =>
                {
                    attempt += 1;
                    debug!(stream_id = %stream_id, attempt, "Retrying unconditional append");
                }
                Err((_, e)) if e.kind() == PublishErrorKind::WrongLastSequence => {
                    let actual = self.current_revision(&subject).await;
                    return Err(EventStoreError::conflict(stream_id, expected, actual));
                }
                Err((_, e)) => {
                    return Err(EventStoreError::StorageError(format!(
                        "Failed to publish: {}",
                        e
                    )))
                }
            }
        }
    }

    async fn read_from_start(&self, stream_id: &str) -> Result<EventReadStream, EventStoreError> {
        let subject = self.subject(stream_id)?;
        let last_revision = match self.last_record(&subject).await? {
            Some((_, record)) => record.revision,
            None => return Err(EventStoreError::stream_not_found(stream_id)),
        };

        let messages = self.consumer(subject, DeliverPolicy::All).await?;
        debug!(stream_id = %stream_id, last_revision, "Reading stream");

        let events = stream::unfold(Some(messages), move |messages| async move {
            let mut messages = messages?;
            match messages.next().await {
                Some(Ok(message)) => {
                    let item = decode_record(&message.payload);
                    let finished = match &item {
                        Ok(event) => event.revision() >= Some(last_revision),
                        Err(_) => true,
                    };
                    Some((item, if finished { None } else { Some(messages) }))
                }
                Some(Err(e)) => Some((
                    Err(EventStoreError::StorageError(format!(
                        "Failed to read message: {}",
                        e
                    ))),
                    None,
                )),
                None => None,
            }
        });

        Ok(events.boxed())
    }

    async fn subscribe_to_stream(
        &self,
        stream_id: &str,
        listener: EventListener,
    ) -> Result<Subscription, EventStoreError> {
        let subject = self.subject(stream_id)?;
        let subscription = self.subscribe(subject, listener).await?;
        debug!(
            stream_id = %stream_id,
            subscription_id = %subscription.id(),
            "Subscribed to stream"
        );
        Ok(subscription)
    }

    async fn subscribe_to_all(&self, listener: EventListener) -> Result<Subscription, EventStoreError> {
        let subscription = self
            .subscribe(format!("{}.>", self.subject_prefix), listener)
            .await?;
        debug!(subscription_id = %subscription.id(), "Subscribed to all streams");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = JetStreamConfig::default();
        assert_eq!(config.stream_name, "event-store");
        assert_eq!(config.subject_prefix, "events");
        assert_eq!(config.storage, StorageKind::File);
        assert_eq!(config.max_append_retries, 3);
    }

    #[test]
    fn test_config_deserializes_storage_kind() {
        let config: JetStreamConfig =
            serde_json::from_str(r#"{"stream_name": "tests", "storage": "memory"}"#).unwrap();
        assert_eq!(config.stream_name, "tests");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(StorageType::from(config.storage), StorageType::Memory);
    }

    #[test_case("user_42" => true)]
    #[test_case("user-42" => true)]
    #[test_case("" => false)]
    #[test_case("user.42" => false)]
    #[test_case("user_*" => false)]
    #[test_case("user_>" => false)]
    #[test_case("user 42" => false)]
    fn test_stream_id_validation(stream_id: &str) -> bool {
        validate_stream_id(stream_id).is_ok()
    }

    #[test]
    fn test_decode_record_rejects_garbage() {
        assert!(matches!(
            decode_record(b"not json"),
            Err(EventStoreError::InvalidEventData(_))
        ));

        let record = StoredRecord::assign(
            "user_1",
            0,
            Event::raw("UserCreated", serde_json::json!({"name": "Ivan"})),
        );
        let event = decode_record(&serde_json::to_vec(&record).unwrap()).unwrap();
        assert_eq!(event.revision(), Some(0));
        assert_eq!(event.stream_id(), Some("user_1"));
    }
}
