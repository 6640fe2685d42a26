// Copyright 2025 Cowboy AI, LLC.

//! NATS connection used by the JetStream event store

use crate::infrastructure::event_store::EventStoreError;
use async_nats::jetstream::{self, Context as JetStreamContext};
use async_nats::{Client, ConnectOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when working with NATS
#[derive(Debug, Error)]
pub enum NatsError {
    /// Failed to establish connection to NATS server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<NatsError> for EventStoreError {
    fn from(err: NatsError) -> Self {
        EventStoreError::ConnectionError(err.to_string())
    }
}

/// Configuration for NATS client connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,

    /// Optional username for authentication
    pub user: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// Whether TLS is required
    pub tls_required: bool,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Maximum reconnect attempts (0 = infinite)
    pub max_reconnects: usize,

    /// JetStream domain (optional)
    pub jetstream_domain: Option<String>,

    /// JetStream API prefix (optional, ignored when a domain is set)
    pub jetstream_prefix: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            user: None,
            password: None,
            tls_required: false,
            connection_timeout_secs: 10,
            max_reconnects: 0,
            jetstream_domain: None,
            jetstream_prefix: None,
        }
    }
}

impl NatsConfig {
    /// Reject configurations no client can be created from
    pub fn validate(&self) -> Result<(), NatsError> {
        if self.url.trim().is_empty() {
            return Err(NatsError::ConfigurationError(
                "NATS url is required".to_string(),
            ));
        }
        if self.user.is_some() != self.password.is_some() {
            return Err(NatsError::ConfigurationError(
                "user and password must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// NATS client wrapper with JetStream support
#[derive(Debug, Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: JetStreamContext,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS server with the provided configuration
    pub async fn connect(config: NatsConfig) -> Result<Self, NatsError> {
        config.validate()?;

        let mut options = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Connected => info!("NATS connected"),
                    async_nats::Event::Disconnected => warn!("NATS disconnected"),
                    async_nats::Event::ClientError(err) => warn!(error = %err, "NATS client error"),
                    other => info!(event = %other, "NATS connection event"),
                }
            });

        if config.max_reconnects > 0 {
            options = options.max_reconnects(config.max_reconnects);
        }

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }

        if config.tls_required {
            options = options.require_tls(true);
        }

        let client = options.connect(config.url.as_str()).await.map_err(|e| {
            NatsError::ConnectionFailed(format!("Failed to connect to {}: {}", config.url, e))
        })?;

        let jetstream = match (&config.jetstream_domain, &config.jetstream_prefix) {
            (Some(domain), _) => jetstream::with_domain(client.clone(), domain),
            (None, Some(prefix)) => jetstream::with_prefix(client.clone(), prefix),
            (None, None) => jetstream::new(client.clone()),
        };

        info!(url = %config.url, "Connected to NATS");
        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Get the JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Check if the client is connected
    pub async fn is_connected(&self) -> bool {
        self.client.flush().await.is_ok()
    }
}
