// Copyright (c) 2025 - Cowboy AI, Inc.
//! Message Queue Boundary
//!
//! At-least-once work queue semantics behind the [`MessageQueue`] trait:
//! `receive` long-polls for a batch, `delete` removes one message after
//! terminal handling. A message that is received but never deleted is
//! redelivered once its visibility window expires.
//!
//! [`JetStreamQueue`] maps these semantics onto a NATS JetStream pull
//! consumer: work-queue retention makes acknowledgment the delete
//! operation, and the consumer's `ack_wait` is the visibility timeout.

use async_nats::jetstream::{self, consumer::PullConsumer};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::errors::{TransportError, TransportResult};

/// Opaque handle for deleting a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(Uuid);

impl ReceiptHandle {
    /// Create a fresh handle
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ReceiptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raw message pulled from the queue
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Transport-level message id (for logging)
    pub id: String,

    /// Receipt for deleting this delivery
    pub receipt: ReceiptHandle,

    /// Opaque payload
    pub body: Vec<u8>,
}

/// Work queue consumed by the provisioning loop
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Pull up to `max_messages`, waiting up to `wait` for the first one
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> TransportResult<Vec<QueueMessage>>;

    /// Delete one received message.
    ///
    /// Must only be called after the message reached a terminal outcome.
    async fn delete(&self, receipt: &ReceiptHandle) -> TransportResult<()>;
}

// A shared queue is still a queue; callers keep a handle for inspection
// while the worker owns its own.
#[async_trait]
impl<Q: MessageQueue> MessageQueue for Arc<Q> {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> TransportResult<Vec<QueueMessage>> {
        (**self).receive(max_messages, wait).await
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> TransportResult<()> {
        (**self).delete(receipt).await
    }
}

/// NATS JetStream implementation of [`MessageQueue`]
pub struct JetStreamQueue {
    consumer: PullConsumer,
    // Deliveries held between receive and delete, keyed by receipt
    pending: Mutex<HashMap<ReceiptHandle, jetstream::Message>>,
}

impl JetStreamQueue {
    /// Connect to NATS and set up the request stream and its durable
    /// pull consumer.
    ///
    /// Idempotent: the stream and consumer are created if absent, attached
    /// to otherwise.
    pub async fn connect(config: &QueueConfig) -> TransportResult<Self> {
        let options = async_nats::ConnectOptions::new().name(&config.client_name);
        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!(servers = ?config.servers, "Connected to NATS");

        let context = jetstream::new(client);

        // Work-queue retention deletes a message on acknowledgment, which
        // is exactly the SQS-style delete contract
        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.subject.clone()],
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &config.consumer_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(config.consumer_name.clone()),
                    // Visibility timeout: unacknowledged messages are
                    // redelivered after this window
                    ack_wait: config.visibility_timeout,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!(
            stream = %config.stream_name,
            consumer = %config.consumer_name,
            "Attached to request stream"
        );

        Ok(Self {
            consumer,
            pending: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl MessageQueue for JetStreamQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> TransportResult<Vec<QueueMessage>> {
        let mut batch = self
            .consumer
            .batch()
            .max_messages(max_messages)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| TransportError::Receive(e.to_string()))?;

        let mut messages = Vec::new();
        while let Some(message) = batch.next().await {
            let message = message.map_err(|e| TransportError::Receive(e.to_string()))?;

            let receipt = ReceiptHandle::new();
            let id = message
                .info()
                .map(|info| format!("{}:{}", info.stream_sequence, info.delivered))
                .unwrap_or_else(|_| receipt.to_string());

            messages.push(QueueMessage {
                id,
                receipt: receipt.clone(),
                body: message.payload.to_vec(),
            });

            self.pending.lock().unwrap().insert(receipt, message);
        }

        debug!(count = messages.len(), "Received message batch");
        Ok(messages)
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> TransportResult<()> {
        let message = self
            .pending
            .lock()
            .unwrap()
            .remove(receipt)
            .ok_or_else(|| TransportError::Acknowledge(format!("unknown receipt {receipt}")))?;

        message
            .ack()
            .await
            .map_err(|e| TransportError::Acknowledge(e.to_string()))?;

        debug!(%receipt, "Message acknowledged and deleted");
        Ok(())
    }
}
