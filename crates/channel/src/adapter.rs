// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of StreamBridge.
//
// StreamBridge is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// StreamBridge is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with StreamBridge. If not, see <https://www.gnu.org/licenses/>.

//! BrokerAdapter trait and adapter error types
//!
//! ## Purpose
//! Defines the common publish/subscribe contract both broker backends
//! implement, so the delivery pipeline addresses "a broker" and destination
//! parsing alone selects the concrete variant.
//!
//! ## Delivery-Semantics Mapping
//! - The log-broker adapter exposes `(topic, partition, offset)` coordinates
//!   and commits offsets only after the handler reports success
//! - The queue adapter exposes `(queue | exchange + routing key)` and
//!   settles every delivery explicitly: ack on success, nack-without-requeue
//!   once the message has been handed to failure recovery

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use streambridge_core::{Destination, Protocol, WireMessage};
use thiserror::Error;

/// Errors that can occur during adapter operations.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// No live connection to the backend; fail fast, the caller owns retry.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The backend explicitly refused the message (unroutable, missing
    /// exchange, negative confirm).
    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// Backend-specific failure that is neither a refusal nor a dead
    /// connection.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Message could not be converted to or from the backend's wire types.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Adapter has been closed.
    #[error("Adapter closed: {0}")]
    Closed(String),
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Backend confirmation for one accepted publish.
#[derive(Debug, Clone, Default)]
pub struct AckInfo {
    /// Destination the message landed on.
    pub destination: String,
    /// Partition the log broker assigned, when applicable.
    pub partition: Option<i32>,
    /// Offset the log broker assigned, when applicable.
    pub offset: Option<i64>,
    /// Whether the backend positively confirmed delivery (false when
    /// confirmations are disabled and only the local send completed).
    pub confirmed: bool,
}

/// Per-publish options the pipeline passes through to the backend.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Routing key for exchange-based publishing; for the log broker this
    /// becomes the partition key.
    pub routing_key: Option<String>,
    /// Mark the message persistent where the backend distinguishes.
    pub persistent: bool,
    /// Per-message expiration used for TTL-delayed retry on the queue
    /// backend; ignored by the log broker.
    pub expiration: Option<std::time::Duration>,
    /// When publishing to a retry queue: the origin queue expired messages
    /// dead-letter back to. The queue adapter declares the target with a
    /// dead-letter route to this name; ignored by the log broker.
    pub retry_origin: Option<String>,
}

/// Broker-side coordinates of one inbound message.
#[derive(Debug, Clone, Default)]
pub struct MessageCoordinates {
    /// Log-broker partition.
    pub partition: Option<i32>,
    /// Log-broker offset.
    pub offset: Option<i64>,
    /// Queue-broker delivery tag.
    pub delivery_tag: Option<u64>,
}

/// One message arriving from a backend, before decoding.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Source the subscription was registered on.
    pub source: Destination,
    /// Raw wire form (body + plaintext headers).
    pub wire: WireMessage,
    /// Backend coordinates, for error wrapping and audit logs.
    pub coordinates: MessageCoordinates,
}

/// What the pipeline's handler decided about one inbound message; drives
/// how the adapter settles it with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processed successfully: commit the offset / ack the delivery.
    Processed,
    /// Handed to failure recovery, which has durably captured it: settle
    /// without redelivery (commit on the log broker, nack-without-requeue
    /// on the queue broker).
    Recovered,
    /// Recovery hand-off itself failed: leave the message to the broker's
    /// own redelivery (no commit / nack with requeue).
    Failed,
}

/// Per-subscription message callback. The adapter invokes it for every
/// arriving message, in arrival order, and settles according to the
/// returned [`HandlerOutcome`].
pub type MessageHandler =
    Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, HandlerOutcome> + Send + Sync>;

/// Handle identifying one active subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// Unique id of this registration.
    pub id: String,
    /// Source name the consumer is bound to.
    pub source: String,
}

/// Point-in-time adapter counters.
#[derive(Debug, Clone, Default)]
pub struct AdapterStats {
    /// Messages accepted by the backend.
    pub published: u64,
    /// Messages delivered to handlers.
    pub consumed: u64,
    /// Deliveries settled positively (ack / commit).
    pub acked: u64,
    /// Publish or settle failures.
    pub failed: u64,
}

/// Common contract for broker backends.
///
/// ## Invariants
/// - At most one active consumer per distinct source: a second `subscribe`
///   for the same source returns the existing handle (idempotent
///   registration), never a duplicate consumer
/// - Arrival order within one partition/queue is preserved into the handler
/// - `unsubscribe` is safe to call twice
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Backend this adapter speaks to.
    fn protocol(&self) -> Protocol;

    /// Establish the backend connection. Called by the connection
    /// supervisor, never by the pipeline.
    async fn connect(&self) -> AdapterResult<()>;

    /// Whether a live connection is currently held.
    fn is_connected(&self) -> bool;

    /// Publish one wire message.
    ///
    /// ## Errors
    /// - [`AdapterError::Unavailable`]: no live connection
    /// - [`AdapterError::Rejected`]: the backend refused the message
    /// - [`AdapterError::Backend`]: other backend failure
    async fn publish(
        &self,
        destination: &Destination,
        message: WireMessage,
        options: &PublishOptions,
    ) -> AdapterResult<AckInfo>;

    /// Register a durable named consumer on `source`.
    async fn subscribe(
        &self,
        source: &Destination,
        handler: MessageHandler,
    ) -> AdapterResult<SubscriptionHandle>;

    /// Stop delivery for a subscription and release backend resources.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> AdapterResult<()>;

    /// Current adapter counters.
    async fn stats(&self) -> AdapterStats;

    /// Close consumers, the producer, and the transport connection.
    async fn close(&self) -> AdapterResult<()>;
}

impl AdapterError {
    /// Whether this error indicates the connection itself is gone, so the
    /// supervisor should begin reconnecting.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, AdapterError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_loss_classification() {
        assert!(AdapterError::Unavailable("down".into()).is_connection_loss());
        assert!(!AdapterError::Rejected("no route".into()).is_connection_loss());
        assert!(!AdapterError::Backend("boom".into()).is_connection_loss());
    }
}
