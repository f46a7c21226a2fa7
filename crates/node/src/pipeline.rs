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

//! Delivery pipeline - outbound and inbound message flows
//!
//! ## Purpose
//! Orchestrates both directions of the bridge:
//! - Outbound: validate → encode → publish (through the backend's
//!   connection supervisor) → metrics → fan-out
//! - Inbound: decode → validate (warn-only) → fan-out → metrics → settle
//!
//! Assigns the transaction id at entry and propagates it end-to-end.
//!
//! ## Error Policy
//! Outbound failures are synchronous and surfaced to the caller, never
//! silently retried. Inbound failures (decode included) are caught, wrapped
//! with the source coordinates, and absorbed into failure recovery; the
//! adapter is then told to settle so the broker never redelivers a message
//! recovery already owns.

use crate::fanout::FanoutHub;
use crate::recovery::FailureRecovery;
use futures::FutureExt;
use indexmap::IndexMap;
use std::sync::Arc;
use streambridge_channel::{
    AckInfo, AdapterError, HandlerOutcome, InboundMessage, MessageHandler,
    PublishOptions as ChannelPublishOptions, SubscriptionHandle,
};
use streambridge_core::{
    headers, BridgeConfig, BridgeError, BridgeMetrics, BridgeResult, Destination, EnvelopeCodec,
    Envelope, MessageValidator, MetricStatus, Protocol,
};
use streambridge_supervisor::ConnectionSupervisor;
use tracing::{error, warn};

/// Pseudo-topic every broadcast is tagged with.
pub const TOPIC_ALL: &str = "all";

/// Caller-supplied options for one publish.
#[derive(Debug, Clone)]
pub struct PublishParams {
    /// Logical message type, resolved against the schema catalog.
    pub message_type: String,
    /// Routing key (exchange routing on the queue backend, partition key on
    /// the log backend).
    pub routing_key: Option<String>,
    /// Extra headers; an `x-transaction-id` entry pins the transaction id
    /// instead of assigning a fresh one.
    pub headers: IndexMap<String, String>,
    /// Hand the envelope to the fan-out hub after a successful publish.
    pub broadcast: bool,
    /// Mark the message persistent where the backend distinguishes.
    pub persistent: bool,
    /// Fail the publish (before any I/O) when validation rejects the
    /// payload; otherwise validation failures only log.
    pub require_validation: bool,
    /// Authenticated principal recorded in the audit headers.
    pub principal_id: Option<String>,
}

impl PublishParams {
    /// Options for a message type with everything else defaulted.
    pub fn for_type(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            routing_key: None,
            headers: IndexMap::new(),
            broadcast: true,
            persistent: false,
            require_validation: false,
            principal_id: None,
        }
    }
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// Always true on the Ok path; failures surface as errors.
    pub success: bool,
    /// Transaction id assigned (or propagated) for this delivery chain.
    pub transaction_id: String,
    /// Backend confirmation details.
    pub ack: AckInfo,
}

/// The bridge's delivery pipeline.
pub struct DeliveryPipeline {
    config: Arc<BridgeConfig>,
    codec: EnvelopeCodec,
    validator: Arc<dyn MessageValidator>,
    metrics: Arc<dyn BridgeMetrics>,
    fanout: Arc<FanoutHub>,
    recovery: Arc<FailureRecovery>,
    kafka: ConnectionSupervisor,
    queue: ConnectionSupervisor,
}

impl DeliveryPipeline {
    /// Wire a pipeline over its collaborators and both backend supervisors.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<BridgeConfig>,
        codec: EnvelopeCodec,
        validator: Arc<dyn MessageValidator>,
        metrics: Arc<dyn BridgeMetrics>,
        fanout: Arc<FanoutHub>,
        recovery: Arc<FailureRecovery>,
        kafka: ConnectionSupervisor,
        queue: ConnectionSupervisor,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            codec,
            validator,
            metrics,
            fanout,
            recovery,
            kafka,
            queue,
        })
    }

    fn supervisor_for(&self, protocol: Protocol) -> &ConnectionSupervisor {
        match protocol {
            Protocol::Kafka => &self.kafka,
            Protocol::Queue => &self.queue,
        }
    }

    /// Outbound flow: publish `payload` to `destination`.
    ///
    /// ## Errors
    /// - [`BridgeError::InvalidDestination`]: unparseable destination string
    /// - [`BridgeError::ValidationFailed`]: schema rejection under
    ///   `require_validation`, raised before any broker I/O
    /// - [`BridgeError::BrokerUnavailable`] / [`BridgeError::PublishRejected`]:
    ///   adapter-reported failures, surfaced without retry
    pub async fn publish(
        &self,
        destination: &str,
        payload: serde_json::Value,
        params: PublishParams,
    ) -> BridgeResult<PublishReceipt> {
        let mut destination: Destination = destination.parse()?;
        if let Some(routing_key) = &params.routing_key {
            destination = destination.with_routing_key(routing_key.clone());
        }

        let mut envelope = Envelope::new(params.message_type.clone(), payload);
        for (name, value) in &params.headers {
            if name == headers::TRANSACTION_ID {
                // Assigned once at entry: an id supplied by the caller (a
                // replay, an upstream hop) is propagated, never regenerated
                envelope.transaction_id = value.clone();
            } else {
                envelope.set_header(name.clone(), value.clone());
            }
        }
        if let Some(principal) = &params.principal_id {
            envelope.set_header(headers::PRINCIPAL_ID, principal.clone());
        }

        if self.config.validate_messages {
            let outcome = self
                .validator
                .validate(&envelope.message_type, &envelope.payload);
            if !outcome.valid {
                if params.require_validation {
                    // Before any I/O: the broker never sees invalid payloads
                    self.metrics.record_publish(
                        destination.protocol,
                        &destination.name,
                        &envelope.message_type,
                        MetricStatus::Failure,
                    );
                    return Err(BridgeError::ValidationFailed {
                        message_type: envelope.message_type,
                        errors: outcome.errors,
                    });
                }
                warn!(
                    transaction_id = %envelope.transaction_id,
                    message_type = %envelope.message_type,
                    errors = ?outcome.errors,
                    "Publishing payload that failed validation"
                );
            }
        }

        let wire = self
            .codec
            .encode(&envelope)
            .map_err(|e| BridgeError::Processing(format!("envelope encoding failed: {}", e)))?;

        let channel_options = ChannelPublishOptions {
            routing_key: params.routing_key.clone(),
            persistent: params.persistent,
            ..Default::default()
        };
        let timer = self.metrics.start_timer(
            destination.protocol,
            &destination.name,
            &envelope.message_type,
            "publish",
        );

        match self
            .supervisor_for(destination.protocol)
            .publish(&destination, wire, &channel_options)
            .await
        {
            Ok(ack) => {
                timer.stop(false);
                self.metrics.record_publish(
                    destination.protocol,
                    &destination.name,
                    &envelope.message_type,
                    MetricStatus::Success,
                );

                if params.broadcast {
                    // The decoded (pre-encryption) envelope goes to observers
                    let topics = vec![
                        destination.name.clone(),
                        destination.protocol.as_str().to_string(),
                        TOPIC_ALL.to_string(),
                    ];
                    self.fanout.broadcast(&envelope, &topics).await;
                }

                Ok(PublishReceipt {
                    success: true,
                    transaction_id: envelope.transaction_id,
                    ack,
                })
            }
            Err(e) => {
                timer.stop(true);
                self.metrics.record_publish(
                    destination.protocol,
                    &destination.name,
                    &envelope.message_type,
                    MetricStatus::Failure,
                );
                Err(Self::map_publish_error(e))
            }
        }
    }

    fn map_publish_error(error: AdapterError) -> BridgeError {
        match error {
            // Retriable by the caller: the connection is the problem
            AdapterError::Unavailable(m) | AdapterError::Closed(m) | AdapterError::Backend(m) => {
                BridgeError::BrokerUnavailable(m)
            }
            AdapterError::Rejected(m) | AdapterError::Serialization(m) => {
                BridgeError::PublishRejected(m)
            }
        }
    }

    /// Start consuming from `source`; inbound messages run the decode →
    /// validate → fan-out flow and failures are absorbed into recovery.
    pub async fn subscribe(self: &Arc<Self>, source: &str) -> BridgeResult<SubscriptionHandle> {
        let source: Destination = source.parse()?;
        let handler = self.inbound_handler();
        self.supervisor_for(source.protocol)
            .subscribe(&source, handler)
            .await
            .map_err(Self::map_publish_error)
    }

    /// Stop consuming from `source`. Safe to call for unknown sources.
    pub async fn unsubscribe(&self, source: &str) -> BridgeResult<()> {
        let source: Destination = source.parse()?;
        self.supervisor_for(source.protocol)
            .unsubscribe_source(&source.name)
            .await
            .map_err(Self::map_publish_error)
    }

    /// Build the per-message callback handed to an adapter subscription.
    pub fn inbound_handler(self: &Arc<Self>) -> MessageHandler {
        let pipeline = Arc::clone(self);
        Arc::new(move |inbound: InboundMessage| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.handle_inbound(inbound).await }.boxed()
        })
    }

    /// Inbound flow for one message; returns how the adapter should settle.
    async fn handle_inbound(&self, inbound: InboundMessage) -> HandlerOutcome {
        let source = inbound.source.clone();
        let coordinates = inbound.coordinates.clone();
        let wire = inbound.wire.clone();

        match self.process_inbound(inbound).await {
            Ok(()) => HandlerOutcome::Processed,
            Err(e) => {
                self.metrics.record_consume(
                    source.protocol,
                    &source.name,
                    wire.header(headers::MESSAGE_TYPE).unwrap_or("unknown"),
                    MetricStatus::Failure,
                );
                warn!(
                    source = %source,
                    partition = ?coordinates.partition,
                    offset = ?coordinates.offset,
                    delivery_tag = ?coordinates.delivery_tag,
                    error = %e,
                    "Inbound processing failed, routing to recovery"
                );

                match self
                    .recovery
                    .handle_failure(&source, wire, &e.to_string())
                    .await
                {
                    Ok(_) => HandlerOutcome::Recovered,
                    Err(recovery_error) => {
                        error!(
                            source = %source,
                            error = %recovery_error,
                            "Recovery hand-off failed, leaving message to broker redelivery"
                        );
                        HandlerOutcome::Failed
                    }
                }
            }
        }
    }

    /// Decode, validate (warn-only), fan out, and record one inbound
    /// message. A decode failure propagates before validation ever runs.
    async fn process_inbound(&self, inbound: InboundMessage) -> BridgeResult<()> {
        let envelope = self.codec.decode(&inbound.wire)?;

        if self.config.validate_messages {
            let outcome = self
                .validator
                .validate(&envelope.message_type, &envelope.payload);
            if !outcome.valid {
                // Inbound validation never blocks delivery
                warn!(
                    transaction_id = %envelope.transaction_id,
                    message_type = %envelope.message_type,
                    source = %inbound.source,
                    errors = ?outcome.errors,
                    "Consumed payload failed validation"
                );
            }
        }

        let topics = vec![
            inbound.source.name.clone(),
            inbound.source.protocol.as_str().to_string(),
            TOPIC_ALL.to_string(),
        ];
        self.fanout.broadcast(&envelope, &topics).await;

        self.metrics.record_consume(
            inbound.source.protocol,
            &inbound.source.name,
            &envelope.message_type,
            MetricStatus::Success,
        );
        Ok(())
    }
}
