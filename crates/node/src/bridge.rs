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

//! Bridge assembly and lifecycle
//!
//! ## Purpose
//! [`BridgeBuilder`] wires configuration into the full object graph —
//! codec, adapters, connection supervisors, fan-out hub, recovery, delivery
//! pipeline — with injection points for the validation and metrics
//! collaborators and for replacement adapters in tests. [`MessageBridge`]
//! is the assembled system with an explicit start/shutdown lifecycle; no
//! component holds ambient module-level state.

use crate::fanout::FanoutHub;
use crate::pipeline::{DeliveryPipeline, PublishParams, PublishReceipt};
use crate::recovery::FailureRecovery;
use std::sync::Arc;
use streambridge_channel::{BrokerAdapter, SubscriptionHandle};
use streambridge_core::{
    BridgeConfig, BridgeError, BridgeMetrics, BridgeResult, ConfigError, EnvelopeCodec,
    FacadeMetrics, MessageValidator, NoopValidator, Protocol,
};
use streambridge_supervisor::{ConnectionState, ConnectionSupervisor};
use tracing::info;

/// Assembles a [`MessageBridge`] from configuration and collaborators.
pub struct BridgeBuilder {
    config: BridgeConfig,
    validator: Arc<dyn MessageValidator>,
    metrics: Arc<dyn BridgeMetrics>,
    kafka_adapter: Option<Arc<dyn BrokerAdapter>>,
    queue_adapter: Option<Arc<dyn BrokerAdapter>>,
    fanout_capacity: usize,
}

impl BridgeBuilder {
    /// Start a builder from configuration; collaborators default to the
    /// no-op validator and the `metrics`-facade emitter.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            validator: Arc::new(NoopValidator),
            metrics: Arc::new(FacadeMetrics),
            kafka_adapter: None,
            queue_adapter: None,
            fanout_capacity: crate::fanout::DEFAULT_OBSERVER_CAPACITY,
        }
    }

    /// Inject the schema validation collaborator.
    pub fn with_validator(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Inject the metrics collaborator.
    pub fn with_metrics(mut self, metrics: Arc<dyn BridgeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the log-broker adapter (tests use the mock here).
    pub fn with_kafka_adapter(mut self, adapter: Arc<dyn BrokerAdapter>) -> Self {
        self.kafka_adapter = Some(adapter);
        self
    }

    /// Replace the queue-broker adapter (tests use the mock here).
    pub fn with_queue_adapter(mut self, adapter: Arc<dyn BrokerAdapter>) -> Self {
        self.queue_adapter = Some(adapter);
        self
    }

    /// Override the per-observer fan-out queue capacity.
    pub fn with_fanout_capacity(mut self, capacity: usize) -> Self {
        self.fanout_capacity = capacity;
        self
    }

    /// Build the bridge. Fails when encryption is enabled without a key or
    /// when a backend has neither a compiled-in adapter nor an injected one.
    pub fn build(self) -> BridgeResult<MessageBridge> {
        let config = Arc::new(self.config);

        let codec = if config.encrypt_messages {
            let key = config.encryption_key.as_ref().ok_or_else(|| {
                BridgeError::Configuration(ConfigError::MissingEncryptionKey(
                    "no key available".to_string(),
                ))
            })?;
            EnvelopeCodec::encrypted(key)
        } else {
            EnvelopeCodec::plaintext()
        };

        let kafka_adapter = match self.kafka_adapter {
            Some(adapter) => adapter,
            None => Self::default_kafka_adapter(&config)?,
        };
        let queue_adapter = match self.queue_adapter {
            Some(adapter) => adapter,
            None => Self::default_queue_adapter(&config)?,
        };

        let kafka = ConnectionSupervisor::new(
            kafka_adapter,
            config.reconnect_delay,
            config.drain_timeout,
        );
        let queue = ConnectionSupervisor::new(
            queue_adapter,
            config.reconnect_delay,
            config.drain_timeout,
        );

        let fanout = Arc::new(FanoutHub::new(self.fanout_capacity));
        let recovery = Arc::new(FailureRecovery::new(
            Arc::clone(&config),
            kafka.clone(),
            queue.clone(),
        ));
        let pipeline = DeliveryPipeline::new(
            Arc::clone(&config),
            codec,
            self.validator,
            self.metrics,
            Arc::clone(&fanout),
            recovery,
            kafka.clone(),
            queue.clone(),
        );

        Ok(MessageBridge {
            pipeline,
            fanout,
            kafka,
            queue,
        })
    }

    #[cfg(feature = "kafka-backend")]
    fn default_kafka_adapter(config: &BridgeConfig) -> BridgeResult<Arc<dyn BrokerAdapter>> {
        Ok(streambridge_channel::KafkaAdapter::new(config.kafka.clone()))
    }

    #[cfg(not(feature = "kafka-backend"))]
    fn default_kafka_adapter(_config: &BridgeConfig) -> BridgeResult<Arc<dyn BrokerAdapter>> {
        Err(BridgeError::Configuration(ConfigError::InvalidValue {
            name: "kafka-backend".to_string(),
            reason: "feature not enabled and no adapter injected".to_string(),
        }))
    }

    #[cfg(feature = "amqp-backend")]
    fn default_queue_adapter(config: &BridgeConfig) -> BridgeResult<Arc<dyn BrokerAdapter>> {
        Ok(streambridge_channel::QueueAdapter::new(config.amqp.clone()))
    }

    #[cfg(not(feature = "amqp-backend"))]
    fn default_queue_adapter(_config: &BridgeConfig) -> BridgeResult<Arc<dyn BrokerAdapter>> {
        Err(BridgeError::Configuration(ConfigError::InvalidValue {
            name: "amqp-backend".to_string(),
            reason: "feature not enabled and no adapter injected".to_string(),
        }))
    }
}

/// The assembled bridge: both supervised backends behind one
/// publish/consume surface plus the fan-out hub.
pub struct MessageBridge {
    pipeline: Arc<DeliveryPipeline>,
    fanout: Arc<FanoutHub>,
    kafka: ConnectionSupervisor,
    queue: ConnectionSupervisor,
}

impl MessageBridge {
    /// Bring both backend connections up. Failed backends keep retrying on
    /// their fixed-delay reconnect loops; the bridge still serves the other.
    pub async fn start(&self) {
        if let Err(e) = self.kafka.start().await {
            info!(error = %e, "Kafka backend will connect in the background");
        }
        if let Err(e) = self.queue.start().await {
            info!(error = %e, "Queue backend will connect in the background");
        }
    }

    /// Publish `payload` to a scheme-prefixed destination.
    pub async fn publish(
        &self,
        destination: &str,
        payload: serde_json::Value,
        params: PublishParams,
    ) -> BridgeResult<PublishReceipt> {
        self.pipeline.publish(destination, payload, params).await
    }

    /// Consume from a scheme-prefixed source through the inbound flow.
    pub async fn subscribe(&self, source: &str) -> BridgeResult<SubscriptionHandle> {
        self.pipeline.subscribe(source).await
    }

    /// Stop consuming from a source.
    pub async fn unsubscribe(&self, source: &str) -> BridgeResult<()> {
        self.pipeline.unsubscribe(source).await
    }

    /// The fan-out hub, the transport layer's attach/detach surface.
    pub fn fanout(&self) -> &Arc<FanoutHub> {
        &self.fanout
    }

    /// The delivery pipeline (mainly for tests wiring custom handlers).
    pub fn pipeline(&self) -> &Arc<DeliveryPipeline> {
        &self.pipeline
    }

    /// Connection state of one backend.
    pub async fn connection_state(&self, protocol: Protocol) -> ConnectionState {
        match protocol {
            Protocol::Kafka => self.kafka.state().await,
            Protocol::Queue => self.queue.state().await,
        }
    }

    /// Drain both backends: consumers first, then producers and transports,
    /// each stage under the configured bounded timeout.
    pub async fn shutdown(&self) {
        info!("Bridge shutdown: draining backends");
        self.kafka.drain().await;
        self.queue.drain().await;
        info!("Bridge shutdown complete");
    }
}
