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

//! Kafka backend for the partitioned log broker
//!
//! ## Purpose
//! Translates the generic adapter contract into Kafka wire semantics:
//! `(topic, partition, offset)` message coordinates, partition keys from
//! routing keys, and offset commits instead of per-message acks.
//!
//! ## Design Decisions
//! - **rdkafka**: async `FutureProducer` for publishes, one `StreamConsumer`
//!   per subscription running its own consume-loop task
//! - **Manual commit**: `enable.auto.commit=false`; the loop commits only
//!   after the handler reports the message settled (processed or captured
//!   by failure recovery)
//! - **Consumer groups**: one group per source (`<group>.<source>`) so each
//!   durable named consumer tracks its own offsets

use crate::adapter::{
    AckInfo, AdapterError, AdapterResult, AdapterStats, BrokerAdapter, HandlerOutcome,
    InboundMessage, MessageCoordinates, MessageHandler, PublishOptions, SubscriptionHandle,
};
use crate::observability;
use async_trait::async_trait;
use indexmap::IndexMap;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message as KafkaMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streambridge_core::{headers, Destination, KafkaSettings, Protocol, WireMessage};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, warn};
use ulid::Ulid;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

struct StatsData {
    published: AtomicU64,
    consumed: AtomicU64,
    acked: AtomicU64,
    failed: AtomicU64,
}

struct KafkaSubscription {
    handle: SubscriptionHandle,
    shutdown: watch::Sender<bool>,
}

/// Kafka adapter implementation using rdkafka.
pub struct KafkaAdapter {
    settings: KafkaSettings,
    producer: RwLock<Option<FutureProducer>>,
    subscriptions: RwLock<HashMap<String, KafkaSubscription>>,
    connected: AtomicBool,
    stats: Arc<StatsData>,
}

impl KafkaAdapter {
    /// Create a disconnected adapter; the connection supervisor calls
    /// [`BrokerAdapter::connect`] to bring it up.
    pub fn new(settings: KafkaSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            producer: RwLock::new(None),
            subscriptions: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            stats: Arc::new(StatsData {
                published: AtomicU64::new(0),
                consumed: AtomicU64::new(0),
                acked: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        })
    }

    fn create_consumer(&self, source: &str) -> AdapterResult<StreamConsumer> {
        let mut consumer_config = ClientConfig::new();
        consumer_config
            .set("bootstrap.servers", self.settings.brokers.join(","))
            .set(
                "group.id",
                format!("{}.{}", self.settings.consumer_group, source),
            )
            // Commit happens only after the handler settles the message
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");

        consumer_config.create().map_err(|e| {
            AdapterError::Backend(format!("Failed to create Kafka consumer: {}", e))
        })
    }

    fn serialize_headers(wire: &WireMessage) -> OwnedHeaders {
        let mut kafka_headers = OwnedHeaders::new_with_capacity(wire.headers.len());
        for (name, value) in &wire.headers {
            kafka_headers = kafka_headers.insert(Header {
                key: name,
                value: Some(value.as_bytes()),
            });
        }
        kafka_headers
    }

    fn deserialize_headers(kafka_msg: &impl KafkaMessage) -> IndexMap<String, String> {
        let mut header_map = IndexMap::new();
        if let Some(kafka_headers) = kafka_msg.headers() {
            for header in kafka_headers.iter() {
                if let Some(value) = header.value {
                    header_map.insert(
                        header.key.to_string(),
                        String::from_utf8_lossy(value).to_string(),
                    );
                }
            }
        }
        header_map
    }

    fn map_publish_error(error: KafkaError) -> AdapterError {
        let code = error.rdkafka_error_code();
        match code {
            Some(RDKafkaErrorCode::BrokerTransportFailure)
            | Some(RDKafkaErrorCode::AllBrokersDown)
            | Some(RDKafkaErrorCode::MessageTimedOut) => {
                AdapterError::Unavailable(format!("Kafka transport failure: {}", error))
            }
            Some(RDKafkaErrorCode::UnknownTopicOrPartition)
            | Some(RDKafkaErrorCode::UnknownTopic)
            | Some(RDKafkaErrorCode::MessageSizeTooLarge) => {
                AdapterError::Rejected(format!("Kafka rejected message: {}", error))
            }
            _ => AdapterError::Backend(format!("Kafka publish failed: {}", error)),
        }
    }
}

#[async_trait]
impl BrokerAdapter for KafkaAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Kafka
    }

    async fn connect(&self) -> AdapterResult<()> {
        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", self.settings.brokers.join(","))
            .set("message.timeout.ms", "5000")
            .set("compression.type", "snappy");

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            AdapterError::Unavailable(format!("Failed to create Kafka producer: {}", e))
        })?;

        *self.producer.write().await = Some(producer);
        self.connected.store(true, Ordering::SeqCst);
        debug!(brokers = ?self.settings.brokers, "Kafka producer ready");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(
        &self,
        destination: &Destination,
        message: WireMessage,
        options: &PublishOptions,
    ) -> AdapterResult<AckInfo> {
        if !self.is_connected() {
            return Err(AdapterError::Unavailable(
                "Kafka producer not connected".to_string(),
            ));
        }
        let producer = {
            let guard = self.producer.read().await;
            guard
                .as_ref()
                .cloned()
                .ok_or_else(|| AdapterError::Unavailable("Kafka producer not connected".to_string()))?
        };

        // Routing key doubles as the partition key; fall back to the
        // transaction id so one attempt-chain stays on one partition.
        let partition_key = options
            .routing_key
            .clone()
            .or_else(|| message.transaction_id().map(String::from))
            .unwrap_or_default();

        let kafka_headers = Self::serialize_headers(&message);
        let record = FutureRecord::to(&destination.name)
            .payload(&message.body)
            .key(&partition_key)
            .headers(kafka_headers);

        let (partition, offset) = producer
            .send(record, PUBLISH_TIMEOUT)
            .await
            .map_err(|(e, _)| {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                Self::map_publish_error(e)
            })?;

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        Ok(AckInfo {
            destination: destination.name.clone(),
            partition: Some(partition),
            offset: Some(offset),
            confirmed: true,
        })
    }

    async fn subscribe(
        &self,
        source: &Destination,
        handler: MessageHandler,
    ) -> AdapterResult<SubscriptionHandle> {
        if !self.is_connected() {
            return Err(AdapterError::Unavailable(
                "Kafka adapter not connected".to_string(),
            ));
        }

        let mut subscriptions = self.subscriptions.write().await;
        if let Some(existing) = subscriptions.get(&source.name) {
            return Ok(existing.handle.clone());
        }

        let consumer = self.create_consumer(&source.name)?;
        consumer
            .subscribe(&[&source.name])
            .map_err(|e| AdapterError::Backend(format!("Failed to subscribe: {}", e)))?;

        let handle = SubscriptionHandle {
            id: Ulid::new().to_string(),
            source: source.name.clone(),
        };
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);
        let loop_source = source.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    result = consumer.recv() => {
                        let kafka_msg = match result {
                            Ok(msg) => msg,
                            Err(e) => {
                                error!(source = %loop_source, error = %e, "Kafka consume error");
                                tokio::time::sleep(Duration::from_millis(500)).await;
                                continue;
                            }
                        };

                        let wire = WireMessage {
                            body: kafka_msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                            headers: Self::deserialize_headers(&kafka_msg),
                        };
                        let transaction_id = wire
                            .header(headers::TRANSACTION_ID)
                            .unwrap_or("unknown")
                            .to_string();
                        let inbound = InboundMessage {
                            source: loop_source.clone(),
                            wire,
                            coordinates: MessageCoordinates {
                                partition: Some(kafka_msg.partition()),
                                offset: Some(kafka_msg.offset()),
                                delivery_tag: None,
                            },
                        };

                        stats.consumed.fetch_add(1, Ordering::Relaxed);
                        let outcome = handler(inbound).await;
                        match outcome {
                            HandlerOutcome::Processed | HandlerOutcome::Recovered => {
                                if let Err(e) =
                                    consumer.commit_message(&kafka_msg, CommitMode::Async)
                                {
                                    warn!(source = %loop_source, error = %e, "Offset commit failed");
                                }
                                stats.acked.fetch_add(1, Ordering::Relaxed);
                                observability::record_settled(
                                    Protocol::Kafka,
                                    &loop_source.name,
                                    &transaction_id,
                                    outcome,
                                );
                            }
                            HandlerOutcome::Failed => {
                                // No commit: the broker redelivers from the
                                // last committed offset.
                                stats.failed.fetch_add(1, Ordering::Relaxed);
                                observability::record_settled(
                                    Protocol::Kafka,
                                    &loop_source.name,
                                    &transaction_id,
                                    outcome,
                                );
                            }
                        }
                    }
                }
            }
            debug!(source = %loop_source, "Kafka consume loop stopped");
        });

        subscriptions.insert(
            source.name.clone(),
            KafkaSubscription {
                handle: handle.clone(),
                shutdown: shutdown_tx,
            },
        );
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> AdapterResult<()> {
        if let Some(entry) = self.subscriptions.write().await.remove(&handle.source) {
            // Loop exits at the next message boundary, never mid-message
            let _ = entry.shutdown.send(true);
        }
        Ok(())
    }

    async fn stats(&self) -> AdapterStats {
        AdapterStats {
            published: self.stats.published.load(Ordering::Relaxed),
            consumed: self.stats.consumed.load(Ordering::Relaxed),
            acked: self.stats.acked.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> AdapterResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        for (_, entry) in subscriptions.drain() {
            let _ = entry.shutdown.send(true);
        }
        *self.producer.write().await = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
