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

//! Mock broker backend for testing
//!
//! ## Purpose
//! In-memory [`BrokerAdapter`] implementation with scriptable failures so
//! pipeline, supervisor, and recovery behavior can be exercised without any
//! broker process: captured publishes, manual inbound delivery, connect
//! failures, and one-shot publish failures.

use crate::adapter::{
    AckInfo, AdapterError, AdapterResult, AdapterStats, BrokerAdapter, HandlerOutcome,
    InboundMessage, MessageCoordinates, MessageHandler, PublishOptions, SubscriptionHandle,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use streambridge_core::{Destination, Protocol, WireMessage};
use tokio::sync::RwLock;
use ulid::Ulid;

/// One-shot failure scripted for the next publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Backend refuses the message.
    Reject,
    /// Connection is reported dead.
    Unavailable,
    /// Generic backend error.
    Backend,
}

/// A publish captured by the mock, with everything the adapter was given.
#[derive(Debug, Clone)]
pub struct CapturedPublish {
    /// Target destination.
    pub destination: Destination,
    /// Wire message as published.
    pub wire: WireMessage,
    /// Options the caller passed.
    pub options: PublishOptions,
}

struct SubscriptionEntry {
    handle: SubscriptionHandle,
    handler: MessageHandler,
}

struct StatsData {
    published: AtomicU64,
    consumed: AtomicU64,
    acked: AtomicU64,
    failed: AtomicU64,
}

/// Scriptable in-memory broker adapter.
pub struct MockAdapter {
    protocol: Protocol,
    connected: AtomicBool,
    /// Remaining connect attempts that should fail before one succeeds.
    connect_failures: AtomicU32,
    next_failure: RwLock<Option<MockFailure>>,
    published: RwLock<Vec<CapturedPublish>>,
    subscriptions: RwLock<HashMap<String, SubscriptionEntry>>,
    next_offset: AtomicI64,
    stats: StatsData,
}

impl MockAdapter {
    /// Create a disconnected mock for the given protocol.
    pub fn new(protocol: Protocol) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            connected: AtomicBool::new(false),
            connect_failures: AtomicU32::new(0),
            next_failure: RwLock::new(None),
            published: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(HashMap::new()),
            next_offset: AtomicI64::new(0),
            stats: StatsData {
                published: AtomicU64::new(0),
                consumed: AtomicU64::new(0),
                acked: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            },
        })
    }

    /// Create a mock that is already connected.
    pub fn connected(protocol: Protocol) -> Arc<Self> {
        let adapter = Self::new(protocol);
        adapter.connected.store(true, Ordering::SeqCst);
        adapter
    }

    /// Force the connection flag, simulating loss or restoration.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Script a one-shot failure for the next publish.
    pub async fn fail_next_publish(&self, failure: MockFailure) {
        *self.next_failure.write().await = Some(failure);
    }

    /// Everything published so far.
    pub async fn published(&self) -> Vec<CapturedPublish> {
        self.published.read().await.clone()
    }

    /// Publishes captured for one destination name.
    pub async fn published_to(&self, name: &str) -> Vec<CapturedPublish> {
        self.published
            .read()
            .await
            .iter()
            .filter(|p| p.destination.name == name)
            .cloned()
            .collect()
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Deliver a message to the consumer registered on `source_name`,
    /// returning the handler's outcome, or `None` if nobody is subscribed.
    pub async fn deliver(&self, source_name: &str, wire: WireMessage) -> Option<HandlerOutcome> {
        let (source, handler) = {
            let subscriptions = self.subscriptions.read().await;
            let entry = subscriptions.get(source_name)?;
            (
                Destination::new(self.protocol, source_name),
                Arc::clone(&entry.handler),
            )
        };

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let inbound = InboundMessage {
            source,
            wire,
            coordinates: MessageCoordinates {
                partition: Some(0),
                offset: Some(offset),
                delivery_tag: Some(offset as u64),
            },
        };

        self.stats.consumed.fetch_add(1, Ordering::Relaxed);
        let outcome = handler(inbound).await;
        match outcome {
            HandlerOutcome::Processed | HandlerOutcome::Recovered => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
            }
            HandlerOutcome::Failed => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Some(outcome)
    }
}

#[async_trait]
impl BrokerAdapter for MockAdapter {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn connect(&self) -> AdapterResult<()> {
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AdapterError::Unavailable(
                "scripted connect failure".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
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
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return Err(AdapterError::Unavailable("mock disconnected".to_string()));
        }

        if let Some(failure) = self.next_failure.write().await.take() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return Err(match failure {
                MockFailure::Reject => AdapterError::Rejected("scripted rejection".to_string()),
                MockFailure::Unavailable => {
                    AdapterError::Unavailable("scripted connection loss".to_string())
                }
                MockFailure::Backend => AdapterError::Backend("scripted backend error".to_string()),
            });
        }

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        self.published.write().await.push(CapturedPublish {
            destination: destination.clone(),
            wire: message,
            options: options.clone(),
        });
        self.stats.published.fetch_add(1, Ordering::Relaxed);

        Ok(AckInfo {
            destination: destination.name.clone(),
            partition: Some(0),
            offset: Some(offset),
            confirmed: true,
        })
    }

    async fn subscribe(
        &self,
        source: &Destination,
        handler: MessageHandler,
    ) -> AdapterResult<SubscriptionHandle> {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(existing) = subscriptions.get(&source.name) {
            return Ok(existing.handle.clone());
        }

        let handle = SubscriptionHandle {
            id: Ulid::new().to_string(),
            source: source.name.clone(),
        };
        subscriptions.insert(
            source.name.clone(),
            SubscriptionEntry {
                handle: handle.clone(),
                handler,
            },
        );
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> AdapterResult<()> {
        self.subscriptions.write().await.remove(&handle.source);
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
        self.connected.store(false, Ordering::SeqCst);
        self.subscriptions.write().await.clear();
        Ok(())
    }
}
