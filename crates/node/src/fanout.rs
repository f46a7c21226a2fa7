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

//! Fan-out hub - real-time broadcast to topic-matched observers
//!
//! ## Purpose
//! Maintains the observer registry and delivers each published/consumed
//! envelope to every observer whose subscribed topic set intersects the
//! message's topic tags. The WS/HTTP transport layer owns the actual socket
//! I/O; it attaches here and reads envelopes off the returned receiver.
//!
//! ## Concurrency
//! Registry mutations (`attach`/`update_topics`/`detach`) each run under a
//! single write-lock critical section. `broadcast` takes a point-in-time
//! snapshot of the registry and then sends without holding any lock, so a
//! slow or disconnected observer can never stall delivery to the others.

use std::collections::{HashMap, HashSet};
use streambridge_core::Envelope;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use ulid::Ulid;

/// Topic that matches every broadcast.
pub const WILDCARD_TOPIC: &str = "*";

/// Default per-observer delivery queue capacity.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// Handle identifying one attached observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(Ulid);

struct ObserverEntry {
    observer_id: String,
    topics: HashSet<String>,
    sender: mpsc::Sender<Envelope>,
}

impl ObserverEntry {
    fn matches(&self, topics: &[String]) -> bool {
        if self.topics.contains(WILDCARD_TOPIC) {
            return true;
        }
        topics.iter().any(|topic| self.topics.contains(topic))
    }
}

/// Observer registry and broadcast engine.
pub struct FanoutHub {
    observers: RwLock<HashMap<ObserverHandle, ObserverEntry>>,
    capacity: usize,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl FanoutHub {
    /// Create a hub with the given per-observer queue capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Attach an observer with an initial topic set.
    ///
    /// Returns the handle used for later mutations and the receiver the
    /// transport layer drains envelopes from. Dropping the receiver makes
    /// future sends fail, which `broadcast` treats as a skip.
    pub async fn attach(
        &self,
        observer_id: impl Into<String>,
        topics: HashSet<String>,
    ) -> (ObserverHandle, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let handle = ObserverHandle(Ulid::new());
        let observer_id = observer_id.into();

        let mut observers = self.observers.write().await;
        debug!(observer_id = %observer_id, topics = ?topics, "Observer attached");
        observers.insert(
            handle,
            ObserverEntry {
                observer_id,
                topics,
                sender,
            },
        );
        (handle, receiver)
    }

    /// Mutate an observer's topic set. Returns false for unknown handles.
    pub async fn update_topics(
        &self,
        handle: &ObserverHandle,
        add: &[String],
        remove: &[String],
    ) -> bool {
        let mut observers = self.observers.write().await;
        let Some(entry) = observers.get_mut(handle) else {
            return false;
        };
        for topic in add {
            entry.topics.insert(topic.clone());
        }
        for topic in remove {
            entry.topics.remove(topic);
        }
        true
    }

    /// Detach an observer and destroy its subscription. Safe for unknown
    /// handles.
    pub async fn detach(&self, handle: &ObserverHandle) {
        if let Some(entry) = self.observers.write().await.remove(handle) {
            debug!(observer_id = %entry.observer_id, "Observer detached");
        }
    }

    /// Number of attached observers.
    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Deliver the envelope to every observer whose topic set intersects
    /// `topics` (or holds the wildcard). Returns how many observers the
    /// envelope was handed to.
    ///
    /// Delivery is best-effort and non-blocking per observer: a full or
    /// closed observer queue is logged and skipped, never retried.
    pub async fn broadcast(&self, envelope: &Envelope, topics: &[String]) -> usize {
        // Snapshot under the read lock, send outside it
        let recipients: Vec<(String, mpsc::Sender<Envelope>)> = {
            let observers = self.observers.read().await;
            observers
                .values()
                .filter(|entry| entry.matches(topics))
                .map(|entry| (entry.observer_id.clone(), entry.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (observer_id, sender) in recipients {
            match sender.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(
                        observer_id = %observer_id,
                        transaction_id = %envelope.transaction_id,
                        error = %e,
                        "Observer delivery skipped"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topic_set(topics: &[&str]) -> HashSet<String> {
        topics.iter().map(|t| t.to_string()).collect()
    }

    fn tags(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_broadcast_matches_intersecting_topics() {
        let hub = FanoutHub::default();
        let (_orders_handle, mut orders_rx) = hub.attach("orders-observer", topic_set(&["orders"])).await;
        let (_logs_handle, mut logs_rx) = hub.attach("logs-observer", topic_set(&["logs"])).await;

        let envelope = Envelope::new("order", json!({"orderId": "1"}));
        let delivered = hub
            .broadcast(&envelope, &tags(&["orders", "kafka", "all"]))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(
            orders_rx.try_recv().unwrap().transaction_id,
            envelope.transaction_id
        );
        assert!(logs_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wildcard_observer_receives_everything() {
        let hub = FanoutHub::default();
        let (_handle, mut rx) = hub.attach("firehose", topic_set(&["*"])).await;

        let envelope = Envelope::new("order", json!({}));
        assert_eq!(hub.broadcast(&envelope, &tags(&["orders", "kafka", "all"])).await, 1);
        assert_eq!(hub.broadcast(&envelope, &tags(&["logs", "kafka", "all"])).await, 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_update_topics_changes_matching() {
        let hub = FanoutHub::default();
        let (handle, mut rx) = hub.attach("observer", topic_set(&["orders"])).await;

        assert!(
            hub.update_topics(&handle, &tags(&["logs"]), &tags(&["orders"]))
                .await
        );

        let envelope = Envelope::new("log", json!({}));
        assert_eq!(hub.broadcast(&envelope, &tags(&["orders"])).await, 0);
        assert_eq!(hub.broadcast(&envelope, &tags(&["logs"])).await, 1);
        assert!(rx.try_recv().is_ok());

        let unknown = ObserverHandle(Ulid::new());
        assert!(!hub.update_topics(&unknown, &[], &[]).await);
    }

    #[tokio::test]
    async fn test_detach_stops_delivery() {
        let hub = FanoutHub::default();
        let (handle, _rx) = hub.attach("observer", topic_set(&["orders"])).await;
        assert_eq!(hub.observer_count().await, 1);

        hub.detach(&handle).await;
        assert_eq!(hub.observer_count().await, 0);

        let envelope = Envelope::new("order", json!({}));
        assert_eq!(hub.broadcast(&envelope, &tags(&["orders"])).await, 0);

        // Detaching twice is safe
        hub.detach(&handle).await;
    }

    #[tokio::test]
    async fn test_slow_observer_never_stalls_others() {
        let hub = FanoutHub::new(1);
        let (_slow, _slow_rx) = hub.attach("slow", topic_set(&["orders"])).await;
        let (_fast, mut fast_rx) = hub.attach("fast", topic_set(&["orders"])).await;

        let envelope = Envelope::new("order", json!({}));
        // First broadcast fills the slow observer's single-slot queue
        assert_eq!(hub.broadcast(&envelope, &tags(&["orders"])).await, 2);
        // Fast observer keeps draining; slow observer never does
        assert!(fast_rx.try_recv().is_ok());

        // Slow observer's queue is full now; delivery is skipped, not
        // retried, and the fast observer still receives
        assert_eq!(hub.broadcast(&envelope, &tags(&["orders"])).await, 1);
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_receiver_counts_as_skip() {
        let hub = FanoutHub::default();
        let (_gone, gone_rx) = hub.attach("gone", topic_set(&["orders"])).await;
        drop(gone_rx);

        let envelope = Envelope::new("order", json!({}));
        assert_eq!(hub.broadcast(&envelope, &tags(&["orders"])).await, 0);
    }
}
