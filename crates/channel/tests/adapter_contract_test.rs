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

//! Adapter contract tests over the mock backend
//!
//! Exercises the behaviors every backend must share: connection gating,
//! idempotent subscription, double unsubscribe, settle outcomes, and
//! in-order delivery — without requiring a broker process.

use futures::FutureExt;
use indexmap::IndexMap;
use std::sync::Arc;
use streambridge_channel::{
    AdapterError, BrokerAdapter, HandlerOutcome, MessageHandler, MockAdapter, MockFailure,
    PublishOptions,
};
use streambridge_core::{Destination, Protocol, WireMessage};
use tokio::sync::Mutex;

fn wire_with_id(id: &str) -> WireMessage {
    let mut headers = IndexMap::new();
    headers.insert("x-transaction-id".to_string(), id.to_string());
    WireMessage {
        body: b"{}".to_vec(),
        headers,
    }
}

#[tokio::test]
async fn test_publish_fails_fast_when_disconnected() {
    let adapter = MockAdapter::new(Protocol::Kafka);
    let dest = Destination::new(Protocol::Kafka, "orders");

    let started = std::time::Instant::now();
    let result = adapter
        .publish(&dest, wire_with_id("t-1"), &PublishOptions::default())
        .await;

    assert!(matches!(result, Err(AdapterError::Unavailable(_))));
    // Fail-fast: no blocking while the backend is down
    assert!(started.elapsed() < std::time::Duration::from_millis(100));
}

#[tokio::test]
async fn test_second_subscribe_returns_existing_handle() {
    let adapter = MockAdapter::connected(Protocol::Kafka);
    let source = Destination::new(Protocol::Kafka, "orders");
    let handler: MessageHandler = Arc::new(|_msg| async { HandlerOutcome::Processed }.boxed());

    let first = adapter.subscribe(&source, Arc::clone(&handler)).await.unwrap();
    let second = adapter.subscribe(&source, handler).await.unwrap();

    assert_eq!(first, second, "idempotent registration must reuse the handle");
    assert_eq!(adapter.subscription_count().await, 1);

    // A different source gets its own consumer
    let other = Destination::new(Protocol::Kafka, "logs");
    let handler: MessageHandler = Arc::new(|_msg| async { HandlerOutcome::Processed }.boxed());
    let third = adapter.subscribe(&other, handler).await.unwrap();
    assert_ne!(first, third);
    assert_eq!(adapter.subscription_count().await, 2);
}

#[tokio::test]
async fn test_unsubscribe_releases_and_is_reentrant() {
    let adapter = MockAdapter::connected(Protocol::Queue);
    let source = Destination::new(Protocol::Queue, "billing");
    let handler: MessageHandler = Arc::new(|_msg| async { HandlerOutcome::Processed }.boxed());

    let handle = adapter.subscribe(&source, handler).await.unwrap();
    adapter.unsubscribe(&handle).await.unwrap();
    adapter.unsubscribe(&handle).await.unwrap();

    assert_eq!(adapter.subscription_count().await, 0);
    assert_eq!(adapter.deliver("billing", wire_with_id("t-1")).await, None);
}

#[tokio::test]
async fn test_delivery_preserves_arrival_order() {
    let adapter = MockAdapter::connected(Protocol::Kafka);
    let source = Destination::new(Protocol::Kafka, "orders");

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_handler = Arc::clone(&seen);
    let handler: MessageHandler = Arc::new(move |msg| {
        let seen = Arc::clone(&seen_in_handler);
        async move {
            let id = msg
                .wire
                .header("x-transaction-id")
                .unwrap_or_default()
                .to_string();
            seen.lock().await.push(id);
            HandlerOutcome::Processed
        }
        .boxed()
    });
    adapter.subscribe(&source, handler).await.unwrap();

    for i in 0..5 {
        adapter
            .deliver("orders", wire_with_id(&format!("t-{}", i)))
            .await
            .unwrap();
    }

    let seen = seen.lock().await;
    assert_eq!(*seen, vec!["t-0", "t-1", "t-2", "t-3", "t-4"]);
}

#[tokio::test]
async fn test_rejected_publish_does_not_mark_connection_lost() {
    let adapter = MockAdapter::connected(Protocol::Queue);
    let dest = Destination::new(Protocol::Queue, "billing");

    adapter.fail_next_publish(MockFailure::Reject).await;
    let error = adapter
        .publish(&dest, wire_with_id("t-1"), &PublishOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, AdapterError::Rejected(_)));
    assert!(!error.is_connection_loss());
    assert!(adapter.is_connected());
}

#[tokio::test]
async fn test_stats_track_settle_outcomes() {
    let adapter = MockAdapter::connected(Protocol::Kafka);
    let source = Destination::new(Protocol::Kafka, "orders");
    let handler: MessageHandler = Arc::new(|msg| {
        async move {
            match msg.wire.header("x-transaction-id") {
                Some("poison") => HandlerOutcome::Failed,
                _ => HandlerOutcome::Processed,
            }
        }
        .boxed()
    });
    adapter.subscribe(&source, handler).await.unwrap();

    adapter.deliver("orders", wire_with_id("ok-1")).await.unwrap();
    adapter.deliver("orders", wire_with_id("poison")).await.unwrap();
    adapter.deliver("orders", wire_with_id("ok-2")).await.unwrap();

    let stats = adapter.stats().await;
    assert_eq!(stats.consumed, 3);
    assert_eq!(stats.acked, 2);
    assert_eq!(stats.failed, 1);
}
