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

//! End-to-end delivery pipeline tests over mock adapters: outbound
//! validation gating, broker error mapping, fan-out tagging, inbound
//! decode/fan-out/settle, and the encrypted round trip.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use streambridge_channel::{BrokerAdapter, HandlerOutcome, MockAdapter, MockFailure};
use streambridge_core::{
    headers, BridgeConfig, BridgeError, Encoding, EnvelopeCodec, Envelope, MessageValidator,
    NoopMetrics, Protocol, ValidationOutcome,
};
use streambridge_node::{BridgeBuilder, MessageBridge, PublishParams};

/// Schema collaborator used by these tests: type `order` requires an
/// `orderId` field.
struct OrderValidator;

impl MessageValidator for OrderValidator {
    fn validate(&self, message_type: &str, payload: &serde_json::Value) -> ValidationOutcome {
        if message_type == "order" && payload.get("orderId").is_none() {
            ValidationOutcome::invalid(vec!["missing required field 'orderId'".to_string()])
        } else {
            ValidationOutcome::ok()
        }
    }
}

struct Harness {
    bridge: MessageBridge,
    kafka: Arc<MockAdapter>,
    queue: Arc<MockAdapter>,
}

async fn harness_with(config: BridgeConfig) -> Harness {
    let kafka = MockAdapter::new(Protocol::Kafka);
    let queue = MockAdapter::new(Protocol::Queue);
    let bridge = BridgeBuilder::new(config)
        .with_validator(Arc::new(OrderValidator))
        .with_metrics(Arc::new(NoopMetrics))
        .with_kafka_adapter(kafka.clone())
        .with_queue_adapter(queue.clone())
        .build()
        .unwrap();
    bridge.start().await;
    Harness {
        bridge,
        kafka,
        queue,
    }
}

async fn harness() -> Harness {
    harness_with(BridgeConfig::default()).await
}

fn topic_set(topics: &[&str]) -> HashSet<String> {
    topics.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn test_publish_returns_receipt_with_transaction_id() {
    let h = harness().await;

    let receipt = h
        .bridge
        .publish(
            "kafka://orders",
            json!({"orderId": "1"}),
            PublishParams::for_type("order"),
        )
        .await
        .unwrap();

    assert!(receipt.success);
    assert!(!receipt.transaction_id.is_empty());
    assert!(receipt.ack.confirmed);

    let captured = h.kafka.published_to("orders").await;
    assert_eq!(captured.len(), 1);
    assert_eq!(
        captured[0].wire.header(headers::TRANSACTION_ID),
        Some(receipt.transaction_id.as_str())
    );
    assert_eq!(captured[0].wire.header(headers::MESSAGE_TYPE), Some("order"));
}

#[tokio::test]
async fn test_invalid_payload_with_require_validation_performs_no_broker_io() {
    let h = harness().await;

    let result = h
        .bridge
        .publish(
            "kafka://orders",
            json!({"items": []}),
            PublishParams {
                require_validation: true,
                ..PublishParams::for_type("order")
            },
        )
        .await;

    match result {
        Err(BridgeError::ValidationFailed {
            message_type,
            errors,
        }) => {
            assert_eq!(message_type, "order");
            assert_eq!(errors, vec!["missing required field 'orderId'"]);
        }
        other => panic!("expected ValidationFailed, got {:?}", other.map(|r| r.success)),
    }
    assert!(h.kafka.published().await.is_empty());
}

#[tokio::test]
async fn test_invalid_payload_without_require_validation_still_publishes() {
    let h = harness().await;

    let receipt = h
        .bridge
        .publish(
            "kafka://orders",
            json!({"items": []}),
            PublishParams::for_type("order"),
        )
        .await
        .unwrap();

    assert!(receipt.success);
    assert_eq!(h.kafka.published_to("orders").await.len(), 1);
}

#[tokio::test]
async fn test_destination_scheme_selects_adapter() {
    let h = harness().await;

    h.bridge
        .publish(
            "queue://billing",
            json!({"invoice": 7}),
            PublishParams::for_type("invoice"),
        )
        .await
        .unwrap();
    // No scheme defaults to the log broker
    h.bridge
        .publish(
            "audit",
            json!({"event": "login"}),
            PublishParams::for_type("audit"),
        )
        .await
        .unwrap();

    assert_eq!(h.queue.published_to("billing").await.len(), 1);
    assert_eq!(h.kafka.published_to("audit").await.len(), 1);
    assert!(h.kafka.published_to("billing").await.is_empty());
}

#[tokio::test]
async fn test_disconnected_backend_maps_to_broker_unavailable() {
    let h = harness().await;
    h.kafka.set_connected(false);

    let started = std::time::Instant::now();
    let result = h
        .bridge
        .publish(
            "kafka://orders",
            json!({"orderId": "1"}),
            PublishParams::for_type("order"),
        )
        .await;

    assert!(matches!(result, Err(BridgeError::BrokerUnavailable(_))));
    assert!(started.elapsed() < std::time::Duration::from_millis(200));
}

#[tokio::test]
async fn test_rejected_publish_maps_to_publish_rejected() {
    let h = harness().await;
    h.queue.fail_next_publish(MockFailure::Reject).await;

    let result = h
        .bridge
        .publish(
            "queue://billing",
            json!({"invoice": 7}),
            PublishParams::for_type("invoice"),
        )
        .await;

    assert!(matches!(result, Err(BridgeError::PublishRejected(_))));
}

#[tokio::test]
async fn test_successful_publish_broadcasts_to_matching_observers() {
    let h = harness().await;
    let (_orders, mut orders_rx) = h
        .bridge
        .fanout()
        .attach("orders-observer", topic_set(&["orders"]))
        .await;
    let (_logs, mut logs_rx) = h
        .bridge
        .fanout()
        .attach("logs-observer", topic_set(&["logs"]))
        .await;
    let (_all, mut all_rx) = h
        .bridge
        .fanout()
        .attach("firehose", topic_set(&["*"]))
        .await;

    let receipt = h
        .bridge
        .publish(
            "kafka://orders",
            json!({"orderId": "1"}),
            PublishParams::for_type("order"),
        )
        .await
        .unwrap();

    let seen = orders_rx.try_recv().unwrap();
    assert_eq!(seen.transaction_id, receipt.transaction_id);
    // Observers get the decoded envelope, not wire bytes
    assert_eq!(seen.payload, json!({"orderId": "1"}));
    assert!(logs_rx.try_recv().is_err());
    assert!(all_rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_broadcast_false_skips_fanout() {
    let h = harness().await;
    let (_all, mut all_rx) = h
        .bridge
        .fanout()
        .attach("firehose", topic_set(&["*"]))
        .await;

    h.bridge
        .publish(
            "kafka://orders",
            json!({"orderId": "1"}),
            PublishParams {
                broadcast: false,
                ..PublishParams::for_type("order")
            },
        )
        .await
        .unwrap();

    assert!(all_rx.try_recv().is_err());
    assert_eq!(h.kafka.published_to("orders").await.len(), 1);
}

#[tokio::test]
async fn test_caller_supplied_transaction_id_is_propagated() {
    let h = harness().await;

    let mut params = PublishParams::for_type("order");
    params
        .headers
        .insert(headers::TRANSACTION_ID.to_string(), "txn-fixed".to_string());
    let receipt = h
        .bridge
        .publish("kafka://orders", json!({"orderId": "1"}), params)
        .await
        .unwrap();

    assert_eq!(receipt.transaction_id, "txn-fixed");
}

#[tokio::test]
async fn test_inbound_message_fans_out_and_settles() {
    let h = harness().await;
    h.bridge.subscribe("kafka://orders").await.unwrap();

    let (_observer, mut rx) = h
        .bridge
        .fanout()
        .attach("orders-observer", topic_set(&["orders"]))
        .await;

    let codec = EnvelopeCodec::plaintext();
    let envelope = Envelope::new("order", json!({"orderId": "42"}));
    let wire = codec.encode(&envelope).unwrap();

    let outcome = h.kafka.deliver("orders", wire).await;
    assert_eq!(outcome, Some(HandlerOutcome::Processed));

    let seen = rx.try_recv().unwrap();
    assert_eq!(seen.transaction_id, envelope.transaction_id);
    assert_eq!(seen.payload, json!({"orderId": "42"}));
}

#[tokio::test]
async fn test_unsubscribe_stops_consumption() {
    let h = harness().await;
    h.bridge.subscribe("kafka://orders").await.unwrap();
    assert_eq!(h.kafka.subscription_count().await, 1);

    h.bridge.unsubscribe("kafka://orders").await.unwrap();
    assert_eq!(h.kafka.subscription_count().await, 0);

    // Unknown source is a no-op
    h.bridge.unsubscribe("kafka://orders").await.unwrap();
}

#[tokio::test]
async fn test_encrypted_pipeline_round_trip() {
    let config = BridgeConfig {
        encrypt_messages: true,
        encryption_key: Some([9u8; 32]),
        ..Default::default()
    };
    let h = harness_with(config).await;
    h.bridge.subscribe("kafka://orders").await.unwrap();
    let (_observer, mut rx) = h
        .bridge
        .fanout()
        .attach("orders-observer", topic_set(&["orders"]))
        .await;

    let payload = json!({"orderId": "secret-1"});
    h.bridge
        .publish(
            "kafka://orders",
            payload.clone(),
            PublishParams::for_type("order"),
        )
        .await
        .unwrap();

    // On the wire the payload is ciphertext, marked as such
    let captured = h.kafka.published_to("orders").await;
    let plaintext = serde_json::to_vec(&payload).unwrap();
    assert_ne!(captured[0].wire.body, plaintext);
    assert_eq!(
        captured[0].wire.header(headers::ENCODING),
        Some(Encoding::Encrypted.as_str())
    );

    // The outbound broadcast carries the decoded envelope
    assert_eq!(rx.try_recv().unwrap().payload, payload);

    // Re-delivering the captured wire decodes back to the same payload
    let outcome = h
        .kafka
        .deliver("orders", captured[0].wire.clone())
        .await;
    assert_eq!(outcome, Some(HandlerOutcome::Processed));
    assert_eq!(rx.try_recv().unwrap().payload, payload);
}
