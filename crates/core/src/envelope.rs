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

//! Envelope - the unit of data carried through the bridge pipeline
//!
//! ## Purpose
//! Defines the message envelope that both broker adapters produce and consume:
//! payload plus an ordered header map plus the transaction id that correlates
//! one logical delivery (and all of its retries) across logs and metrics.
//!
//! ## Invariants
//! - `transaction_id` is assigned exactly once when the envelope enters the
//!   pipeline and is never regenerated; retries increment the
//!   [`headers::RETRY_COUNT`] header instead
//! - `headers` preserves insertion order so audit trails read deterministically

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Well-known header names carried on every wire message.
///
/// Headers stay plaintext even when the payload is encrypted, so the retry
/// and DLQ machinery can route failed messages without decrypting them.
pub mod headers {
    /// Correlates one logical delivery attempt-chain end-to-end.
    pub const TRANSACTION_ID: &str = "x-transaction-id";
    /// Logical message type used for schema validation.
    pub const MESSAGE_TYPE: &str = "x-message-type";
    /// RFC 3339 creation timestamp, stamped at pipeline entry.
    pub const CREATED_AT: &str = "x-created-at";
    /// Payload encoding marker: `plain` or `encrypted`.
    pub const ENCODING: &str = "x-encoding";
    /// Authenticated principal id, for audit only.
    pub const PRINCIPAL_ID: &str = "x-principal-id";
    /// Number of completed retry attempts; absent means zero.
    pub const RETRY_COUNT: &str = "x-retry-count";
    /// RFC 3339 timestamp the retry worker should re-publish at or after.
    pub const RETRY_AT: &str = "x-retry-at";
    /// Source destination a retried/dead-lettered message came from.
    pub const RETRY_SOURCE: &str = "x-retry-source";
    /// Last processing error that sent the message into recovery.
    pub const ERROR_REASON: &str = "x-error-reason";
    /// RFC 3339 timestamp of the terminal DLQ hand-off.
    pub const MOVED_TO_DLQ: &str = "x-moved-to-dlq";
    /// Terminal status marker set on dead-lettered messages.
    pub const FINAL_STATUS: &str = "x-final-status";
}

/// Payload encoding applied by the codec.
///
/// The switch is pipeline-wide, not per-message: producer and consumer must
/// agree on it out of band, and the marker header only records which mode
/// produced a given wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Payload bytes are plain serialized JSON.
    #[default]
    Plain,
    /// Payload bytes are AES-256-GCM nonce + tag + ciphertext.
    Encrypted,
}

impl Encoding {
    /// Wire representation used in the [`headers::ENCODING`] header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Plain => "plain",
            Encoding::Encrypted => "encrypted",
        }
    }

    /// Parse the wire representation; unknown markers are treated as plain.
    pub fn parse(value: &str) -> Self {
        match value {
            "encrypted" => Encoding::Encrypted,
            _ => Encoding::Plain,
        }
    }
}

/// The unit of data carried through the pipeline.
///
/// ## Lifecycle
/// Created by the delivery pipeline on publish, or reconstructed by the
/// codec from an adapter's inbound wire message. Destroyed after fan-out
/// and ack; the only trail it leaves is the retry/DLQ re-publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per logical delivery attempt-chain; never regenerated on retry.
    pub transaction_id: String,
    /// Logical message type, resolved against the schema catalog by callers.
    pub message_type: String,
    /// Structured payload; serialized to bytes by the codec.
    pub payload: serde_json::Value,
    /// Application headers, insertion-ordered. Well-known names live in
    /// [`headers`]; everything here rides along on the wire unencrypted.
    pub headers: IndexMap<String, String>,
    /// Stamped once at pipeline entry.
    pub created_at: DateTime<Utc>,
    /// Encoding the codec applied to the payload on the wire.
    pub encoding: Encoding,
}

impl Envelope {
    /// Create an envelope with a freshly assigned transaction id.
    pub fn new(message_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            transaction_id: Ulid::new().to_string(),
            message_type: message_type.into(),
            payload,
            headers: IndexMap::new(),
            created_at: Utc::now(),
            encoding: Encoding::Plain,
        }
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Read a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Builder-style header attachment.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Number of completed retry attempts, read from the retry-count header.
    ///
    /// Absent or unparseable values count as zero, matching the recovery
    /// path's default for first-time failures.
    pub fn retry_count(&self) -> u32 {
        self.header(headers::RETRY_COUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_assigns_transaction_id() {
        let a = Envelope::new("order", json!({"orderId": "1"}));
        let b = Envelope::new("order", json!({"orderId": "1"}));
        assert!(!a.transaction_id.is_empty());
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(a.encoding, Encoding::Plain);
    }

    #[test]
    fn test_retry_count_defaults_to_zero() {
        let envelope = Envelope::new("order", json!({}));
        assert_eq!(envelope.retry_count(), 0);

        let envelope = envelope.with_header(headers::RETRY_COUNT, "2");
        assert_eq!(envelope.retry_count(), 2);

        let envelope = envelope.with_header(headers::RETRY_COUNT, "not-a-number");
        assert_eq!(envelope.retry_count(), 0);
    }

    #[test]
    fn test_headers_preserve_insertion_order() {
        let mut envelope = Envelope::new("order", json!({}));
        envelope.set_header("first", "1");
        envelope.set_header("second", "2");
        envelope.set_header("third", "3");

        let names: Vec<&str> = envelope.headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_encoding_round_trip() {
        assert_eq!(Encoding::parse(Encoding::Encrypted.as_str()), Encoding::Encrypted);
        assert_eq!(Encoding::parse(Encoding::Plain.as_str()), Encoding::Plain);
        assert_eq!(Encoding::parse("unknown"), Encoding::Plain);
    }
}
