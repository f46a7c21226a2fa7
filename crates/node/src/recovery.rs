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

//! Failure recovery - retry with exponential backoff, then dead-letter
//!
//! ## Purpose
//! Every consume-side processing failure lands here. Below the retry bound
//! the message is re-published to the protocol's retry destination with an
//! incremented retry count and a computed `retry-at`; at the bound it is
//! re-published once to the DLQ with a terminal status and never retried
//! again.
//!
//! ## Delay Mechanism
//! - Queue backend: per-message TTL plus a dead-letter route back to the
//!   origin queue, so the broker itself re-delivers after the backoff
//! - Log backend: a dedicated retry topic; an external scheduled worker
//!   re-publishes at or after the `retry-at` header
//!
//! ## Idempotency
//! Re-invoking recovery for the same failure republishes with the same
//! transaction id (at-least-once); downstream consumers treat the
//! transaction id as their dedupe key.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use streambridge_channel::{observability, AdapterResult, PublishOptions};
use streambridge_core::{headers, BridgeConfig, Destination, Protocol, WireMessage};
use streambridge_supervisor::ConnectionSupervisor;
use tracing::warn;

/// What recovery decided to do with one failed message. The branch is a
/// pure function of the observed retry count, unit-testable without any
/// broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDisposition {
    /// Re-publish to the retry destination after the given backoff.
    Retry {
        /// Exponential backoff before the next attempt.
        delay: Duration,
    },
    /// Terminal: re-publish once to the dead-letter destination.
    DeadLetter,
}

/// Decide retry vs. dead-letter for a message observed failing with
/// `retry_count` completed attempts. Backoff is `2^retry_count` seconds.
pub fn disposition(retry_count: u32, max_retries: u32) -> RecoveryDisposition {
    if retry_count < max_retries {
        RecoveryDisposition::Retry {
            delay: Duration::from_secs(1u64 << retry_count),
        }
    } else {
        RecoveryDisposition::DeadLetter
    }
}

/// One scheduled retry, as published to the retry destination.
#[derive(Debug, Clone)]
pub struct RetryRecord {
    /// The wire message that failed (headers include the incremented count).
    pub wire: WireMessage,
    /// Backend the failure was observed on.
    pub source_protocol: Protocol,
    /// Retry count observed at failure time (strictly increasing until it
    /// reaches the bound).
    pub retry_count: u32,
    /// Earliest time the message should be re-delivered.
    pub next_attempt_at: DateTime<Utc>,
}

/// Outcome of one recovery invocation.
#[derive(Debug, Clone)]
pub enum RecoveryOutcome {
    /// Message was re-published for retry.
    Retried(RetryRecord),
    /// Message was dead-lettered; terminal.
    DeadLettered,
}

/// Routes failed messages to retry or DLQ destinations.
///
/// Holds no mutable state: each failure produces one self-contained
/// outbound publish, so no locking is required here.
pub struct FailureRecovery {
    config: Arc<BridgeConfig>,
    kafka: ConnectionSupervisor,
    queue: ConnectionSupervisor,
}

impl FailureRecovery {
    /// Create a recovery router over both backend supervisors.
    pub fn new(
        config: Arc<BridgeConfig>,
        kafka: ConnectionSupervisor,
        queue: ConnectionSupervisor,
    ) -> Self {
        Self {
            config,
            kafka,
            queue,
        }
    }

    fn supervisor_for(&self, protocol: Protocol) -> &ConnectionSupervisor {
        match protocol {
            Protocol::Kafka => &self.kafka,
            Protocol::Queue => &self.queue,
        }
    }

    /// Handle one processing failure from `source`.
    ///
    /// Reads the wire message's retry count (absent means zero), then either
    /// re-publishes an augmented copy to `<prefix>.retry` or, at the bound,
    /// re-publishes once to `<prefix>.dlq`. Failures are reported to the
    /// caller, never re-raised into the consume loop.
    pub async fn handle_failure(
        &self,
        source: &Destination,
        mut wire: WireMessage,
        reason: &str,
    ) -> AdapterResult<RecoveryOutcome> {
        let retry_count = wire.retry_count();
        let transaction_id = wire.transaction_id().unwrap_or("unknown").to_string();
        let supervisor = self.supervisor_for(source.protocol);

        match disposition(retry_count, self.config.max_retries) {
            RecoveryDisposition::Retry { delay } => {
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());

                wire.headers.insert(
                    headers::RETRY_COUNT.to_string(),
                    (retry_count + 1).to_string(),
                );
                wire.headers.insert(
                    headers::RETRY_AT.to_string(),
                    next_attempt_at.to_rfc3339(),
                );
                wire.headers
                    .insert(headers::RETRY_SOURCE.to_string(), source.to_string());
                wire.headers
                    .insert(headers::ERROR_REASON.to_string(), reason.to_string());

                let retry_destination = self.config.retry_destination(source.protocol);
                let options = PublishOptions {
                    persistent: true,
                    // Queue backend: broker-native delayed re-delivery via
                    // TTL + dead-letter back to the origin queue. The log
                    // backend ignores both fields; its retry topic is
                    // drained by an external scheduled worker.
                    expiration: Some(delay),
                    retry_origin: Some(source.name.clone()),
                    ..Default::default()
                };

                supervisor
                    .publish(&retry_destination, wire.clone(), &options)
                    .await?;
                observability::record_retry(
                    source.protocol,
                    &source.name,
                    &transaction_id,
                    retry_count,
                    delay.as_secs(),
                );

                Ok(RecoveryOutcome::Retried(RetryRecord {
                    wire,
                    source_protocol: source.protocol,
                    retry_count,
                    next_attempt_at,
                }))
            }
            RecoveryDisposition::DeadLetter => {
                wire.headers
                    .insert(headers::MOVED_TO_DLQ.to_string(), Utc::now().to_rfc3339());
                wire.headers
                    .insert(headers::FINAL_STATUS.to_string(), "failed".to_string());
                wire.headers
                    .insert(headers::RETRY_SOURCE.to_string(), source.to_string());
                wire.headers
                    .insert(headers::ERROR_REASON.to_string(), reason.to_string());

                let dlq_destination = self.config.dlq_destination(source.protocol);
                let options = PublishOptions {
                    persistent: true,
                    ..Default::default()
                };

                if let Err(e) = supervisor.publish(&dlq_destination, wire, &options).await {
                    warn!(
                        protocol = %source.protocol,
                        transaction_id = %transaction_id,
                        error = %e,
                        "Dead-letter publish failed"
                    );
                    return Err(e);
                }
                observability::record_dead_letter(
                    source.protocol,
                    &source.name,
                    &transaction_id,
                    reason,
                );
                Ok(RecoveryOutcome::DeadLettered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_retries_below_bound() {
        for count in 0..3 {
            assert!(matches!(
                disposition(count, 3),
                RecoveryDisposition::Retry { .. }
            ));
        }
    }

    #[test]
    fn test_disposition_dead_letters_at_bound() {
        assert_eq!(disposition(3, 3), RecoveryDisposition::DeadLetter);
        assert_eq!(disposition(4, 3), RecoveryDisposition::DeadLetter);
        assert_eq!(disposition(0, 0), RecoveryDisposition::DeadLetter);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let delays: Vec<u64> = (0..3)
            .map(|count| match disposition(count, 3) {
                RecoveryDisposition::Retry { delay } => delay.as_secs(),
                RecoveryDisposition::DeadLetter => panic!("expected retry"),
            })
            .collect();
        assert_eq!(delays, vec![1, 2, 4]);
    }
}
