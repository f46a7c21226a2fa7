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

//! Adapter observability helpers
//!
//! ## Purpose
//! Shared structured-logging helpers for settle, retry, and dead-letter
//! events, so both backends and the recovery path emit the same fields and
//! alerting can filter on them uniformly.

use crate::adapter::HandlerOutcome;
use streambridge_core::Protocol;
use tracing::{debug, warn};

/// Record how one inbound delivery was settled with the broker.
pub fn record_settled(
    protocol: Protocol,
    source: &str,
    transaction_id: &str,
    outcome: HandlerOutcome,
) {
    match outcome {
        HandlerOutcome::Processed => debug!(
            protocol = %protocol,
            source = %source,
            transaction_id = %transaction_id,
            operation = "ack",
            "Message processed and settled"
        ),
        HandlerOutcome::Recovered => debug!(
            protocol = %protocol,
            source = %source,
            transaction_id = %transaction_id,
            operation = "nack-no-requeue",
            "Message handed to failure recovery and settled"
        ),
        HandlerOutcome::Failed => warn!(
            protocol = %protocol,
            source = %source,
            transaction_id = %transaction_id,
            operation = "nack-requeue",
            "Recovery hand-off failed, leaving message for broker redelivery"
        ),
    }
}

/// Record one retry re-publish.
pub fn record_retry(
    protocol: Protocol,
    source: &str,
    transaction_id: &str,
    retry_count: u32,
    delay_secs: u64,
) {
    debug!(
        protocol = %protocol,
        source = %source,
        transaction_id = %transaction_id,
        retry_count = retry_count,
        delay_secs = delay_secs,
        operation = "retry",
        "Message scheduled for retry"
    );
}

/// Record one terminal dead-letter hand-off. DLQ is a significant event,
/// so this logs at warn severity with fields for alerting.
pub fn record_dead_letter(protocol: Protocol, source: &str, transaction_id: &str, reason: &str) {
    warn!(
        protocol = %protocol,
        source = %source,
        transaction_id = %transaction_id,
        reason = %reason,
        operation = "dlq",
        "Message moved to dead-letter destination"
    );
}
