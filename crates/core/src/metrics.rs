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

//! Metrics emission collaborator
//!
//! The pipeline records publish/consume outcomes and operation latency
//! through this narrow trait. The default implementation emits to the
//! `metrics` facade; tests use [`NoopMetrics`].

use crate::destination::Protocol;
use metrics::{counter, histogram};
use std::time::Instant;

/// Outcome label attached to publish/consume counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStatus {
    /// Operation completed.
    Success,
    /// Operation failed.
    Failure,
}

impl MetricStatus {
    fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Success => "success",
            MetricStatus::Failure => "failure",
        }
    }
}

/// Running latency measurement returned by [`BridgeMetrics::start_timer`].
///
/// Call [`OperationTimer::stop`] when the operation finishes; dropping the
/// timer without stopping records nothing.
pub struct OperationTimer {
    start: Instant,
    protocol: &'static str,
    destination: String,
    message_type: String,
    operation: &'static str,
    enabled: bool,
}

impl OperationTimer {
    /// Stop the timer and record the elapsed duration with an error flag.
    pub fn stop(self, is_error: bool) {
        if !self.enabled {
            return;
        }
        histogram!(
            "streambridge_operation_duration_seconds",
            "protocol" => self.protocol,
            "destination" => self.destination,
            "message_type" => self.message_type,
            "operation" => self.operation,
            "error" => if is_error { "true" } else { "false" },
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

/// Metrics collaborator consumed by the delivery pipeline.
pub trait BridgeMetrics: Send + Sync {
    /// Count one publish attempt.
    fn record_publish(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        status: MetricStatus,
    );

    /// Count one consume attempt.
    fn record_consume(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        status: MetricStatus,
    );

    /// Start a latency timer for one operation.
    fn start_timer(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        operation: &'static str,
    ) -> OperationTimer;
}

/// Emits through the `metrics` facade; whatever recorder the binary installs
/// (Prometheus exporter, statsd, ...) receives the series.
pub struct FacadeMetrics;

impl BridgeMetrics for FacadeMetrics {
    fn record_publish(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        status: MetricStatus,
    ) {
        counter!(
            "streambridge_publish_total",
            "protocol" => protocol.as_str(),
            "destination" => destination.to_string(),
            "message_type" => message_type.to_string(),
            "status" => status.as_str(),
        )
        .increment(1);
    }

    fn record_consume(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        status: MetricStatus,
    ) {
        counter!(
            "streambridge_consume_total",
            "protocol" => protocol.as_str(),
            "destination" => destination.to_string(),
            "message_type" => message_type.to_string(),
            "status" => status.as_str(),
        )
        .increment(1);
    }

    fn start_timer(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        operation: &'static str,
    ) -> OperationTimer {
        OperationTimer {
            start: Instant::now(),
            protocol: protocol.as_str(),
            destination: destination.to_string(),
            message_type: message_type.to_string(),
            operation,
            enabled: true,
        }
    }
}

/// Records nothing; for tests and metric-less deployments.
pub struct NoopMetrics;

impl BridgeMetrics for NoopMetrics {
    fn record_publish(&self, _: Protocol, _: &str, _: &str, _: MetricStatus) {}

    fn record_consume(&self, _: Protocol, _: &str, _: &str, _: MetricStatus) {}

    fn start_timer(
        &self,
        protocol: Protocol,
        destination: &str,
        message_type: &str,
        operation: &'static str,
    ) -> OperationTimer {
        OperationTimer {
            start: Instant::now(),
            protocol: protocol.as_str(),
            destination: destination.to_string(),
            message_type: message_type.to_string(),
            operation,
            enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_timer_records_nothing_on_stop() {
        let timer = NoopMetrics.start_timer(Protocol::Kafka, "orders", "order", "publish");
        // Must not panic without an installed recorder
        timer.stop(false);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(MetricStatus::Success.as_str(), "success");
        assert_eq!(MetricStatus::Failure.as_str(), "failure");
    }
}
