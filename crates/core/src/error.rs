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

//! Bridge error taxonomy
//!
//! ## Propagation policy
//! Publish-path errors are synchronous and returned to the immediate caller,
//! with variants distinguishable enough to tell "your input was invalid"
//! from "the broker is down" from "the broker refused it". Consume-path
//! errors ([`BridgeError::Decode`], [`BridgeError::Processing`]) are
//! absorbed into the retry/DLQ pipeline and never surfaced raw to
//! application code.

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::destination::DestinationError;
use thiserror::Error;

/// Errors visible at the bridge's call surface.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Payload failed schema validation under `require_validation`.
    /// Recoverable by the caller; the core never retries it.
    #[error("Validation failed for message type '{message_type}': {}", errors.join("; "))]
    ValidationFailed {
        /// Message type the payload was validated against.
        message_type: String,
        /// Validator-reported problems.
        errors: Vec<String>,
    },

    /// No live connection to the backend; the caller may retry the publish.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The backend explicitly refused the message (unroutable, missing
    /// exchange). Surfaced, not retried.
    #[error("Publish rejected by broker: {0}")]
    PublishRejected(String),

    /// Malformed or forged envelope on consume; routed into failure
    /// recovery as a processing failure.
    #[error(transparent)]
    Decode(#[from] CodecError),

    /// Handler-level failure during consume; routed into failure recovery.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Destination string could not be parsed.
    #[error(transparent)]
    InvalidDestination(#[from] DestinationError),

    /// Startup configuration problem.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// Result type for bridge call-surface operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
