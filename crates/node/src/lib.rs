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

//! # StreamBridge Node
//!
//! ## Purpose
//! The assembled bridge runtime: the delivery pipeline orchestrating both
//! message directions, failure recovery (retry with exponential backoff,
//! then DLQ), the real-time fan-out hub, and the builder that wires it all
//! from configuration.
//!
//! ## Control Flow
//! ```text
//! publish(dest, payload) ──▶ DeliveryPipeline ──▶ EnvelopeCodec.encode
//!        │                                             │
//!        ▼                                             ▼
//!   FanoutHub.broadcast ◀── on success ◀── ConnectionSupervisor.publish
//!
//! adapter callback ──▶ decode ──▶ validate ──▶ fan-out ──▶ settle
//!        │ (any failure)
//!        ▼
//!   FailureRecovery ──▶ <prefix>.retry (backoff) or <prefix>.dlq (terminal)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bridge;
pub mod fanout;
pub mod pipeline;
pub mod recovery;

pub use bridge::{BridgeBuilder, MessageBridge};
pub use fanout::{FanoutHub, ObserverHandle, DEFAULT_OBSERVER_CAPACITY, WILDCARD_TOPIC};
pub use pipeline::{DeliveryPipeline, PublishParams, PublishReceipt, TOPIC_ALL};
pub use recovery::{
    disposition, FailureRecovery, RecoveryDisposition, RecoveryOutcome, RetryRecord,
};
