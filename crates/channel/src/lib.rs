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

//! # StreamBridge Channel
//!
//! ## Purpose
//! Broker adapter layer: one publish/subscribe contract
//! ([`BrokerAdapter`]) with a backend per broker protocol, so the delivery
//! pipeline is agnostic of partition/offset vs. exchange/routing-key/ack
//! semantics.
//!
//! ## Key Components
//! - [`BrokerAdapter`]: common contract (publish, subscribe, unsubscribe)
//! - [`KafkaAdapter`]: partitioned log backend (feature `kafka-backend`)
//! - [`QueueAdapter`]: AMQP queue/exchange backend (feature `amqp-backend`)
//! - [`MockAdapter`]: scriptable in-memory backend for tests
//!
//! ## Extensibility
//! Backends are feature-gated so deployments bridging a single broker do
//! not link the other client library.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod adapter;
pub mod mock_backend;
pub mod observability;

#[cfg(feature = "kafka-backend")]
mod kafka_backend;

#[cfg(feature = "amqp-backend")]
mod amqp_backend;

pub use adapter::*;
pub use mock_backend::{CapturedPublish, MockAdapter, MockFailure};

#[cfg(feature = "kafka-backend")]
pub use kafka_backend::KafkaAdapter;

#[cfg(feature = "amqp-backend")]
pub use amqp_backend::QueueAdapter;
