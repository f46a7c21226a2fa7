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

//! # StreamBridge Core
//!
//! ## Purpose
//! Shared vocabulary of the bridge: the envelope model and its wire codec,
//! destination parsing, the error taxonomy, environment-sourced
//! configuration, and the narrow collaborator traits (validation, metrics)
//! the delivery pipeline calls out through.
//!
//! ## Key Components
//! - [`Envelope`]: payload + ordered headers + transaction id
//! - [`EnvelopeCodec`]: JSON serialization with optional AES-256-GCM
//! - [`Destination`] / [`Protocol`]: scheme-prefixed routing targets
//! - [`BridgeError`]: caller-visible error taxonomy
//! - [`BridgeConfig`]: every recognized environment knob
//!
//! ## Dependents
//! Used by `streambridge-channel` (adapters), `streambridge-supervisor`
//! (connection lifecycle), and `streambridge-node` (pipeline, recovery,
//! fan-out).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod destination;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod validate;

pub use codec::{CodecError, CodecResult, EncryptionKey, EnvelopeCodec, WireMessage};
pub use config::{AmqpSettings, BridgeConfig, ConfigError, KafkaSettings};
pub use destination::{Destination, DestinationError, Protocol};
pub use envelope::{headers, Encoding, Envelope};
pub use error::{BridgeError, BridgeResult};
pub use metrics::{BridgeMetrics, FacadeMetrics, MetricStatus, NoopMetrics, OperationTimer};
pub use validate::{MessageValidator, NoopValidator, ValidationOutcome};
