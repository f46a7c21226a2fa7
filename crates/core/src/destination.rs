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

//! Destination parsing and protocol selection
//!
//! ## Purpose
//! Destinations enter the pipeline as scheme-prefixed strings
//! (`"kafka://orders"`, `"queue://billing"`). They are parsed exactly once
//! at pipeline entry and stay immutable for the life of one operation; the
//! protocol selects the broker adapter, never runtime inspection of payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a destination string cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// Scheme is present but names no known broker protocol.
    #[error("Unknown protocol '{0}', expected 'kafka' or 'queue'")]
    UnknownProtocol(String),

    /// The destination name is empty.
    #[error("Destination name is empty in '{0}'")]
    EmptyName(String),
}

/// Broker backend a destination routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Partitioned log broker with offset-based consumption.
    Kafka,
    /// AMQP-style queue/exchange broker with explicit ack/nack.
    Queue,
}

impl Protocol {
    /// Literal protocol string used in destination URIs, metrics labels,
    /// and fan-out topic tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Kafka => "kafka",
            Protocol::Queue => "queue",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed publish/consume target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// Backend the adapter is selected by.
    pub protocol: Protocol,
    /// Topic name (log broker) or queue/exchange name (queue broker).
    pub name: String,
    /// Routing key for exchange-based publishing; `None` publishes straight
    /// to the named queue or topic.
    pub routing_key: Option<String>,
}

impl Destination {
    /// Create a destination without a routing key.
    pub fn new(protocol: Protocol, name: impl Into<String>) -> Self {
        Self {
            protocol,
            name: name.into(),
            routing_key: None,
        }
    }

    /// Attach a routing key (queue protocol: publish through an exchange).
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    /// Parse `"<protocol>://<name>"`; a missing scheme defaults to the
    /// log-broker protocol.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, name) = match s.split_once("://") {
            Some(("kafka", name)) => (Protocol::Kafka, name),
            Some(("queue", name)) | Some(("amqp", name)) => (Protocol::Queue, name),
            Some((scheme, _)) => return Err(DestinationError::UnknownProtocol(scheme.to_string())),
            None => (Protocol::Kafka, s),
        };

        if name.is_empty() {
            return Err(DestinationError::EmptyName(s.to_string()));
        }

        Ok(Destination::new(protocol, name))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.name)
    }
}
