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

//! # StreamBridge Supervisor
//!
//! ## Purpose
//! Connection-resilience layer: one [`ConnectionSupervisor`] per backend
//! owns that adapter's connect/reconnect/drain lifecycle and replays
//! registered subscriptions after every reconnect. The pipeline publishes
//! and subscribes through the supervisor, never against a raw adapter.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod supervisor;

pub use supervisor::{ConnectionState, ConnectionSupervisor};
