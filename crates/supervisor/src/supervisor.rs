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

//! Connection supervisor - adapter lifecycle and reconnection
//!
//! ## Purpose
//! Owns one backend adapter's connection lifecycle: connect, detect loss,
//! reconnect after a fixed bounded delay, replay registered subscriptions
//! once the new connection is live, and drain on deliberate shutdown.
//!
//! ## State Machine
//! ```text
//! Disconnected → Connecting → Connected → Disconnected (on error)
//!                    ↑                         │
//!                    └──── after fixed delay ──┘
//! Draining → Disconnected (deliberate shutdown, never reconnects)
//! ```
//!
//! ## Invariants
//! - The connection state is owned and mutated exclusively here; adapters
//!   and the pipeline only read it through this supervisor
//! - At most one connect attempt is in flight per backend (mutex guard)
//! - Publishes while not `Connected` fail fast with `Unavailable` rather
//!   than queuing; callers own their retry policy

use indexmap::IndexMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streambridge_channel::{
    AckInfo, AdapterError, AdapterResult, BrokerAdapter, MessageHandler, PublishOptions,
    SubscriptionHandle,
};
use streambridge_core::{Destination, Protocol, WireMessage};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

/// Connection state of one supervised backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection; publishes fail fast.
    Disconnected,
    /// A single connect attempt is in flight.
    Connecting,
    /// Live connection; normal operation.
    Connected,
    /// Deliberate shutdown in progress; never reconnects.
    Draining,
}

impl ConnectionState {
    /// Lowercase label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Draining => "draining",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ReplayEntry {
    source: Destination,
    handler: MessageHandler,
    handle: SubscriptionHandle,
}

/// Supervises one backend adapter's connection.
///
/// Cheap to clone; all state is shared behind `Arc`s so reconnect tasks can
/// run detached.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    adapter: Arc<dyn BrokerAdapter>,
    state: Arc<RwLock<ConnectionState>>,
    connect_guard: Arc<Mutex<()>>,
    reconnecting: Arc<AtomicBool>,
    // IndexMap: replay happens in original registration order
    replay: Arc<RwLock<IndexMap<String, ReplayEntry>>>,
    reconnect_delay: Duration,
    drain_timeout: Duration,
}

impl ConnectionSupervisor {
    /// Create a supervisor over a (typically still disconnected) adapter.
    pub fn new(
        adapter: Arc<dyn BrokerAdapter>,
        reconnect_delay: Duration,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connect_guard: Arc::new(Mutex::new(())),
            reconnecting: Arc::new(AtomicBool::new(false)),
            replay: Arc::new(RwLock::new(IndexMap::new())),
            reconnect_delay,
            drain_timeout,
        }
    }

    /// Backend protocol this supervisor manages.
    pub fn protocol(&self) -> Protocol {
        self.adapter.protocol()
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Bring the connection up, retrying in the background on failure.
    ///
    /// Returns `Ok` once the first attempt succeeds; if it fails, the error
    /// is returned and the fixed-delay reconnect loop keeps trying.
    pub async fn start(&self) -> AdapterResult<()> {
        match self.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    backend = %self.protocol(),
                    error = %e,
                    "Initial connect failed, scheduling reconnection"
                );
                self.spawn_reconnect();
                Err(e)
            }
        }
    }

    /// Run exactly one connect attempt.
    ///
    /// Re-entry while another attempt is in flight is a no-op; the state
    /// machine moves `Disconnected → Connecting → Connected`, or back to
    /// `Disconnected` on failure.
    pub async fn connect(&self) -> AdapterResult<()> {
        // Single-flight: a second caller while Connecting backs off
        let _guard = match self.connect_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(backend = %self.protocol(), "Connect attempt already in flight");
                return Ok(());
            }
        };

        {
            let mut state = self.state.write().await;
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Draining => {
                    return Err(AdapterError::Closed("supervisor is draining".to_string()))
                }
                _ => *state = ConnectionState::Connecting,
            }
        }

        match self.adapter.connect().await {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                info!(backend = %self.protocol(), "Backend connection established");
                self.replay_subscriptions().await;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Publish through the live connection.
    ///
    /// ## Errors
    /// - [`AdapterError::Unavailable`] immediately when not `Connected`
    /// - adapter errors otherwise; a connection-loss error also triggers
    ///   the reconnect path
    pub async fn publish(
        &self,
        destination: &Destination,
        message: WireMessage,
        options: &PublishOptions,
    ) -> AdapterResult<AckInfo> {
        if self.state().await != ConnectionState::Connected {
            return Err(AdapterError::Unavailable(format!(
                "{} backend is {}",
                self.protocol(),
                self.state().await
            )));
        }

        match self.adapter.publish(destination, message, options).await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                if e.is_connection_loss() {
                    self.connection_lost().await;
                }
                Err(e)
            }
        }
    }

    /// Register a durable consumer, now if connected and again after every
    /// reconnect. Idempotent per source.
    pub async fn subscribe(
        &self,
        source: &Destination,
        handler: MessageHandler,
    ) -> AdapterResult<SubscriptionHandle> {
        let mut replay = self.replay.write().await;
        if let Some(existing) = replay.get(&source.name) {
            return Ok(existing.handle.clone());
        }

        let handle = if self.state().await == ConnectionState::Connected {
            self.adapter.subscribe(source, Arc::clone(&handler)).await?
        } else {
            // Provisional handle; the consumer is created on replay
            SubscriptionHandle {
                id: Ulid::new().to_string(),
                source: source.name.clone(),
            }
        };

        replay.insert(
            source.name.clone(),
            ReplayEntry {
                source: source.clone(),
                handler,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    /// Deregister a consumer and release backend resources. Safe to call
    /// twice.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> AdapterResult<()> {
        self.replay.write().await.shift_remove(&handle.source);
        self.adapter.unsubscribe(handle).await
    }

    /// Deregister the consumer bound to `source_name`, if any. Safe to call
    /// for unknown sources.
    pub async fn unsubscribe_source(&self, source_name: &str) -> AdapterResult<()> {
        let entry = self.replay.write().await.shift_remove(source_name);
        match entry {
            Some(entry) => self.adapter.unsubscribe(&entry.handle).await,
            None => Ok(()),
        }
    }

    /// Report an unexpected connection loss observed outside a publish
    /// (e.g. a consume loop error); begins the reconnect cycle.
    pub async fn connection_lost(&self) {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Connected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        error!(
            backend = %self.protocol(),
            "Backend connection lost unexpectedly, scheduling reconnection"
        );
        self.spawn_reconnect();
    }

    /// Deliberate shutdown: close consumers, then the producer channel and
    /// transport, each under the bounded drain timeout.
    pub async fn drain(&self) {
        *self.state.write().await = ConnectionState::Draining;

        let handles: Vec<SubscriptionHandle> = {
            let replay = self.replay.read().await;
            replay.values().map(|entry| entry.handle.clone()).collect()
        };
        for handle in handles {
            match timeout(self.drain_timeout, self.adapter.unsubscribe(&handle)).await {
                Ok(Ok(())) => debug!(backend = %self.protocol(), source = %handle.source, "Consumer closed"),
                Ok(Err(e)) => warn!(backend = %self.protocol(), source = %handle.source, error = %e, "Consumer close failed"),
                Err(_) => warn!(
                    backend = %self.protocol(),
                    source = %handle.source,
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Consumer close timed out, force-closing"
                ),
            }
        }
        self.replay.write().await.clear();

        match timeout(self.drain_timeout, self.adapter.close()).await {
            Ok(Ok(())) => info!(backend = %self.protocol(), "Backend connection drained"),
            Ok(Err(e)) => warn!(backend = %self.protocol(), error = %e, "Backend close failed"),
            Err(_) => warn!(
                backend = %self.protocol(),
                timeout_secs = self.drain_timeout.as_secs(),
                "Backend close timed out, force-closing"
            ),
        }

        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Re-register every known subscription on the fresh connection.
    async fn replay_subscriptions(&self) {
        let sources: Vec<(Destination, MessageHandler)> = {
            let replay = self.replay.read().await;
            replay
                .values()
                .map(|entry| (entry.source.clone(), Arc::clone(&entry.handler)))
                .collect()
        };

        for (source, handler) in sources {
            match self.adapter.subscribe(&source, handler).await {
                Ok(handle) => {
                    if let Some(entry) = self.replay.write().await.get_mut(&source.name) {
                        entry.handle = handle;
                    }
                    info!(backend = %self.protocol(), source = %source, "Subscription replayed");
                }
                Err(e) => {
                    error!(
                        backend = %self.protocol(),
                        source = %source,
                        error = %e,
                        "Subscription replay failed"
                    );
                }
            }
        }
    }

    /// Spawn the fixed-delay reconnect loop, at most one per supervisor.
    fn spawn_reconnect(&self) {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let supervisor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(supervisor.reconnect_delay).await;

                match supervisor.state().await {
                    ConnectionState::Draining | ConnectionState::Connected => break,
                    _ => {}
                }

                match supervisor.connect().await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(
                            backend = %supervisor.protocol(),
                            error = %e,
                            delay_secs = supervisor.reconnect_delay.as_secs(),
                            "Reconnect attempt failed, retrying after fixed delay"
                        );
                    }
                }
            }
            supervisor.reconnecting.store(false, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
        assert_eq!(ConnectionState::Draining.as_str(), "draining");
    }
}
