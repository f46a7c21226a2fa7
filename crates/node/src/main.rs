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

//! StreamBridge daemon entrypoint
//!
//! Loads configuration from the environment, assembles the bridge, starts
//! both backend connections, registers the configured consume sources, and
//! drains gracefully on SIGINT/SIGTERM.
//!
//! `CONSUME_SOURCES` is a comma list of scheme-prefixed sources, e.g.
//! `CONSUME_SOURCES="kafka://orders,queue://billing"`.

use anyhow::Context;
use streambridge_core::BridgeConfig;
use streambridge_node::BridgeBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = BridgeConfig::from_env().context("loading configuration")?;
    info!(
        max_retries = config.max_retries,
        validate = config.validate_messages,
        encrypt = config.encrypt_messages,
        error_prefix = %config.error_prefix,
        "Starting StreamBridge"
    );

    let bridge = BridgeBuilder::new(config)
        .build()
        .context("assembling bridge")?;
    bridge.start().await;

    if let Ok(sources) = std::env::var("CONSUME_SOURCES") {
        for source in sources.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match bridge.subscribe(source).await {
                Ok(handle) => info!(source = %source, subscription = %handle.id, "Consuming"),
                Err(e) => error!(source = %source, error = %e, "Subscription failed"),
            }
        }
    } else {
        warn!("CONSUME_SOURCES not set; bridge is publish-only");
    }

    wait_for_shutdown_signal().await;
    bridge.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("installing SIGTERM handler failed");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt, shutting down");
    }
}
