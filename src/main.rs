//! Denon/Marantz AVR control engine
//!
//! Runs one device handle from configuration and logs every published event
//! as JSON until interrupted.

use anyhow::Result;
use denon_control::bus::{create_bus, BusEvent};
use denon_control::config;
use denon_control::device::{AvrClient, DeviceHandle, HttpTransport};
use denon_control::store::FileStore;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "denon_control=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting denon-control");

    let config = config::load_config()?;
    tracing::info!(?config, "Configuration loaded");

    let session = config.session();
    let transport = Arc::new(HttpTransport::new(&session)?);
    let store = Arc::new(FileStore::new(config.storage_dir()));
    let bus = create_bus();

    let client = Arc::new(AvrClient::new(
        session,
        transport,
        store,
        bus.clone(),
        Arc::new(config.tables()),
        config.client_options(),
    ));

    // Event log: the wire form consumers would see
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(wire) = event.to_wire() else { continue };
                    let json = match serde_json::to_string(&wire) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    // Raw documents are large and only matter to bridges
                    if wire.is_passthrough() {
                        tracing::debug!(event = wire.event_type(), "{}", json);
                    } else if wire.is_device_event() {
                        tracing::info!(event = wire.event_type(), lifecycle = true, "{}", json);
                    } else {
                        tracing::info!(event = wire.event_type(), "{}", json);
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = CancellationToken::new();
    let handle = DeviceHandle::new(client, bus.clone(), shutdown.clone(), config.polling.intervals());
    let runner = tokio::spawn(handle.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    bus.publish(BusEvent::ShuttingDown {
        reason: Some("interrupted".to_string()),
    });
    shutdown.cancel();
    runner.await??;

    Ok(())
}
