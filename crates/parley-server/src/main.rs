//! # parley-server
//!
//! Chat backend for Parley.
//!
//! This binary provides:
//! - **REST API** (axum) for listing contacts and sending, fetching and
//!   deleting direct messages
//! - **Event socket** (`/socket`) that pushes new messages, notifications,
//!   deletions and the online roster to connected clients
//! - **Call signaling relay** forwarding offer/answer/candidate payloads
//!   between two peers over their sockets
//! - **Image storage** for message attachments

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod gateway;
mod messages;
mod presence;
mod signaling;
mod storage;

use std::sync::Arc;

use parley_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::gateway::Gateway;
use crate::presence::PresenceRegistry;
use crate::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let storage = Storage::new(db, config.storage_timeout);

    let blob_store = Arc::new(
        BlobStore::new(config.blob_storage_path.clone(), config.max_blob_size).await?,
    );

    // Presence starts empty on every boot.
    let gateway = Gateway::new(PresenceRegistry::new(), config.event_queue_capacity);
    let _roster_fanout = gateway.spawn_roster_fanout();

    let http_addr = config.http_addr;
    let app_state = AppState::new(config, storage, gateway, blob_store);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
