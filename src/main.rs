//! WebSocket Messaging Hub - Entry Point
//!
//! Starts the ChatServer actor, the WebSocket listener and the HTTP API.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_hub::api::{self, ApiState};
use chat_hub::{handle_connection, Config, DiskBlobStore, HubHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_hub=info")),
        )
        .init();

    let config = Config::parse();

    let hub = HubHandle::spawn(config.hub(), config.channel_buffer);
    info!("ChatServer actor started");

    // HTTP query/upload API
    let http_listener = TcpListener::bind(config.http_addr).await?;
    info!("HTTP API listening on {}", config.http_addr);
    let state = ApiState {
        hub: hub.clone(),
        blobs: Arc::new(DiskBlobStore::new(&config.upload_dir)),
    };
    let app = api::router(state, &config.upload_dir);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            error!("HTTP API stopped: {}", e);
        }
    });

    let listener = TcpListener::bind(config.ws_addr).await?;
    info!("WebSocket hub listening on {}", config.ws_addr);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = hub.sender();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
