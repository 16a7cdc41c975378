mod api;
mod canvas;
mod config;
mod content;
mod engine;
mod gesture;
mod history;
mod sessions;
mod ws;

use common::mint::MintParams;
use common::{Color, MintComposer};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::canvas::CanvasConfig;
use crate::config::ContentBackend;
use crate::content::{ContentStore, Publisher};
use crate::sessions::Canvases;

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                tracing::info!("Received SIGINT, shutting down...");
                return;
            }
        };
    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("server=info".parse()?),
        )
        .init();

    let config = config::Config::from_env();
    tracing::info!("Starting server on {}", config.listen_addr);

    let content = match config.content_backend {
        ContentBackend::Valkey => {
            let valkey_client = redis::Client::open(config.valkey_url.as_str())?;
            ContentStore::Valkey(valkey_client.get_multiplexed_async_connection().await?)
        }
        ContentBackend::Memory => {
            tracing::warn!("Using in-memory content store, uploads are lost on restart");
            ContentStore::memory()
        }
    };

    let composer = MintComposer::new(MintParams {
        contract: config.mint_contract.clone(),
        fee_recipient: config.fee_recipient.clone(),
        ..MintParams::default()
    })?;

    let canvas_config = CanvasConfig {
        width: config.canvas_width,
        height: config.canvas_height,
        background: Some(Color::WHITE),
    };

    let state = api::AppState {
        canvases: Arc::new(Mutex::new(Canvases::new(config.max_canvases, canvas_config))),
        content: content.clone(),
        publisher: Arc::new(Publisher::new(content, config.gateway_url.clone())),
        composer: Arc::new(composer),
    };

    let app = api::router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped.");
    Ok(())
}
