mod config;
mod keepalive;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hearth_api::{AppState, AppStateInner};
use hearth_chat::ChatState;
use hearth_gateway::Hub;
use hearth_store::Store;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth_server=debug,hearth_api=debug,hearth_chat=debug,hearth_gateway=debug,hearth_store=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Restore chat state from disk
    let store = Store::open(&config.data_dir)?;
    let chat = ChatState::open(store, Hub::new(), config.chat_config());

    let shutdown = CancellationToken::new();
    let state: AppState = Arc::new(AppStateInner {
        chat,
        trust_forwarded: config.trust_forwarded,
        shutdown: shutdown.clone(),
    });
    let app = hearth_api::router(state, &config.index_path);

    if config.self_ping {
        tokio::spawn(keepalive::run_self_ping(config.port, config.self_ping_interval));
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Hearth chat server listening on {}", addr);
    if !config.index_path.exists() {
        warn!("Index page {} not found; / will return 404", config.index_path.display());
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Open update streams never finish on their own
        shutdown.cancel();
    })
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
