mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use kinship_api::state::{AppState, AppStateInner};
use kinship_crypto::keys::{generate_token_key, key_to_base64};
use kinship_crypto::token::new_maker;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinship=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set KINSHIP_TOKEN_KEY in your .env file and restart, e.g.");
            eprintln!("       KINSHIP_TOKEN_KEY={}", key_to_base64(&generate_token_key()));
            std::process::exit(1);
        }
    };

    // Init database
    let db = kinship_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let tokens = new_maker(config.token_format, &config.token_key)?;
    info!("Issuing {:?} tokens", config.token_format);

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens,
        access_token_ttl: config.access_token_ttl,
        request_timeout: config.request_timeout,
    });

    // Spawn expiry sweep
    tokio::spawn(cleanup::run_sweep_loop(
        state.clone(),
        config.friend_request_ttl,
        config.sweep_interval,
    ));

    let app = kinship_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Kinship server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
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
