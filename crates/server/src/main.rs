use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use roomline_server::api::ApiState;
use roomline_server::auth::jwt::AccessTokenService;
use roomline_server::build_router;
use roomline_server::config::ServerConfig;
use roomline_server::db;
use roomline_server::fanout::FanoutDispatcher;
use roomline_server::registry::ConnectionRegistry;
use roomline_server::store::{MessageStore, UserDirectory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let token_service = Arc::new(
        AccessTokenService::new(&config.jwt_secret).context("invalid chat server JWT secret")?,
    );

    let (store, directory) = match &config.database_url {
        Some(database_url) => {
            let pool = db::connect_and_migrate(database_url).await?;
            (MessageStore::Postgres(pool.clone()), UserDirectory::Postgres(pool))
        }
        None => {
            info!("no database url configured, using in-memory stores");
            (MessageStore::memory(), UserDirectory::memory())
        }
    };

    let registry = Arc::new(ConnectionRegistry::new());
    let state = ApiState {
        store,
        directory,
        fanout: Arc::new(FanoutDispatcher::new(Arc::clone(&registry))),
        registry,
    };

    let app = build_router(token_service, state, config.cors_origins.as_deref());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind chat listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting chat server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("chat server exited unexpectedly")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
