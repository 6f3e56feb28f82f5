mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use pubvote_api::routes::router;
use pubvote_api::{AppStateInner, Coordinator};
use pubvote_db::{Database, RoundStore};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pubvote_server=debug,pubvote_api=debug,pubvote_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // One store handle for the whole process, passed down explicitly
    let store: Arc<dyn RoundStore> = Arc::new(Database::open(&config.db_path)?);

    tokio::spawn(cleanup::run_cleanup_loop(
        store.clone(),
        config.cleanup_interval_secs,
    ));

    let state = Arc::new(AppStateInner {
        coordinator: Coordinator::new(store, config.round),
        http: reqwest::Client::new(),
    });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Pub vote server listening on {}", addr);
    info!(
        "Rounds expire: {}, owner-only end: {}",
        config.round.expiry, config.round.require_owner_for_end
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
