use std::sync::Arc;

use tracing::{error, info};

use cryptdrop_db::Database;
use cryptdrop_server::{Config, Server, ServerState, Storage};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cryptdrop_server=debug,cryptdrop_db=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let storage = Storage::new(config.storage_dir.clone())?;
    let state = Arc::new(
        ServerState::new(db, storage, config.size_policy)
            .with_transfer_limits(config.transfer_limits),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let server = Server::bind(&addr, state, config.max_payload).await?;
    info!("Cryptdrop server listening on {}", server.local_addr()?);
    info!(
        "Max payload: {} bytes, size mismatch policy: {:?}",
        config.max_payload, config.size_policy
    );
    info!(
        "Max upload size: {} bytes, max concurrent uploads per connection: {}",
        config.transfer_limits.max_content_size,
        config.transfer_limits.max_transfers_per_connection
    );

    tokio::select! {
        result = server.run() => result?,
        _ = shutdown_signal() => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
