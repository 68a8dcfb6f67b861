use dispatch_core::config::DispatchConfig;
use dispatch_core::Store;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = serve().await {
        error!(error = %err, "dispatch-server stopped");
        std::process::exit(1);
    }
}

async fn serve() -> Result<(), String> {
    let config = DispatchConfig::from_env().map_err(|e| e.to_string())?;
    let store = Store::open(&config.db_path).map_err(|e| e.to_string())?;

    spawn_change_retention(store.clone(), config.change_retention);

    let app = dispatch_server::router(store);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| format!("bind {}: {e}", config.listen_addr))?;

    info!(addr = %config.listen_addr, db = %config.db_path.display(), "dispatch-server listening");
    axum::serve(listener, app).await.map_err(|e| e.to_string())
}

/// Trims the change feed to the newest `keep` rows once a minute.
fn spawn_change_retention(store: Store, keep: i64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.retain_changes(keep)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => debug!(removed, keep, "change feed trimmed"),
                Ok(Err(err)) => warn!(error = %err, "change feed retention failed"),
                Err(err) => warn!(error = %err, "change feed retention task panicked"),
            }
        }
    });
}
