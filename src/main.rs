use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use course_recommender::{
    config::Config,
    db::{create_pool, DataSource, MySqlSource},
    routes::{create_router, AppState},
    services::{spawn_periodic_refresh, SnapshotStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_recommender=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(config.connect_options()?, config.db_max_connections)
        .await
        .context("Failed to connect to MySQL")?;
    let source: Arc<dyn DataSource> = Arc::new(MySqlSource::new(pool));

    // No snapshot, no server: the first training run must succeed.
    let store = Arc::new(SnapshotStore::new(config.knn_options()?));
    let snapshot = store
        .refresh(source.as_ref())
        .await
        .context("Initial model training failed")?;
    tracing::info!(summary = ?snapshot.summary(), "Model ready");

    let refresh_task = config
        .refresh_interval()
        .map(|every| spawn_periodic_refresh(store.clone(), source.clone(), every));

    let state = AppState::new(store, source, config.max_recommendations)
        .with_refresh_token(config.refresh_token.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(host = %config.host, port = config.port, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = refresh_task {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
