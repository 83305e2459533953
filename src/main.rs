use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rankd::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    db::{create_pool, create_redis_client, Cache, InMemoryRankStore, PgRankStore, RankStore},
    services::{RankingEngine, TmdbProvider},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rankd=info,tower_http=info")),
        )
        .init();

    let store: Arc<dyn RankStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.database_max_connections).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgRankStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, rankings are lost on restart");
            Arc::new(InMemoryRankStore::new())
        }
    };
    tracing::info!(store = store.name(), "Record store ready");

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;

    let provider = TmdbProvider::new(
        cache,
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    );

    let engine = RankingEngine::new(store).with_content_provider(Arc::new(provider));
    let app = create_router(AppState::new(engine));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_writer.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
