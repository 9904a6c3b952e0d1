use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use reelrank_api::api::{create_router, AppState};
use reelrank_api::config::Config;
use reelrank_api::db::{create_pool, PgStore};
use reelrank_api::registry::MlflowRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reelrank_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));
    let registry = Arc::new(MlflowRegistry::new(config.registry_url.clone()));

    let address = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, store.clone(), store, registry);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
