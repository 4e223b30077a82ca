//! Gatewiki API server

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatewiki_api::{routes, AppState, Config};
use gatewiki_shared::{KvStore, MemoryKv, RedisKv};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatewiki_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Store selection happens once, at startup. Handlers only ever see
    // the trait object.
    let kv: Arc<dyn KvStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisKv::connect(url).await?;
            tracing::info!("Connected to Redis");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory store (development only)");
            Arc::new(MemoryKv::new())
        }
    };

    let bind_address = config.bind_address.clone();
    let state = AppState::new(kv, config);
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!("Gatewiki API listening on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
