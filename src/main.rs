use std::net::SocketAddr;
use std::sync::Arc;

use harmony_backend::{
    config::{Config, StorageBackend},
    database::pool::{create_pool, run_migrations},
    error::Error,
    routes,
    store::{MemoryStore, PgStore},
    AppState,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let config = Arc::new(Config::from_env()?);

    let app_state = match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| Error::Config("DATABASE_URL is required".into()))?;
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            info!("Database ready");
            AppState::with_store(config.clone(), Arc::new(PgStore::new(pool)))?
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            AppState::with_store(config.clone(), Arc::new(MemoryStore::new()))?
        }
    };

    let scheduler = app_state.scheduler.clone();
    if config.scheduler.enabled {
        scheduler.start().await?;
    } else {
        info!("Publication scheduler disabled by SCHEDULER_ENABLED");
    }

    let app = routes::router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await?;
    Ok(())
}
