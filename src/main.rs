use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use catalog_gateway::cache::{CacheStore, MemoryCacheStore, RedisCacheStore};
use catalog_gateway::config::{AppConfig, Environment};
use catalog_gateway::database::{CatalogStore, DatabaseManager, MemoryCatalogStore, PgCatalogStore};
use catalog_gateway::limiter::FixedWindowLimiter;
use catalog_gateway::{app, AppState};

#[derive(Parser)]
#[command(name = "catalog-gateway")]
#[command(about = "Edge gateway and read-through cache for the catalog API")]
#[command(version)]
struct Args {
    #[arg(long, env = "PORT", help = "Port to listen on (overrides the environment preset)")]
    port: Option<u16>,

    #[arg(long, help = "Environment preset: development, staging or production")]
    env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("catalog_gateway=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    if let Some(env) = &args.env {
        std::env::set_var("APP_ENV", env);
    }

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting Catalog Gateway in {:?} mode", config.environment);
    if config.environment == Environment::Production && config.cache.redis_url.is_none() {
        tracing::warn!("REDIS_URL not set; cache is per-process memory");
    }

    let pool = match &config.database.url {
        Some(_) => Some(DatabaseManager::connect(&config.database).await.context("database connection failed")?),
        None => None,
    };
    let store: Arc<dyn CatalogStore> = match &pool {
        Some(pool) => Arc::new(PgCatalogStore::new(pool.clone())),
        None => {
            tracing::warn!("DATABASE_URL not set; serving the in-memory catalog");
            Arc::new(MemoryCatalogStore::new())
        }
    };

    let cache: Arc<dyn CacheStore> = match &config.cache.redis_url {
        Some(url) => Arc::new(RedisCacheStore::connect(url).await.context("cache connection failed")?),
        None => Arc::new(MemoryCacheStore::new()),
    };
    tracing::info!(backend = cache.backend(), "cache ready");

    let port = config.server.port;
    let sweep_every = Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1));
    let state = AppState::new(config, store, cache).context("invalid token configuration")?;
    spawn_limiter_sweeper(Arc::clone(&state.limiter), sweep_every);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Catalog Gateway listening on http://{}", bind_addr);

    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(pool) = pool {
        DatabaseManager::close(&pool).await;
    }
    Ok(())
}

fn spawn_limiter_sweeper(limiter: Arc<FixedWindowLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
            tracing::debug!(tracked = limiter.tracked_identities(), "rate limit buckets swept");
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
