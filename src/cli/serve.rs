use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::analytics::{AnalyticsStore, ClickHouseStore};
use crate::auth::{KeyAuthority, KeyAuthorityConfig};
use crate::buffer::{WriteBuffer, WriteBufferConfig};
use crate::cache::{KeyValueCache, MemoryCache, RedisCache};
use crate::config::AppConfig;
use crate::database::{DatabaseManager, KeyStore, PgKeyStore};
use crate::events::Normalizer;
use crate::lifecycle::Lifecycle;
use crate::limiter::{RateLimitScope, RateLimiter};
use crate::server::{app, AppState};

pub async fn run(config: &AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    config.validate()?;
    info!("Starting ingestion service in {:?} mode", config.environment);

    let cache: Arc<dyn KeyValueCache> = match &config.cache.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await.context("failed to connect to Redis")?),
        None => {
            warn!("REDIS_URL not set, using in-process cache; rate limits are per instance");
            Arc::new(MemoryCache::new())
        }
    };

    let pool = DatabaseManager::connect(&config.database)?;
    if let Err(e) = DatabaseManager::health_check(&pool).await {
        // Pool is lazy; keys resolve once Postgres is reachable
        warn!("Key store not reachable at startup: {}", e);
    }
    let keys: Arc<dyn KeyStore> = Arc::new(PgKeyStore::new(pool, config.database.query_timeout()));

    let analytics: Arc<dyn AnalyticsStore> =
        Arc::new(ClickHouseStore::new(&config.analytics).context("invalid analytics configuration")?);

    let buffer = WriteBuffer::new(
        analytics,
        WriteBufferConfig::from_config(&config.buffer, &config.analytics),
    );
    let lifecycle = Lifecycle::new(buffer.clone(), config.buffer.flush_interval());

    let limiter = config.rate_limit.enabled.then(|| {
        Arc::new(RateLimiter::from_config(
            cache.clone(),
            RateLimitScope::Ingestion,
            &config.rate_limit,
            config.cache.op_timeout(),
        ))
    });

    let state = AppState {
        authority: Arc::new(KeyAuthority::new(cache, keys, KeyAuthorityConfig::from(&config.cache))),
        limiter,
        normalizer: Normalizer::new(),
        buffer,
        max_batch_events: config.server.max_batch_events,
        max_body_bytes: config.server.max_body_bytes,
    };

    let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(config.server.port));
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    lifecycle.start();
    info!("Ingestion service listening on http://{}", bind_addr);

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Drain even if the server stopped with an error
    lifecycle.stop().await;
    served.context("server error")?;

    info!("Ingestion service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining write buffer");
}
