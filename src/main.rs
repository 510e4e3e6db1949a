// src/main.rs

use clubhub::cache::{LeaderboardCache, MemoryCache, RedisCache};
use clubhub::config::Config;
use clubhub::routes;
use clubhub::state::AppState;
use clubhub::store::{PgStore, Stores};
use clubhub::utils::clock::{Clock, SystemClock};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = leaderboard_cache(&config, clock.clone());
    tracing::info!(
        "Leaderboard cache: {} (ttl {}s), replacement policy: {}",
        cache.backend_tag(),
        config.leaderboard_cache_ttl_secs,
        config.replacement_policy
    );

    let stores = Stores::from_backend(Arc::new(PgStore::new(pool)));
    let state = AppState::new(config.clone(), stores, cache, clock);

    // Create the Axum application router
    let app = routes::create_router(state);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .expect("BIND_ADDR must be a socket address");
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

/// Redis when `REDIS_URL` is configured, otherwise an in-process cache.
fn leaderboard_cache(config: &Config, clock: Arc<dyn Clock>) -> Arc<dyn LeaderboardCache> {
    if let Some(url) = &config.redis_url {
        match RedisCache::new(url, "clubhub") {
            Ok(cache) => return Arc::new(cache),
            Err(e) => tracing::warn!("Invalid REDIS_URL, falling back to in-process cache: {}", e),
        }
    }
    Arc::new(MemoryCache::new(clock, 256))
}
