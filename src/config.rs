// src/config.rs

use std::env;
use dotenvy::dotenv;

use crate::models::attempt::ReplacementPolicy;

/// Rows returned by the global leaderboard when no limit is given.
pub const DEFAULT_GLOBAL_LIMIT: usize = 50;

/// Rows returned by a club leaderboard when no limit is given.
pub const DEFAULT_CLUB_LIMIT: usize = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// When set, leaderboards are cached in Redis instead of in-process.
    pub redis_url: Option<String>,
    pub leaderboard_cache_ttl_secs: u64,
    pub replacement_policy: ReplacementPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.is_empty());

        let leaderboard_cache_ttl_secs = env::var("LEADERBOARD_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let replacement_policy = match env::var("ATTEMPT_REPLACEMENT_POLICY") {
            Ok(raw) => raw
                .parse()
                .unwrap_or_else(|e| panic!("ATTEMPT_REPLACEMENT_POLICY: {}", e)),
            Err(_) => ReplacementPolicy::default(),
        };

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            redis_url,
            leaderboard_cache_ttl_secs,
            replacement_policy,
        }
    }
}
