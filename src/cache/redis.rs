// src/cache/redis.rs

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::timeout;

use crate::{
    cache::{CacheError, LeaderboardCache},
    models::leaderboard::{LeaderboardRow, LeaderboardScope},
};

/// Leaderboard cache shared between instances through Redis.
///
/// Every command is bounded by `op_timeout` so a slow or unreachable Redis
/// turns into a cache error instead of a stalled request.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    prefix: String,
    op_timeout: Duration,
}

impl RedisCache {
    pub fn new(url: &str, prefix: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            op_timeout: Duration::from_millis(250),
        })
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    fn key(&self, scope: LeaderboardScope) -> String {
        format!("{}:leaderboard:{}", self.prefix, scope.cache_key())
    }

    async fn bounded<T, Fut>(&self, op: Fut) -> Result<T, CacheError>
    where
        Fut: Future<Output = Result<T, CacheError>>,
    {
        match timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError("redis timeout".to_string())),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError(e.to_string()))
    }
}

#[async_trait]
impl LeaderboardCache for RedisCache {
    fn backend_tag(&self) -> &'static str {
        "redis"
    }

    async fn get(
        &self,
        scope: LeaderboardScope,
    ) -> Result<Option<Vec<LeaderboardRow>>, CacheError> {
        let key = self.key(scope);
        let payload: Option<String> = self
            .bounded(async {
                let mut conn = self.connection().await?;
                conn.get(key.as_str()).await.map_err(|e| CacheError(e.to_string()))
            })
            .await?;

        match payload {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CacheError(format!("corrupt entry {}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        scope: LeaderboardScope,
        rows: &[LeaderboardRow],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = self.key(scope);
        let payload = serde_json::to_string(rows).map_err(|e| CacheError(e.to_string()))?;
        let ttl_secs = ttl.as_secs().max(1);

        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: () = conn
                .set_ex(key.as_str(), payload, ttl_secs)
                .await
                .map_err(|e| CacheError(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn invalidate(&self, scope: LeaderboardScope) -> Result<(), CacheError> {
        let key = self.key(scope);

        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: () = conn
                .del(key.as_str())
                .await
                .map_err(|e| CacheError(e.to_string()))?;
            Ok(())
        })
        .await
    }
}
