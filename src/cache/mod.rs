// src/cache/mod.rs

//! Leaderboard cache backends.
//!
//! The cache is pure memoization: any backend, including [`NoopCache`], must
//! leave leaderboard results unchanged. Errors are reported as [`CacheError`]
//! and absorbed by the leaderboard service.

use std::{fmt, time::Duration};

use async_trait::async_trait;

use crate::models::leaderboard::{LeaderboardRow, LeaderboardScope};

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError(pub String);

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache error: {}", self.0)
    }
}

impl std::error::Error for CacheError {}

/// Storage for fully ranked leaderboards, one entry per scope.
#[async_trait]
pub trait LeaderboardCache: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn get(&self, scope: LeaderboardScope) -> Result<Option<Vec<LeaderboardRow>>, CacheError>;

    async fn set(
        &self,
        scope: LeaderboardScope,
        rows: &[LeaderboardRow],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn invalidate(&self, scope: LeaderboardScope) -> Result<(), CacheError>;
}

/// Caches nothing. Every read is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl LeaderboardCache for NoopCache {
    fn backend_tag(&self) -> &'static str {
        "noop"
    }

    async fn get(
        &self,
        _scope: LeaderboardScope,
    ) -> Result<Option<Vec<LeaderboardRow>>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _scope: LeaderboardScope,
        _rows: &[LeaderboardRow],
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _scope: LeaderboardScope) -> Result<(), CacheError> {
        Ok(())
    }
}
