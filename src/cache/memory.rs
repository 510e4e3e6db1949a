// src/cache/memory.rs

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    cache::{CacheError, LeaderboardCache},
    models::leaderboard::{LeaderboardRow, LeaderboardScope},
    utils::clock::Clock,
};

#[derive(Clone)]
struct Entry {
    rows: Vec<LeaderboardRow>,
    expires_at: DateTime<Utc>,
}

/// In-process TTL cache.
pub struct MemoryCache {
    clock: Arc<dyn Clock>,
    max_entries: usize,
    entries: Mutex<HashMap<LeaderboardScope, Entry>>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            clock,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.len()
    }
}

#[async_trait]
impl LeaderboardCache for MemoryCache {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        scope: LeaderboardScope,
    ) -> Result<Option<Vec<LeaderboardRow>>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);
        Ok(entries.get(&scope).map(|e| e.rows.clone()))
    }

    async fn set(
        &self,
        scope: LeaderboardScope,
        rows: &[LeaderboardRow],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| CacheError(e.to_string()))?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);

        if !entries.contains_key(&scope) && entries.len() >= self.max_entries {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| *k)
            {
                entries.remove(&victim);
            }
        }

        entries.insert(
            scope,
            Entry {
                rows: rows.to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, scope: LeaderboardScope) -> Result<(), CacheError> {
        self.entries.lock().await.remove(&scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::user::Role, utils::clock::ManualClock};

    fn rows(user_id: i64) -> Vec<LeaderboardRow> {
        vec![LeaderboardRow {
            rank: 1,
            user_id,
            name: "ada".into(),
            avatar_url: None,
            role: Role::Member,
            total_score: 10,
            quizzes_completed: 1,
            avg_percentage: 100.0,
            clubs_joined: Some(1),
        }]
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = MemoryCache::new(clock.clone(), 8);

        cache
            .set(LeaderboardScope::Global, &rows(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(LeaderboardScope::Global).await.unwrap(), Some(rows(1)));

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(cache.get(LeaderboardScope::Global).await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalidate_only_touches_one_scope() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = MemoryCache::new(clock, 8);
        let ttl = Duration::from_secs(60);

        cache.set(LeaderboardScope::Global, &rows(1), ttl).await.unwrap();
        cache.set(LeaderboardScope::Club(1), &rows(2), ttl).await.unwrap();
        cache.set(LeaderboardScope::Club(2), &rows(3), ttl).await.unwrap();

        cache.invalidate(LeaderboardScope::Club(1)).await.unwrap();

        assert!(cache.get(LeaderboardScope::Global).await.unwrap().is_some());
        assert!(cache.get(LeaderboardScope::Club(1)).await.unwrap().is_none());
        assert_eq!(cache.get(LeaderboardScope::Club(2)).await.unwrap(), Some(rows(3)));
    }

    #[tokio::test]
    async fn evicts_soonest_expiring_when_full() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = MemoryCache::new(clock, 2);

        cache
            .set(LeaderboardScope::Club(1), &rows(1), Duration::from_secs(10))
            .await
            .unwrap();
        cache
            .set(LeaderboardScope::Club(2), &rows(2), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set(LeaderboardScope::Club(3), &rows(3), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(LeaderboardScope::Club(1)).await.unwrap().is_none());
    }
}
