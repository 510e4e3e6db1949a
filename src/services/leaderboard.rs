// src/services/leaderboard.rs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    cache::LeaderboardCache,
    config::{DEFAULT_CLUB_LIMIT, DEFAULT_GLOBAL_LIMIT},
    error::AppError,
    models::{
        leaderboard::{LeaderboardRow, LeaderboardScope, UserRank},
        user::Role,
    },
    services::ranking,
    store::Stores,
};

/// Read-through cached leaderboards.
///
/// The full ranked list of a scope is cached; `limit` is applied on the way
/// out. Cache failures are logged and never reach the caller.
pub struct LeaderboardService {
    stores: Stores,
    cache: Arc<dyn LeaderboardCache>,
    ttl: Duration,
    /// Bumped on every invalidation. A fill computed under an older
    /// generation is discarded. Never held across an await.
    generations: Mutex<HashMap<LeaderboardScope, u64>>,
}

impl LeaderboardService {
    pub fn new(stores: Stores, cache: Arc<dyn LeaderboardCache>, ttl: Duration) -> Self {
        Self {
            stores,
            cache,
            ttl,
            generations: Mutex::new(HashMap::new()),
        }
    }

    pub async fn global(&self, limit: Option<usize>) -> Result<Vec<LeaderboardRow>, AppError> {
        let mut rows = self.ranked(LeaderboardScope::Global).await?;
        rows.truncate(limit.unwrap_or(DEFAULT_GLOBAL_LIMIT));
        Ok(rows)
    }

    pub async fn club(
        &self,
        club_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<LeaderboardRow>, AppError> {
        let mut rows = self.ranked(LeaderboardScope::Club(club_id)).await?;
        rows.truncate(limit.unwrap_or(DEFAULT_CLUB_LIMIT));
        Ok(rows)
    }

    /// Locates a user on the uncut global leaderboard.
    pub async fn user_rank(&self, user_id: i64) -> Result<UserRank, AppError> {
        let rows = self.ranked(LeaderboardScope::Global).await?;
        Ok(rows
            .into_iter()
            .find(|r| r.user_id == user_id)
            .map_or(UserRank::NotRanked, UserRank::Ranked))
    }

    /// Drops the global entry and the owning club's entry after an attempt
    /// for one of that club's quizzes was recorded.
    pub(crate) async fn invalidate_for_quiz(&self, club_id: Option<i64>) {
        let mut scopes = vec![LeaderboardScope::Global];
        scopes.extend(club_id.map(LeaderboardScope::Club));

        for scope in scopes {
            // Bump first: a fill racing with this delete sees the new
            // generation when it re-checks and removes its own write.
            self.bump_generation(scope);
            self.evict(scope).await;
        }
    }

    async fn ranked(&self, scope: LeaderboardScope) -> Result<Vec<LeaderboardRow>, AppError> {
        match self.cache.get(scope).await {
            Ok(Some(rows)) => {
                tracing::debug!("Leaderboard cache hit for {}", scope);
                return Ok(rows);
            }
            Ok(None) => tracing::debug!("Leaderboard cache miss for {}", scope),
            Err(e) => tracing::warn!(
                "Leaderboard cache ({}) read failed for {}: {}",
                self.cache.backend_tag(),
                scope,
                e
            ),
        }

        let generation = self.generation(scope);
        let rows = self.compute(scope).await?;

        if self.generation(scope) != generation {
            tracing::debug!("Skipping stale leaderboard fill for {}", scope);
            return Ok(rows);
        }

        if let Err(e) = self.cache.set(scope, &rows, self.ttl).await {
            tracing::warn!(
                "Leaderboard cache ({}) write failed for {}: {}",
                self.cache.backend_tag(),
                scope,
                e
            );
        }

        // An invalidation may have landed while the write was in flight.
        if self.generation(scope) != generation {
            tracing::debug!("Leaderboard for {} invalidated during fill, evicting", scope);
            self.evict(scope).await;
        }

        Ok(rows)
    }

    async fn evict(&self, scope: LeaderboardScope) {
        if let Err(e) = self.cache.invalidate(scope).await {
            tracing::warn!(
                "Leaderboard cache ({}) invalidate failed for {}: {}",
                self.cache.backend_tag(),
                scope,
                e
            );
        }
    }

    fn generation(&self, scope: LeaderboardScope) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.get(&scope).copied().unwrap_or(0)
    }

    fn bump_generation(&self, scope: LeaderboardScope) {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        *generations.entry(scope).or_insert(0) += 1;
    }

    async fn compute(&self, scope: LeaderboardScope) -> Result<Vec<LeaderboardRow>, AppError> {
        match scope {
            LeaderboardScope::Global => {
                let profiles = self
                    .stores
                    .users
                    .list_profiles_by_roles(&Role::RANKED)
                    .await?;
                let ids: Vec<i64> = profiles.iter().map(|p| p.id).collect();
                let counts = self.stores.memberships.count_memberships(&ids).await?;
                let attempts = self.stores.attempts.list_attempt_summaries(scope).await?;

                Ok(ranking::rank_global(&profiles, &counts, &attempts))
            }
            LeaderboardScope::Club(club_id) => {
                let members = self.stores.memberships.list_members(club_id).await?;
                let ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
                let profiles = self.stores.users.get_profiles(&ids).await?;
                let attempts = self.stores.attempts.list_attempt_summaries(scope).await?;

                Ok(ranking::rank_club(&members, &profiles, &attempts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheError, MemoryCache, NoopCache},
        models::{
            attempt::{Answers, Attempt, AttemptSummary, ReplacementPolicy, UpsertOutcome},
            user::UserProfile,
        },
        store::{AttemptStore, MemoryStore},
        utils::clock::SystemClock,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Instant,
    };
    use tokio::{sync::Notify, task::JoinSet};

    /// A cache backend that is always down.
    struct BrokenCache;

    #[async_trait]
    impl LeaderboardCache for BrokenCache {
        fn backend_tag(&self) -> &'static str {
            "broken"
        }

        async fn get(
            &self,
            _: LeaderboardScope,
        ) -> Result<Option<Vec<LeaderboardRow>>, CacheError> {
            Err(CacheError("connection refused".into()))
        }

        async fn set(
            &self,
            _: LeaderboardScope,
            _: &[LeaderboardRow],
            _: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError("connection refused".into()))
        }

        async fn invalidate(&self, _: LeaderboardScope) -> Result<(), CacheError> {
            Err(CacheError("connection refused".into()))
        }
    }

    /// A healthy cache whose writes are slow, like a distant Redis.
    struct SlowCache {
        inner: MemoryCache,
        delay: Duration,
    }

    impl SlowCache {
        fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryCache::new(Arc::new(SystemClock), 64),
                delay,
            }
        }
    }

    #[async_trait]
    impl LeaderboardCache for SlowCache {
        fn backend_tag(&self) -> &'static str {
            "slow"
        }

        async fn get(
            &self,
            scope: LeaderboardScope,
        ) -> Result<Option<Vec<LeaderboardRow>>, CacheError> {
            self.inner.get(scope).await
        }

        async fn set(
            &self,
            scope: LeaderboardScope,
            rows: &[LeaderboardRow],
            ttl: Duration,
        ) -> Result<(), CacheError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set(scope, rows, ttl).await
        }

        async fn invalidate(&self, scope: LeaderboardScope) -> Result<(), CacheError> {
            self.inner.invalidate(scope).await
        }
    }

    /// Attempt store whose first summary read takes its snapshot, then
    /// waits for `release` before returning it.
    struct PausedAttempts {
        inner: Arc<MemoryStore>,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AttemptStore for PausedAttempts {
        async fn start_session(
            &self,
            quiz_id: i64,
            user_id: i64,
            started_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            self.inner.start_session(quiz_id, user_id, started_at).await
        }

        async fn session_started_at(
            &self,
            quiz_id: i64,
            user_id: i64,
        ) -> Result<Option<DateTime<Utc>>, AppError> {
            self.inner.session_started_at(quiz_id, user_id).await
        }

        async fn upsert_attempt(
            &self,
            attempt: Attempt,
            policy: ReplacementPolicy,
        ) -> Result<UpsertOutcome, AppError> {
            self.inner.upsert_attempt(attempt, policy).await
        }

        async fn find_attempt(
            &self,
            quiz_id: i64,
            user_id: i64,
        ) -> Result<Option<Attempt>, AppError> {
            self.inner.find_attempt(quiz_id, user_id).await
        }

        async fn list_attempt_summaries(
            &self,
            scope: LeaderboardScope,
        ) -> Result<Vec<AttemptSummary>, AppError> {
            let snapshot = self.inner.list_attempt_summaries(scope).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(snapshot)
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, role) in [(1, Role::Member), (2, Role::Coordinator), (3, Role::Faculty)] {
            store
                .insert_user(UserProfile {
                    id,
                    name: format!("user{}", id),
                    avatar_url: None,
                    role,
                })
                .await;
        }
        store
    }

    fn attempt(quiz_id: i64, user_id: i64, score: i32) -> Attempt {
        Attempt {
            quiz_id,
            user_id,
            score,
            total_marks: 100,
            percentage: f64::from(score),
            time_taken_seconds: 30,
            answers: Answers::new(),
            is_passed: true,
            attempted_at: Utc::now(),
        }
    }

    fn service(store: Arc<MemoryStore>, cache: Arc<dyn LeaderboardCache>) -> LeaderboardService {
        LeaderboardService::new(Stores::from_backend(store), cache, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn broken_cache_still_serves_fresh_rows() {
        let store = seeded_store().await;
        store
            .upsert_attempt(attempt(1, 1, 40), ReplacementPolicy::Latest)
            .await
            .unwrap();

        let svc = service(store.clone(), Arc::new(BrokenCache));
        let rows = svc.global(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_score, 40);

        svc.invalidate_for_quiz(Some(1)).await;
        assert_eq!(svc.user_rank(1).await.unwrap(), UserRank::Ranked(rows[0].clone()));
    }

    #[tokio::test]
    async fn noop_cache_matches_memory_cache() {
        let store = seeded_store().await;
        store
            .upsert_attempt(attempt(1, 1, 40), ReplacementPolicy::Latest)
            .await
            .unwrap();
        store
            .upsert_attempt(attempt(1, 2, 70), ReplacementPolicy::Latest)
            .await
            .unwrap();

        let cached = service(store.clone(), Arc::new(MemoryCache::new(Arc::new(SystemClock), 16)));
        let uncached = service(store, Arc::new(NoopCache));

        assert_eq!(cached.global(None).await.unwrap(), uncached.global(None).await.unwrap());
        // second read is served from cache and must not differ
        assert_eq!(cached.global(None).await.unwrap(), uncached.global(None).await.unwrap());
    }

    #[tokio::test]
    async fn cached_rows_stay_until_invalidated() {
        let store = seeded_store().await;
        store
            .upsert_attempt(attempt(1, 1, 40), ReplacementPolicy::Latest)
            .await
            .unwrap();

        let svc = service(store.clone(), Arc::new(MemoryCache::new(Arc::new(SystemClock), 16)));
        assert_eq!(svc.global(None).await.unwrap()[0].total_score, 40);

        // A write that bypasses the recorder is not visible until invalidation.
        store
            .upsert_attempt(attempt(1, 1, 90), ReplacementPolicy::Latest)
            .await
            .unwrap();
        assert_eq!(svc.global(None).await.unwrap()[0].total_score, 40);

        svc.invalidate_for_quiz(None).await;
        assert_eq!(svc.global(None).await.unwrap()[0].total_score, 90);
    }

    #[tokio::test]
    async fn limit_applies_after_ranking() {
        let store = seeded_store().await;
        store
            .upsert_attempt(attempt(1, 1, 10), ReplacementPolicy::Latest)
            .await
            .unwrap();
        store
            .upsert_attempt(attempt(1, 2, 20), ReplacementPolicy::Latest)
            .await
            .unwrap();

        let svc = service(store, Arc::new(NoopCache));
        let top = svc.global(Some(1)).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].user_id, 2);

        // user 1 is outside the requested page but still ranked
        match svc.user_rank(1).await.unwrap() {
            UserRank::Ranked(row) => assert_eq!(row.rank, 2),
            UserRank::NotRanked => panic!("user 1 should be ranked"),
        }
    }

    #[tokio::test]
    async fn faculty_and_inactive_users_are_not_ranked() {
        let store = seeded_store().await;
        store
            .upsert_attempt(attempt(1, 3, 100), ReplacementPolicy::Latest)
            .await
            .unwrap();

        let svc = service(store, Arc::new(NoopCache));
        assert_eq!(svc.user_rank(3).await.unwrap(), UserRank::NotRanked);
        assert_eq!(svc.user_rank(1).await.unwrap(), UserRank::NotRanked);
        assert_eq!(svc.user_rank(404).await.unwrap(), UserRank::NotRanked);
    }

    #[tokio::test]
    async fn fill_overtaken_by_invalidation_is_not_cached() {
        let store = seeded_store().await;
        store
            .upsert_attempt(attempt(1, 1, 40), ReplacementPolicy::Latest)
            .await
            .unwrap();

        let paused = Arc::new(PausedAttempts {
            inner: store.clone(),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let stores = Stores {
            quizzes: store.clone(),
            attempts: paused.clone(),
            memberships: store.clone(),
            users: store.clone(),
        };
        let svc = Arc::new(LeaderboardService::new(
            stores,
            Arc::new(MemoryCache::new(Arc::new(SystemClock), 16)),
            Duration::from_secs(300),
        ));

        let slow_read = tokio::spawn({
            let svc = svc.clone();
            async move { svc.global(None).await }
        });
        paused.entered.notified().await;

        // A new attempt is recorded while the read above holds the old snapshot.
        store
            .upsert_attempt(attempt(1, 1, 90), ReplacementPolicy::Latest)
            .await
            .unwrap();
        svc.invalidate_for_quiz(None).await;
        paused.release.notify_one();

        let stale = slow_read.await.unwrap().unwrap();
        assert_eq!(stale[0].total_score, 40);
        assert_eq!(svc.global(None).await.unwrap()[0].total_score, 90);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_cache_writes_do_not_serialize_scopes() {
        let store = seeded_store().await;
        for club_id in 1..=8 {
            store.add_membership(club_id, 1, Utc::now()).await;
        }
        let svc = Arc::new(service(
            store,
            Arc::new(SlowCache::new(Duration::from_millis(200))),
        ));

        let started = Instant::now();
        let mut reads = JoinSet::new();
        for club_id in 1..=8 {
            let svc = svc.clone();
            reads.spawn(async move { svc.club(club_id, None).await });
        }
        while let Some(read) = reads.join_next().await {
            read.unwrap().unwrap();
        }
        assert!(
            started.elapsed() < Duration::from_millis(800),
            "8 fills took {:?}",
            started.elapsed()
        );

        // An invalidation does not wait behind an unrelated fill's write.
        let fill = tokio::spawn({
            let svc = svc.clone();
            async move { svc.club(99, None).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        svc.invalidate_for_quiz(Some(1)).await;
        assert!(started.elapsed() < Duration::from_millis(100));
        fill.await.unwrap().unwrap();
    }
}
