// src/state.rs

use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;

use crate::{
    cache::LeaderboardCache,
    config::Config,
    services::{leaderboard::LeaderboardService, recorder::AttemptRecorder},
    store::Stores,
    utils::clock::Clock,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub recorder: Arc<AttemptRecorder>,
    pub leaderboards: Arc<LeaderboardService>,
}

impl AppState {
    /// Wires the services against the given stores, cache and time source.
    pub fn new(
        config: Config,
        stores: Stores,
        cache: Arc<dyn LeaderboardCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_secs(config.leaderboard_cache_ttl_secs);
        let leaderboards = Arc::new(LeaderboardService::new(stores.clone(), cache, ttl));
        let recorder = Arc::new(AttemptRecorder::new(
            stores.quizzes,
            stores.attempts,
            leaderboards.clone(),
            clock,
            config.replacement_policy,
        ));

        Self {
            config,
            recorder,
            leaderboards,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<AttemptRecorder> {
    fn from_ref(state: &AppState) -> Self {
        state.recorder.clone()
    }
}

impl FromRef<AppState> for Arc<LeaderboardService> {
    fn from_ref(state: &AppState) -> Self {
        state.leaderboards.clone()
    }
}
