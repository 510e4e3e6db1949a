// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptSummary, ReplacementPolicy, UpsertOutcome},
        leaderboard::LeaderboardScope,
        quiz::Quiz,
        user::{ClubMember, Role, UserProfile},
    },
    store::{AttemptStore, MembershipStore, QuizStore, UserStore, should_replace},
};

#[derive(Default)]
struct MemoryState {
    quizzes: HashMap<i64, Quiz>,
    users: BTreeMap<i64, UserProfile>,
    members: HashMap<i64, Vec<ClubMember>>,
    sessions: HashMap<(i64, i64), DateTime<Utc>>,
    attempts: BTreeMap<(i64, i64), Attempt>,
}

/// In-process store used for local runs and tests.
///
/// All state sits behind one async mutex, so every write is atomic with
/// respect to every other write.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_quiz(&self, quiz: Quiz) {
        self.state.lock().await.quizzes.insert(quiz.id, quiz);
    }

    pub async fn insert_user(&self, profile: UserProfile) {
        self.state.lock().await.users.insert(profile.id, profile);
    }

    pub async fn add_membership(&self, club_id: i64, user_id: i64, joined_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let members = state.members.entry(club_id).or_default();
        members.retain(|m| m.user_id != user_id);
        members.push(ClubMember { user_id, joined_at });
    }

    /// Number of stored attempt rows across all quizzes.
    pub async fn attempt_count(&self) -> usize {
        self.state.lock().await.attempts.len()
    }

    /// Makes every subsequent write fail like an unavailable database.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(
                "attempt store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn get_quiz_with_answer_key(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.state.lock().await.quizzes.get(&quiz_id).cloned())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn count_memberships(&self, user_ids: &[i64]) -> Result<HashMap<i64, i64>, AppError> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for members in state.members.values() {
            for m in members.iter().filter(|m| user_ids.contains(&m.user_id)) {
                *counts.entry(m.user_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn list_members(&self, club_id: i64) -> Result<Vec<ClubMember>, AppError> {
        let state = self.state.lock().await;
        Ok(state.members.get(&club_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn list_profiles_by_roles(&self, roles: &[Role]) -> Result<Vec<UserProfile>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| roles.contains(&u.role))
            .cloned()
            .collect())
    }

    async fn get_profiles(&self, user_ids: &[i64]) -> Result<Vec<UserProfile>, AppError> {
        let state = self.state.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn start_session(
        &self,
        quiz_id: i64,
        user_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check_writable()?;
        self.state
            .lock()
            .await
            .sessions
            .insert((quiz_id, user_id), started_at);
        Ok(())
    }

    async fn session_started_at(
        &self,
        quiz_id: i64,
        user_id: i64,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .sessions
            .get(&(quiz_id, user_id))
            .copied())
    }

    async fn upsert_attempt(
        &self,
        attempt: Attempt,
        policy: ReplacementPolicy,
    ) -> Result<UpsertOutcome, AppError> {
        self.check_writable()?;

        let key = (attempt.quiz_id, attempt.user_id);
        let mut state = self.state.lock().await;
        state.sessions.remove(&key);

        let existing = state.attempts.get(&key).cloned();
        let replaced_previous = existing.is_some();

        if should_replace(existing.as_ref(), &attempt, policy) {
            state.attempts.insert(key, attempt.clone());
            Ok(UpsertOutcome {
                stored: attempt,
                recorded: true,
                replaced_previous,
            })
        } else {
            let stored = existing.unwrap_or(attempt);
            Ok(UpsertOutcome {
                stored,
                recorded: false,
                replaced_previous: false,
            })
        }
    }

    async fn find_attempt(&self, quiz_id: i64, user_id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .attempts
            .get(&(quiz_id, user_id))
            .cloned())
    }

    async fn list_attempt_summaries(
        &self,
        scope: LeaderboardScope,
    ) -> Result<Vec<AttemptSummary>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| match scope {
                LeaderboardScope::Global => true,
                LeaderboardScope::Club(club_id) => state
                    .quizzes
                    .get(&a.quiz_id)
                    .is_some_and(|q| q.club_id == Some(club_id)),
            })
            .map(AttemptSummary::from)
            .collect())
    }
}
