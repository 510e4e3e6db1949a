// src/store/mod.rs

//! Persistence seams consumed by the quiz engine.
//!
//! Quizzes, memberships and user profiles belong to other parts of the
//! application and are read-only here. Attempts and quiz sessions are the
//! only state this crate writes.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptSummary, ReplacementPolicy, UpsertOutcome},
        leaderboard::LeaderboardScope,
        quiz::Quiz,
        user::{ClubMember, Role, UserProfile},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read access to quizzes including their answer keys.
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn get_quiz_with_answer_key(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError>;
}

/// Read access to club memberships.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Number of clubs joined per user. Users without memberships may be absent.
    async fn count_memberships(&self, user_ids: &[i64]) -> Result<HashMap<i64, i64>, AppError>;

    /// Members of a club with their join timestamps.
    async fn list_members(&self, club_id: i64) -> Result<Vec<ClubMember>, AppError>;
}

/// Read access to user display fields.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_profiles_by_roles(&self, roles: &[Role]) -> Result<Vec<UserProfile>, AppError>;

    async fn get_profiles(&self, user_ids: &[i64]) -> Result<Vec<UserProfile>, AppError>;
}

/// Durable attempts and in-progress sessions, keyed by (quiz, user).
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Creates or resets the in-progress session for (quiz, user).
    async fn start_session(
        &self,
        quiz_id: i64,
        user_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn session_started_at(
        &self,
        quiz_id: i64,
        user_id: i64,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Writes the attempt for (quiz, user) according to `policy` and clears
    /// the session, as one atomic step. Either everything is applied or nothing.
    async fn upsert_attempt(
        &self,
        attempt: Attempt,
        policy: ReplacementPolicy,
    ) -> Result<UpsertOutcome, AppError>;

    async fn find_attempt(&self, quiz_id: i64, user_id: i64) -> Result<Option<Attempt>, AppError>;

    /// Bulk read of the attempts counted by a leaderboard scope.
    async fn list_attempt_summaries(
        &self,
        scope: LeaderboardScope,
    ) -> Result<Vec<AttemptSummary>, AppError>;
}

/// The set of stores the services are wired against.
#[derive(Clone)]
pub struct Stores {
    pub quizzes: Arc<dyn QuizStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// Uses one backend for every seam.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: QuizStore + AttemptStore + MembershipStore + UserStore + 'static,
    {
        Self {
            quizzes: backend.clone(),
            attempts: backend.clone(),
            memberships: backend.clone(),
            users: backend,
        }
    }
}

/// Decides whether a new attempt overwrites the stored one.
pub(crate) fn should_replace(
    existing: Option<&Attempt>,
    incoming: &Attempt,
    policy: ReplacementPolicy,
) -> bool {
    match (policy, existing) {
        (_, None) => true,
        (ReplacementPolicy::Latest, Some(_)) => true,
        (ReplacementPolicy::Best, Some(prev)) => incoming.score >= prev.score,
    }
}
