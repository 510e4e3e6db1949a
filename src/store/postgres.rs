// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{Answers, Attempt, AttemptSummary, ReplacementPolicy, UpsertOutcome},
        leaderboard::LeaderboardScope,
        quiz::{Question, Quiz},
        user::{ClubMember, Role, UserProfile},
    },
    store::{AttemptStore, MembershipStore, QuizStore, UserStore, should_replace},
};

const ATTEMPT_COLUMNS: &str = "quiz_id, user_id, score, total_marks, percentage, \
     time_taken_seconds, answers, is_passed, attempted_at";

/// Postgres-backed implementation of every store seam.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct QuizRow {
    id: i64,
    club_id: Option<i64>,
    title: String,
    time_limit_minutes: Option<i32>,
    total_marks: i32,
    passing_marks: Option<i32>,
    is_active: bool,
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    text: String,
    options: Json<Vec<String>>,
    correct_answers: Json<Vec<String>>,
    marks: i32,
    sort_order: i32,
}

#[derive(FromRow)]
struct ProfileRow {
    id: i64,
    name: String,
    avatar_url: Option<String>,
    role: String,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AppError::InternalServerError(format!("user {}: {}", row.id, e)))?;
        Ok(UserProfile {
            id: row.id,
            name: row.name,
            avatar_url: row.avatar_url,
            role,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    quiz_id: i64,
    user_id: i64,
    score: i32,
    total_marks: i32,
    percentage: f64,
    time_taken_seconds: i64,
    answers: Json<Answers>,
    is_passed: bool,
    attempted_at: DateTime<Utc>,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Attempt {
            quiz_id: row.quiz_id,
            user_id: row.user_id,
            score: row.score,
            total_marks: row.total_marks,
            percentage: row.percentage,
            time_taken_seconds: row.time_taken_seconds,
            answers: row.answers.0,
            is_passed: row.is_passed,
            attempted_at: row.attempted_at,
        }
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn get_quiz_with_answer_key(&self, quiz_id: i64) -> Result<Option<Quiz>, AppError> {
        let quiz = sqlx::query_as::<_, QuizRow>(
            r#"
            SELECT id, club_id, title, time_limit_minutes, total_marks, passing_marks, is_active
            FROM quizzes
            WHERE id = $1
            "#,
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(quiz) = quiz else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, text, options, correct_answers, marks, sort_order
            FROM questions
            WHERE quiz_id = $1
            ORDER BY sort_order, id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch answer key for quiz {}: {:?}", quiz_id, e);
            AppError::from(e)
        })?;

        Ok(Some(Quiz {
            id: quiz.id,
            club_id: quiz.club_id,
            title: quiz.title,
            questions: questions
                .into_iter()
                .map(|q| Question {
                    id: q.id,
                    text: q.text,
                    options: q.options.0,
                    correct_answers: q.correct_answers.0.into_iter().collect(),
                    marks: q.marks,
                    order: q.sort_order,
                })
                .collect(),
            time_limit_minutes: quiz.time_limit_minutes,
            total_marks: quiz.total_marks,
            passing_marks: quiz.passing_marks,
            is_active: quiz.is_active,
        }))
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn count_memberships(&self, user_ids: &[i64]) -> Result<HashMap<i64, i64>, AppError> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT user_id, COUNT(*)
            FROM club_members
            WHERE user_id = ANY($1)
            GROUP BY user_id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn list_members(&self, club_id: i64) -> Result<Vec<ClubMember>, AppError> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT user_id, joined_at FROM club_members WHERE club_id = $1",
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, joined_at)| ClubMember { user_id, joined_at })
            .collect())
    }
}

/// Converts user rows, skipping (and logging) rows whose role this service
/// does not know. The users table is owned elsewhere.
fn known_profiles(rows: Vec<ProfileRow>) -> Vec<UserProfile> {
    rows.into_iter()
        .filter_map(|row| match UserProfile::try_from(row) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("Skipping user with unreadable profile: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl UserStore for PgStore {
    async fn list_profiles_by_roles(&self, roles: &[Role]) -> Result<Vec<UserProfile>, AppError> {
        let mut roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
        // legacy spelling of `member`
        if roles.iter().any(|r| r == "member") {
            roles.push("student".to_string());
        }

        let rows = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, name, avatar_url, role FROM users WHERE role = ANY($1)",
        )
        .bind(roles)
        .fetch_all(&self.pool)
        .await?;

        Ok(known_profiles(rows))
    }

    async fn get_profiles(&self, user_ids: &[i64]) -> Result<Vec<UserProfile>, AppError> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, name, avatar_url, role FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(known_profiles(rows))
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn start_session(
        &self,
        quiz_id: i64,
        user_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO quiz_sessions (quiz_id, user_id, started_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (quiz_id, user_id) DO UPDATE SET started_at = EXCLUDED.started_at
            "#,
        )
        .bind(quiz_id)
        .bind(user_id)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn session_started_at(
        &self,
        quiz_id: i64,
        user_id: i64,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let started_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT started_at FROM quiz_sessions WHERE quiz_id = $1 AND user_id = $2",
        )
        .bind(quiz_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(started_at)
    }

    async fn upsert_attempt(
        &self,
        attempt: Attempt,
        policy: ReplacementPolicy,
    ) -> Result<UpsertOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM quiz_sessions WHERE quiz_id = $1 AND user_id = $2")
            .bind(attempt.quiz_id)
            .bind(attempt.user_id)
            .execute(&mut *tx)
            .await?;

        // Row lock serialises resubmissions for the same (quiz, user).
        let existing = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2 FOR UPDATE",
            ATTEMPT_COLUMNS
        ))
        .bind(attempt.quiz_id)
        .bind(attempt.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Attempt::from);

        if !should_replace(existing.as_ref(), &attempt, policy) {
            tx.commit().await?;
            return Ok(UpsertOutcome {
                stored: existing.unwrap_or(attempt),
                recorded: false,
                replaced_previous: false,
            });
        }

        // The WHERE clause guards the best-score policy against a concurrent
        // first insert that the row lock above could not see.
        let stored = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"
            INSERT INTO quiz_attempts ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (quiz_id, user_id) DO UPDATE SET
                score = EXCLUDED.score,
                total_marks = EXCLUDED.total_marks,
                percentage = EXCLUDED.percentage,
                time_taken_seconds = EXCLUDED.time_taken_seconds,
                answers = EXCLUDED.answers,
                is_passed = EXCLUDED.is_passed,
                attempted_at = EXCLUDED.attempted_at
            WHERE $10 OR EXCLUDED.score >= quiz_attempts.score
            RETURNING {cols}
            "#,
            cols = ATTEMPT_COLUMNS
        ))
        .bind(attempt.quiz_id)
        .bind(attempt.user_id)
        .bind(attempt.score)
        .bind(attempt.total_marks)
        .bind(attempt.percentage)
        .bind(attempt.time_taken_seconds)
        .bind(Json(&attempt.answers))
        .bind(attempt.is_passed)
        .bind(attempt.attempted_at)
        .bind(policy == ReplacementPolicy::Latest)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert attempt: {:?}", e);
            AppError::from(e)
        })?;

        let outcome = match stored {
            Some(row) => UpsertOutcome {
                stored: row.into(),
                recorded: true,
                replaced_previous: existing.is_some(),
            },
            None => {
                let current = sqlx::query_as::<_, AttemptRow>(&format!(
                    "SELECT {} FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2",
                    ATTEMPT_COLUMNS
                ))
                .bind(attempt.quiz_id)
                .bind(attempt.user_id)
                .fetch_one(&mut *tx)
                .await?;
                UpsertOutcome {
                    stored: current.into(),
                    recorded: false,
                    replaced_previous: false,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_attempt(&self, quiz_id: i64, user_id: i64) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM quiz_attempts WHERE quiz_id = $1 AND user_id = $2",
            ATTEMPT_COLUMNS
        ))
        .bind(quiz_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Attempt::from))
    }

    async fn list_attempt_summaries(
        &self,
        scope: LeaderboardScope,
    ) -> Result<Vec<AttemptSummary>, AppError> {
        let rows = match scope {
            LeaderboardScope::Global => {
                sqlx::query_as::<_, AttemptSummary>(
                    "SELECT quiz_id, user_id, score, percentage, attempted_at FROM quiz_attempts",
                )
                .fetch_all(&self.pool)
                .await
            }
            LeaderboardScope::Club(club_id) => {
                sqlx::query_as::<_, AttemptSummary>(
                    r#"
                    SELECT a.quiz_id, a.user_id, a.score, a.percentage, a.attempted_at
                    FROM quiz_attempts a
                    JOIN quizzes q ON q.id = a.quiz_id
                    WHERE q.club_id = $1
                    "#,
                )
                .bind(club_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| {
            tracing::error!("Failed to read attempts for {}: {:?}", scope, e);
            AppError::from(e)
        })?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, role: &str) -> ProfileRow {
        ProfileRow {
            id,
            name: format!("user{}", id),
            avatar_url: None,
            role: role.to_string(),
        }
    }

    #[test]
    fn unknown_roles_are_skipped_not_fatal() {
        let profiles = known_profiles(vec![
            row(1, "member"),
            row(2, "alumni"),
            row(3, "student"),
            row(4, "coordinator"),
        ]);

        let ids: Vec<i64> = profiles.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(profiles[1].role, Role::Member);
    }
}
