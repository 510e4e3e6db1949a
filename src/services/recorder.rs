// src/services/recorder.rs

use std::sync::Arc;

use crate::{
    error::AppError,
    models::{
        attempt::{Answers, Attempt, AttemptOutcome, ReplacementPolicy},
        quiz::{PublicQuiz, Quiz},
    },
    services::{leaderboard::LeaderboardService, scoring},
    store::{AttemptStore, QuizStore},
    utils::clock::Clock,
};

/// Starts, grades and stores quiz attempts.
///
/// Elapsed time is always measured from the server-side session start, never
/// from what the client reports.
pub struct AttemptRecorder {
    quizzes: Arc<dyn QuizStore>,
    attempts: Arc<dyn AttemptStore>,
    leaderboards: Arc<LeaderboardService>,
    clock: Arc<dyn Clock>,
    policy: ReplacementPolicy,
}

impl AttemptRecorder {
    pub fn new(
        quizzes: Arc<dyn QuizStore>,
        attempts: Arc<dyn AttemptStore>,
        leaderboards: Arc<LeaderboardService>,
        clock: Arc<dyn Clock>,
        policy: ReplacementPolicy,
    ) -> Self {
        Self {
            quizzes,
            attempts,
            leaderboards,
            clock,
            policy,
        }
    }

    /// Opens (or restarts) the timed session and hands out the quiz without answers.
    pub async fn start_attempt(&self, quiz_id: i64, user_id: i64) -> Result<PublicQuiz, AppError> {
        let quiz = self.active_quiz(quiz_id).await?;
        let started_at = self.clock.now();

        self.attempts
            .start_session(quiz_id, user_id, started_at)
            .await?;

        tracing::info!("User {} started quiz {}", user_id, quiz_id);
        Ok(PublicQuiz::from(&quiz))
    }

    /// Grades a submission and upserts the (quiz, user) attempt.
    ///
    /// * Rejects submissions for missing or inactive quizzes.
    /// * Rejects submissions past the time limit without touching the stored attempt.
    /// * Invalidates the global and owning-club leaderboards after the write.
    pub async fn record_attempt(
        &self,
        quiz_id: i64,
        user_id: i64,
        answers: Answers,
        client_elapsed_seconds: Option<i64>,
    ) -> Result<AttemptOutcome, AppError> {
        let quiz = self.active_quiz(quiz_id).await?;
        let now = self.clock.now();

        let elapsed_seconds = match self.attempts.session_started_at(quiz_id, user_id).await? {
            Some(started_at) => (now - started_at).num_seconds().max(0),
            None => 0,
        };

        if let Some(reported) = client_elapsed_seconds {
            if (reported - elapsed_seconds).abs() > 5 {
                tracing::debug!(
                    "Client reported {}s for quiz {} (user {}), server measured {}s",
                    reported,
                    quiz_id,
                    user_id,
                    elapsed_seconds
                );
            }
        }

        if let Some(limit_minutes) = quiz.time_limit_minutes.filter(|m| *m > 0) {
            if elapsed_seconds > i64::from(limit_minutes) * 60 {
                tracing::info!(
                    "Rejected late submission for quiz {} by user {} ({}s > {}min)",
                    quiz_id,
                    user_id,
                    elapsed_seconds,
                    limit_minutes
                );
                return Err(AppError::TimeLimitExceeded {
                    limit_minutes,
                    elapsed_seconds,
                });
            }
        }

        let result = scoring::score(&quiz, &answers);

        let mut answers = answers;
        answers.retain(|id, _| quiz.questions.iter().any(|q| q.id == *id));

        let attempt = Attempt {
            quiz_id,
            user_id,
            score: result.score,
            total_marks: result.total_marks,
            percentage: result.percentage,
            time_taken_seconds: elapsed_seconds,
            answers,
            is_passed: result.is_passed,
            attempted_at: now,
        };

        let outcome = self.attempts.upsert_attempt(attempt, self.policy).await?;

        self.leaderboards.invalidate_for_quiz(quiz.club_id).await;

        tracing::info!(
            "Recorded attempt for quiz {} by user {}: score {}/{} (recorded: {}, replaced: {})",
            quiz_id,
            user_id,
            result.score,
            result.total_marks,
            outcome.recorded,
            outcome.replaced_previous
        );

        Ok(AttemptOutcome {
            attempt: outcome.stored,
            result,
            recorded: outcome.recorded,
            replaced_previous: outcome.replaced_previous,
        })
    }

    /// Returns the stored attempt of a user for a quiz.
    pub async fn get_attempt(&self, quiz_id: i64, user_id: i64) -> Result<Attempt, AppError> {
        self.attempts
            .find_attempt(quiz_id, user_id)
            .await?
            .ok_or(AppError::NotFound("No attempt for this quiz".to_string()))
    }

    async fn active_quiz(&self, quiz_id: i64) -> Result<Quiz, AppError> {
        match self.quizzes.get_quiz_with_answer_key(quiz_id).await? {
            Some(quiz) if quiz.is_active => Ok(quiz),
            _ => Err(AppError::QuizNotFound(quiz_id)),
        }
    }
}
