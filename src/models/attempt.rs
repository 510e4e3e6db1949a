// src/models/attempt.rs

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// One submitted option. Clients may send the option index as a number
/// or as its string identifier; both are compared as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Index(i64),
    Text(String),
}

impl AnswerValue {
    /// Coerces the value to the representation used in `correct_answers`.
    pub fn as_key(&self) -> String {
        match self {
            AnswerValue::Index(i) => i.to_string(),
            AnswerValue::Text(s) => s.trim().to_string(),
        }
    }
}

/// The answer given for one question: a single option or a list of options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    One(AnswerValue),
    Many(Vec<AnswerValue>),
}

/// User's answers map.
/// Key: Question ID
/// Value: the chosen option(s)
pub type Answers = HashMap<i64, SubmittedAnswer>;

/// The single stored attempt of a user for a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub quiz_id: i64,
    pub user_id: i64,
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub time_taken_seconds: i64,
    pub answers: Answers,
    pub is_passed: bool,
    pub attempted_at: DateTime<Utc>,
}

/// The columns of an attempt needed for ranking.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AttemptSummary {
    pub quiz_id: i64,
    pub user_id: i64,
    pub score: i32,
    pub percentage: f64,
    pub attempted_at: DateTime<Utc>,
}

impl From<&Attempt> for AttemptSummary {
    fn from(a: &Attempt) -> Self {
        AttemptSummary {
            quiz_id: a.quiz_id,
            user_id: a.user_id,
            score: a.score,
            percentage: a.percentage,
            attempted_at: a.attempted_at,
        }
    }
}

/// Outcome of grading one submission, independent of storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub is_passed: bool,
    pub correct_count: usize,
    pub total_questions: usize,
}

/// What happens to a stored attempt when the same user submits again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    /// The newest submission always overwrites the stored one.
    #[default]
    Latest,
    /// The stored attempt is only overwritten by an equal or higher score.
    Best,
}

impl FromStr for ReplacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(ReplacementPolicy::Latest),
            "best" => Ok(ReplacementPolicy::Best),
            other => Err(format!(
                "unknown replacement policy '{}', expected 'latest' or 'best'",
                other
            )),
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Latest => write!(f, "latest"),
            ReplacementPolicy::Best => write!(f, "best"),
        }
    }
}

/// Result of an upsert against the attempt store.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// The row as stored after the write.
    pub stored: Attempt,
    /// False when the policy kept the previous attempt.
    pub recorded: bool,
    /// True when an earlier attempt existed and was overwritten.
    pub replaced_previous: bool,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    pub quiz_id: i64,

    /// Optional; must match the authenticated user when present.
    pub user_id: Option<i64>,

    #[serde(default)]
    pub answers: Answers,

    /// Informational only. Elapsed time is measured from the server-side start.
    #[validate(range(min = 0))]
    pub client_elapsed_seconds: Option<i64>,
}

/// Response for a recorded submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    /// The attempt as stored after this submission.
    pub attempt: Attempt,
    /// Grading of this submission.
    pub result: ScoreResult,
    pub recorded: bool,
    pub replaced_previous: bool,
}
