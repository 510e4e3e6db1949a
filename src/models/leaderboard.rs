// src/models/leaderboard.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::user::Role;

/// The population and quiz set a leaderboard ranks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaderboardScope {
    /// All quizzes, all members and coordinators.
    Global,
    /// One club's quizzes and members.
    Club(i64),
}

impl LeaderboardScope {
    /// Stable identifier used as the cache key.
    pub fn cache_key(&self) -> String {
        match self {
            LeaderboardScope::Global => "global".to_string(),
            LeaderboardScope::Club(id) => format!("club:{}", id),
        }
    }
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// One ranked row of a leaderboard.
/// Derived from attempts at query time, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    /// 1-based position within the requested scope.
    pub rank: u32,
    pub user_id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub total_score: i64,
    pub quizzes_completed: i64,
    pub avg_percentage: f64,

    /// Only present on the global leaderboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clubs_joined: Option<i64>,
}

/// Query parameters for leaderboard endpoints.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct LeaderboardParams {
    /// Number of rows to return (default depends on scope, max 500).
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<u64>,
}

/// Position of a single user on the global leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub enum UserRank {
    Ranked(LeaderboardRow),
    NotRanked,
}

/// Response body for the user rank endpoint.
#[derive(Debug, Serialize)]
pub struct UserRankResponse {
    pub ranked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<LeaderboardRow>,
}

impl From<UserRank> for UserRankResponse {
    fn from(rank: UserRank) -> Self {
        match rank {
            UserRank::Ranked(row) => UserRankResponse {
                ranked: true,
                row: Some(row),
            },
            UserRank::NotRanked => UserRankResponse {
                ranked: false,
                row: None,
            },
        }
    }
}
