// src/models/user.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role as stored in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Coordinator,
    Faculty,
    Admin,
}

impl Role {
    /// Roles that take quizzes and therefore appear on the global leaderboard.
    pub const RANKED: [Role; 2] = [Role::Member, Role::Coordinator];

    pub fn is_ranked(self) -> bool {
        Self::RANKED.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Coordinator => "coordinator",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" | "student" => Ok(Role::Member),
            "coordinator" => Ok(Role::Coordinator),
            "faculty" => Ok(Role::Faculty),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display fields of a user, read at leaderboard query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
}

/// A row of `club_members`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClubMember {
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
}
