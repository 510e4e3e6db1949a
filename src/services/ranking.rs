// src/services/ranking.rs

//! Leaderboard aggregation and ordering.
//!
//! Everything here is a pure function of its inputs. Attempts are folded in
//! (quiz_id) order before averaging so the float sums, and therefore the
//! ordering, do not depend on the order the store returned them in.

use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Utc};

use crate::models::{
    attempt::AttemptSummary,
    leaderboard::LeaderboardRow,
    user::{ClubMember, UserProfile},
};

/// Per-user totals over the attempts of one scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserAggregate {
    pub user_id: i64,
    pub total_score: i64,
    pub quizzes_completed: i64,
    pub avg_percentage: f64,
    pub last_attempted_at: Option<DateTime<Utc>>,
}

/// Folds one user's attempts. No attempts gives an all-zero aggregate.
pub fn aggregate(user_id: i64, attempts: &[&AttemptSummary]) -> UserAggregate {
    let mut sorted: Vec<&AttemptSummary> = attempts.to_vec();
    sorted.sort_by_key(|a| a.quiz_id);

    let quizzes_completed = sorted.len() as i64;
    let total_score = sorted.iter().map(|a| i64::from(a.score)).sum();
    let avg_percentage = if quizzes_completed == 0 {
        0.0
    } else {
        let sum: f64 = sorted.iter().map(|a| a.percentage).sum();
        round2(sum / quizzes_completed as f64)
    };

    UserAggregate {
        user_id,
        total_score,
        quizzes_completed,
        avg_percentage,
        last_attempted_at: sorted.iter().map(|a| a.attempted_at).max(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn group_by_user(attempts: &[AttemptSummary]) -> HashMap<i64, Vec<&AttemptSummary>> {
    let mut grouped: HashMap<i64, Vec<&AttemptSummary>> = HashMap::new();
    for a in attempts {
        grouped.entry(a.user_id).or_default().push(a);
    }
    grouped
}

struct Candidate<'a> {
    profile: &'a UserProfile,
    totals: UserAggregate,
    clubs_joined: i64,
    joined_at: Option<DateTime<Utc>>,
}

/// Global order: score desc, clubs joined asc, quizzes desc, average desc,
/// latest attempt asc, user id asc.
fn global_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.totals
        .total_score
        .cmp(&a.totals.total_score)
        .then(a.clubs_joined.cmp(&b.clubs_joined))
        .then(b.totals.quizzes_completed.cmp(&a.totals.quizzes_completed))
        .then(b.totals.avg_percentage.total_cmp(&a.totals.avg_percentage))
        .then(a.totals.last_attempted_at.cmp(&b.totals.last_attempted_at))
        .then(a.totals.user_id.cmp(&b.totals.user_id))
}

/// Club order: score desc, quizzes desc, average desc, joined asc, user id asc.
fn club_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.totals
        .total_score
        .cmp(&a.totals.total_score)
        .then(b.totals.quizzes_completed.cmp(&a.totals.quizzes_completed))
        .then(b.totals.avg_percentage.total_cmp(&a.totals.avg_percentage))
        .then(a.joined_at.cmp(&b.joined_at))
        .then(a.totals.user_id.cmp(&b.totals.user_id))
}

fn into_rows(candidates: Vec<Candidate>, with_clubs: bool) -> Vec<LeaderboardRow> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| LeaderboardRow {
            rank: i as u32 + 1,
            user_id: c.profile.id,
            name: c.profile.name.clone(),
            avatar_url: c.profile.avatar_url.clone(),
            role: c.profile.role,
            total_score: c.totals.total_score,
            quizzes_completed: c.totals.quizzes_completed,
            avg_percentage: c.totals.avg_percentage,
            clubs_joined: with_clubs.then_some(c.clubs_joined),
        })
        .collect()
}

/// Ranks every eligible profile that has at least one attempt.
///
/// `profiles` must already be restricted to ranked roles; profiles with
/// other roles are skipped. Missing membership counts read as 0.
pub fn rank_global(
    profiles: &[UserProfile],
    membership_counts: &HashMap<i64, i64>,
    attempts: &[AttemptSummary],
) -> Vec<LeaderboardRow> {
    let grouped = group_by_user(attempts);

    let mut candidates: Vec<Candidate> = profiles
        .iter()
        .filter(|p| p.role.is_ranked())
        .filter_map(|p| {
            let own = grouped.get(&p.id)?;
            Some(Candidate {
                profile: p,
                totals: aggregate(p.id, own),
                clubs_joined: membership_counts.get(&p.id).copied().unwrap_or(0),
                joined_at: None,
            })
        })
        .collect();

    candidates.sort_by(global_order);
    into_rows(candidates, true)
}

/// Ranks the members of one club over that club's attempts.
/// Attempts by non-members are ignored.
pub fn rank_club(
    members: &[ClubMember],
    profiles: &[UserProfile],
    attempts: &[AttemptSummary],
) -> Vec<LeaderboardRow> {
    let grouped = group_by_user(attempts);
    let profiles: HashMap<i64, &UserProfile> = profiles.iter().map(|p| (p.id, p)).collect();

    let mut candidates: Vec<Candidate> = members
        .iter()
        .filter_map(|m| {
            let profile = *profiles.get(&m.user_id)?;
            let own = grouped.get(&m.user_id)?;
            Some(Candidate {
                profile,
                totals: aggregate(m.user_id, own),
                clubs_joined: 0,
                joined_at: Some(m.joined_at),
            })
        })
        .collect();

    candidates.sort_by(club_order);
    into_rows(candidates, false)
}
