// src/handlers/leaderboard.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::leaderboard::{LeaderboardParams, UserRankResponse},
    services::leaderboard::LeaderboardService,
};

fn checked_limit(params: &LeaderboardParams) -> Result<Option<usize>, AppError> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(params.limit.map(|l| l as usize))
}

/// Global leaderboard over all members and coordinators.
pub async fn global_leaderboard(
    State(leaderboards): State<Arc<LeaderboardService>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = checked_limit(&params)?;
    let rows = leaderboards.global(limit).await?;

    Ok(Json(rows))
}

/// Leaderboard of one club, counting only that club's quizzes.
pub async fn club_leaderboard(
    State(leaderboards): State<Arc<LeaderboardService>>,
    Path(club_id): Path<i64>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = checked_limit(&params)?;
    let rows = leaderboards.club(club_id, limit).await?;

    Ok(Json(rows))
}

pub async fn user_rank(
    State(leaderboards): State<Arc<LeaderboardService>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let rank = leaderboards.user_rank(user_id).await?;

    Ok(Json(UserRankResponse::from(rank)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_outside_range_is_bad_request() {
        for limit in [0, 501] {
            let params = LeaderboardParams { limit: Some(limit) };
            assert!(matches!(checked_limit(&params), Err(AppError::BadRequest(_))));
        }
        assert_eq!(checked_limit(&LeaderboardParams { limit: Some(500) }).unwrap(), Some(500));
        assert_eq!(checked_limit(&LeaderboardParams::default()).unwrap(), None);
    }
}
