// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError, models::attempt::SubmitAttemptRequest, services::recorder::AttemptRecorder,
    utils::jwt::Claims,
};

/// Starts the timer for a quiz and returns the paper without answer keys.
pub async fn start_quiz(
    State(recorder): State<Arc<AttemptRecorder>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let paper = recorder.start_attempt(quiz_id, user_id).await?;

    Ok(Json(paper))
}

/// Submits answers for a quiz.
///
/// * The user is taken from the token; a `userId` in the body must match it.
/// * Scores the submission and replaces the caller's previous attempt.
/// * Late submissions are rejected with 422 and leave the stored attempt alone.
pub async fn submit_quiz(
    State(recorder): State<Arc<AttemptRecorder>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user_id = claims.user_id()?;
    if let Some(body_user) = req.user_id {
        if body_user != user_id {
            tracing::warn!(
                "User {} tried to submit quiz {} as user {}",
                user_id,
                req.quiz_id,
                body_user
            );
            return Err(AppError::Forbidden(
                "Cannot submit an attempt for another user".to_string(),
            ));
        }
    }

    let outcome = recorder
        .record_attempt(req.quiz_id, user_id, req.answers, req.client_elapsed_seconds)
        .await?;

    Ok(Json(outcome))
}

/// Returns the caller's stored attempt for a quiz.
pub async fn get_my_attempt(
    State(recorder): State<Arc<AttemptRecorder>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = recorder.get_attempt(quiz_id, user_id).await?;

    Ok(Json(attempt))
}
