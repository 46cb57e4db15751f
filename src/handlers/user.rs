// src/handlers/user.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{error::AppError, exam::coordinator, models::answer::AnswerBatchRequest, state::AppState};

/// Returns the session's questions in a fresh random order, answer keys
/// withheld.
pub async fn get_questions(
    State(pool): State<SqlitePool>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let questions = coordinator::questions_for_session(&pool, session_id).await?;
    Ok(Json(json!({ "success": true, "questions": questions })))
}

/// Auto-saves a batch of answers. The batch is validated as a whole;
/// one malformed entry rejects everything with no partial effect.
pub async fn auto_save(
    State(pool): State<SqlitePool>,
    Json(payload): Json<AnswerBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    coordinator::autosave(
        &pool,
        payload.session_id,
        payload.participant_id,
        &payload.answers,
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

/// Final submission: scores the record, completes the session for
/// everyone in it, and broadcasts the termination events.
pub async fn submit_exam(
    State(state): State<AppState>,
    Json(payload): Json<AnswerBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = coordinator::submit(
        &state.pool,
        &state.locks,
        &state.router,
        payload.session_id,
        payload.participant_id,
        &payload.answers,
        payload.time_taken,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "score": outcome.score,
        "totalQuestions": outcome.total_questions,
        "percentage": outcome.percentage,
    })))
}
