// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;

use crate::error::AppError;

async fn count(pool: &SqlitePool, table: &str) -> Result<i64, AppError> {
    // Table names come from the fixed list below, never from input.
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Entity counts plus a status stamp, for deployment smoke checks.
pub async fn health(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(json!({
        "status": "OK",
        "questions": count(&pool, "questions").await?,
        "sessions": count(&pool, "sessions").await?,
        "participants": count(&pool, "participants").await?,
        "admins": count(&pool, "admins").await?,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
