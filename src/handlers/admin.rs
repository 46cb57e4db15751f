// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    exam::lifecycle::{self, TerminationReason},
    models::{
        answer::ReportRow,
        question::{CreateQuestionRequest, Question},
        session::{AttachQuestionsRequest, CreateSessionRequest, Session},
    },
    state::AppState,
    utils::code::generate_join_code,
};

/// Lists all questions, newest first. Admin only.
pub async fn list_questions(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let questions: Vec<Question> = sqlx::query_as("SELECT * FROM questions ORDER BY id DESC")
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list questions: {:?}", e);
            AppError::Persistence(e.to_string())
        })?;

    Ok(Json(json!({ "success": true, "questions": questions })))
}

/// Creates a question. MCQ questions need all four options plus the
/// correct letter; code questions need a starter template.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }
    if let Err(msg) = payload.validate_kind_fields() {
        return Err(AppError::Validation(msg));
    }

    let id = sqlx::query(
        "INSERT INTO questions
             (text, kind, option_a, option_b, option_c, option_d, correct_answer,
              coding_template, difficulty, category)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.text)
    .bind(payload.kind)
    .bind(&payload.option_a)
    .bind(&payload.option_b)
    .bind(&payload.option_c)
    .bind(&payload.option_d)
    .bind(&payload.correct_answer)
    .bind(&payload.coding_template)
    .bind(payload.difficulty.as_deref().unwrap_or("medium"))
    .bind(payload.category.as_deref().unwrap_or("general"))
    .execute(&pool)
    .await?
    .last_insert_rowid();

    let question: Question = sqlx::query_as("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "question": question })),
    ))
}

/// Replaces a question's content. Admin edit is the only mutation a
/// question ever sees after creation.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }
    if let Err(msg) = payload.validate_kind_fields() {
        return Err(AppError::Validation(msg));
    }

    let result = sqlx::query(
        "UPDATE questions
         SET text = ?, kind = ?, option_a = ?, option_b = ?, option_c = ?, option_d = ?,
             correct_answer = ?, coding_template = ?, difficulty = ?, category = ?
         WHERE id = ?",
    )
    .bind(&payload.text)
    .bind(payload.kind)
    .bind(&payload.option_a)
    .bind(&payload.option_b)
    .bind(&payload.option_c)
    .bind(&payload.option_d)
    .bind(&payload.correct_answer)
    .bind(&payload.coding_template)
    .bind(payload.difficulty.as_deref().unwrap_or("medium"))
    .bind(payload.category.as_deref().unwrap_or("general"))
    .bind(id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

/// Deletes a question. Sessions referencing it simply see their
/// question list shortened.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

/// Lists all sessions, newest first. Admin only.
pub async fn list_sessions(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let sessions: Vec<Session> = sqlx::query_as("SELECT * FROM sessions ORDER BY id DESC")
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list sessions: {:?}", e);
            AppError::Persistence(e.to_string())
        })?;

    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

/// Creates a session in `pending` state with a fresh join code. If no
/// question list is supplied, every existing question is attached.
pub async fn create_session(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    // The code column is unique; retry on the (rare) collision.
    let mut session_id = None;
    for _ in 0..5 {
        let code = generate_join_code();
        let inserted = sqlx::query(
            "INSERT INTO sessions (name, code, start_time, duration_minutes) VALUES (?, ?, ?, ?)",
        )
        .bind(&payload.name)
        .bind(&code)
        .bind(&payload.start_time)
        .bind(payload.duration)
        .execute(&pool)
        .await;

        match inserted {
            Ok(result) => {
                session_id = Some(result.last_insert_rowid());
                break;
            }
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => continue,
            Err(e) => return Err(AppError::from(e)),
        }
    }
    let session_id = session_id
        .ok_or_else(|| AppError::Persistence("Could not allocate a join code".to_string()))?;

    let question_ids = match payload.questions {
        Some(ids) if !ids.is_empty() => ids,
        _ => {
            let all: Vec<(i64,)> = sqlx::query_as("SELECT id FROM questions ORDER BY id")
                .fetch_all(&pool)
                .await?;
            all.into_iter().map(|(id,)| id).collect()
        }
    };
    attach(&pool, session_id, &question_ids).await?;

    let session: Session = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_one(&pool)
        .await?;

    tracing::info!(session_id, code = %session.code, "Session created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "session": session })),
    ))
}

async fn attach(pool: &SqlitePool, session_id: i64, question_ids: &[i64]) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM session_questions WHERE session_id = ?")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    for (position, question_id) in question_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO session_questions (session_id, question_id, position) VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind(question_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Activates a pending session, making it joinable.
pub async fn activate_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = lifecycle::activate(&state.pool, &state.locks, id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

/// Proctor-initiated termination. Idempotent; every connected client in
/// the session's room is notified.
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = lifecycle::terminate(
        &state.pool,
        &state.locks,
        &state.router,
        id,
        TerminationReason::Proctor,
    )
    .await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

/// Deletes a session and its dependent rows.
pub async fn delete_session(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Session not found".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

/// Replaces a session's question set.
pub async fn attach_questions(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<AttachQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.questions.is_empty() {
        return Err(AppError::Validation("Questions array is required".to_string()));
    }

    let session: Option<Session> = sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    let session = session.ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "Cannot modify questions of a '{}' session",
            session.status
        )));
    }

    attach(&pool, id, &payload.questions).await?;

    Ok(Json(json!({ "success": true, "session": session })))
}

/// Lists submitted exam reports, newest first.
pub async fn list_reports(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let reports: Vec<ReportRow> = sqlx::query_as(
        "SELECT ar.id,
                p.name AS participant_name,
                p.email AS participant_email,
                p.mobile AS participant_mobile,
                s.name AS session_name,
                s.code AS session_code,
                ar.score,
                ar.total_questions,
                ar.submitted_at
         FROM answer_records ar
         JOIN participants p ON p.id = ar.participant_id
         JOIN sessions s ON s.id = ar.session_id
         WHERE ar.submitted = 1
         ORDER BY ar.submitted_at DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch reports: {:?}", e);
        AppError::Persistence(e.to_string())
    })?;

    Ok(Json(json!({ "success": true, "reports": reports })))
}
