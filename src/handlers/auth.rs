// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    exam::coordinator,
    models::{
        admin::{Admin, AdminLoginRequest},
        participant::JoinSessionRequest,
        session::SessionSummary,
    },
    utils::{hash::verify_password, jwt::sign_jwt},
};

/// Authenticates a proctor and returns a JWT for the admin API.
pub async fn admin_login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<AdminLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let username = payload.username.trim().to_lowercase();

    let admin: Option<Admin> = sqlx::query_as("SELECT * FROM admins WHERE username = ?")
        .bind(&username)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Admin login DB error: {:?}", e);
            AppError::Persistence(e.to_string())
        })?;

    let admin = admin.ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, &admin.password)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = sign_jwt(
        admin.id,
        &admin.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": {
            "id": admin.id,
            "username": admin.username,
            "role": admin.role,
        }
    })))
}

/// An exam taker joins a session by code. Fails with 404 (and creates
/// no participant) unless a session with that code is active.
pub async fn user_join(
    State(pool): State<SqlitePool>,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::Validation(validation_errors.to_string()));
    }

    let (participant, session) = coordinator::join(&pool, &payload).await?;

    Ok(Json(json!({
        "success": true,
        "user": {
            "id": participant.id,
            "name": participant.name,
            "email": participant.email,
            "mobile": participant.mobile,
        },
        "session": SessionSummary::from(&session),
    })))
}
