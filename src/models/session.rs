// src/models/session.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::exam::lifecycle::SessionStatus;

/// Represents the 'sessions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub name: String,
    /// 6-character join code, unique per session.
    pub code: String,
    pub start_time: String,
    pub duration_minutes: i64,
    pub status: SessionStatus,
    pub created_at: Option<chrono::NaiveDateTime>,
}

/// Compact session view returned to a participant on join.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub name: String,
    pub duration: i64,
    pub status: SessionStatus,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            duration: s.duration_minutes,
            status: s.status,
        }
    }
}

/// DTO for creating a new session. If `questions` is omitted or empty,
/// every existing question is attached.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub start_time: String,
    #[validate(range(min = 1, max = 1440))]
    pub duration: i64,
    pub questions: Option<Vec<i64>>,
}

/// DTO for replacing a session's question set.
#[derive(Debug, Deserialize)]
pub struct AttachQuestionsRequest {
    pub questions: Vec<i64>,
}
