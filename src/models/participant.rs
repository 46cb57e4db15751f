// src/models/participant.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'participants' table in the database.
/// Rows are immutable after insert except for `is_active`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub session_id: i64,
    pub joined_at: Option<chrono::NaiveDateTime>,
    pub is_active: bool,
}

/// DTO for an exam taker joining a session by code.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 20))]
    pub mobile: String,
    #[validate(length(min = 1, max = 12))]
    pub session_code: String,
}
