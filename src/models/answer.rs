// src/models/answer.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use super::question::QuestionKind;

/// Represents the 'answer_records' table: one row per (session, participant).
/// `submitted` is the check-and-set flag that makes scoring final.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: i64,
    pub session_id: i64,
    pub participant_id: i64,
    pub score: i64,
    pub total_questions: i64,
    pub submitted: bool,
    pub submitted_at: Option<chrono::NaiveDateTime>,
    pub time_taken_secs: Option<i64>,
    pub auto_saved: bool,
}

/// Represents the 'answer_items' table: per-question entries of a record,
/// insertion-ordered by `position`, upserted by question id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerItem {
    pub record_id: i64,
    pub question_id: i64,
    pub kind: QuestionKind,
    pub selected_answer: Option<String>,
    pub code_answer: Option<String>,
    /// Set at finalize for mcq questions only; code answers stay NULL.
    pub is_correct: Option<bool>,
    pub position: i64,
}

/// Wire shape of a single answer in auto-save and submit batches.
/// `kind` is kept as a raw string so a bad value rejects the whole batch
/// with our own validation error instead of a deserialization failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub question_id: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub selected_answer: Option<String>,
    #[serde(default)]
    pub code_answer: Option<String>,
}

/// DTO for auto-save and submit requests.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBatchRequest {
    pub session_id: i64,
    pub participant_id: i64,
    pub answers: Vec<AnswerEntry>,
    /// Elapsed seconds reported by the client on submit.
    #[serde(default)]
    pub time_taken: Option<i64>,
}

/// Outcome of finalizing a participant's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamScore {
    pub score: i64,
    /// Count of mcq questions in the session; code questions never
    /// contribute to the denominator.
    pub total_scored_questions: i64,
}

/// Joined row for the proctor-facing reports listing.
#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub id: i64,
    pub participant_name: String,
    pub participant_email: String,
    pub participant_mobile: String,
    pub session_name: String,
    pub session_code: String,
    pub score: i64,
    pub total_questions: i64,
    pub submitted_at: Option<chrono::NaiveDateTime>,
}
