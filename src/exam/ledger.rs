// src/exam/ledger.rs
//
// Answer Ledger: the per-(session, participant) record of answers.
// Autosaves upsert entries keyed by question id (last write wins);
// finalize scores the record exactly once behind a transactional
// check-and-set of the `submitted` flag.

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
    error::AppError,
    models::{
        answer::{AnswerEntry, ExamScore},
        question::{Question, QuestionKind},
    },
};

const NOT_ANSWERED: &str = "Not Answered";

/// An answer entry whose kind and question reference have passed
/// whole-batch validation.
#[derive(Debug, Clone)]
pub struct ValidatedAnswer {
    pub question_id: i64,
    pub kind: QuestionKind,
    pub selected_answer: Option<String>,
    pub code_answer: Option<String>,
}

/// Validates a batch of raw answers. Any malformed entry rejects the
/// whole batch so a failed save never leaves partial state behind.
pub fn validate_entries(entries: &[AnswerEntry]) -> Result<Vec<ValidatedAnswer>, AppError> {
    let mut validated = Vec::with_capacity(entries.len());
    for entry in entries {
        let kind = entry
            .kind
            .as_deref()
            .and_then(QuestionKind::parse)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid or missing type for questionId {}",
                    entry.question_id
                ))
            })?;
        if entry.question_id <= 0 {
            return Err(AppError::Validation(format!(
                "Invalid questionId: {}",
                entry.question_id
            )));
        }
        validated.push(ValidatedAnswer {
            question_id: entry.question_id,
            kind,
            selected_answer: match kind {
                QuestionKind::Mcq => entry.selected_answer.clone(),
                QuestionKind::Code => None,
            },
            code_answer: match kind {
                QuestionKind::Code => entry.code_answer.clone(),
                QuestionKind::Mcq => None,
            },
        });
    }
    Ok(validated)
}

/// Fetches the record id for (session, participant), creating the row
/// lazily on first use. Errors if the record is already submitted:
/// scoring is final and the record immutable from then on.
async fn record_for_update(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: i64,
    participant_id: i64,
    auto_saved: bool,
) -> Result<i64, AppError> {
    let existing: Option<(i64, bool)> = sqlx::query_as(
        "SELECT id, submitted FROM answer_records
         WHERE session_id = ? AND participant_id = ?",
    )
    .bind(session_id)
    .bind(participant_id)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some((_, true)) => Err(AppError::InvalidTransition(
            "Exam already submitted".to_string(),
        )),
        Some((id, false)) => Ok(id),
        None => {
            let id = sqlx::query(
                "INSERT INTO answer_records (session_id, participant_id, auto_saved)
                 VALUES (?, ?, ?)",
            )
            .bind(session_id)
            .bind(participant_id)
            .bind(auto_saved)
            .execute(&mut **tx)
            .await?
            .last_insert_rowid();
            Ok(id)
        }
    }
}

/// Idempotent upsert of a validated answer batch. Entries replace any
/// existing entry for the same question and otherwise append, keeping
/// insertion order. The whole batch commits atomically.
pub async fn upsert_answers(
    pool: &SqlitePool,
    session_id: i64,
    participant_id: i64,
    entries: &[ValidatedAnswer],
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let record_id = record_for_update(&mut tx, session_id, participant_id, true).await?;

    for entry in entries {
        sqlx::query(
            "INSERT INTO answer_items
                 (record_id, question_id, kind, selected_answer, code_answer, position)
             VALUES (?, ?, ?, ?, ?,
                 (SELECT COALESCE(MAX(position) + 1, 0) FROM answer_items WHERE record_id = ?))
             ON CONFLICT (record_id, question_id) DO UPDATE SET
                 kind = excluded.kind,
                 selected_answer = excluded.selected_answer,
                 code_answer = excluded.code_answer",
        )
        .bind(record_id)
        .bind(entry.question_id)
        .bind(entry.kind)
        .bind(&entry.selected_answer)
        .bind(&entry.code_answer)
        .bind(record_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Finalizes and scores a participant's record.
///
/// Iterates the session's FULL question list, not just what the
/// participant answered, so unanswered questions are recorded
/// explicitly. Mcq answers are compared trim/case-folded against the
/// correct option letter; code answers are stored verbatim and never
/// scored. The `submitted` flag is checked and set inside the same
/// transaction, so a second submit fails instead of re-scoring.
pub async fn finalize(
    pool: &SqlitePool,
    session_id: i64,
    participant_id: i64,
    entries: &[ValidatedAnswer],
    time_taken_secs: Option<i64>,
) -> Result<ExamScore, AppError> {
    let mut tx = pool.begin().await?;

    let questions: Vec<Question> = sqlx::query_as(
        "SELECT q.* FROM questions q
         JOIN session_questions sq ON sq.question_id = q.id
         WHERE sq.session_id = ?
         ORDER BY sq.position",
    )
    .bind(session_id)
    .fetch_all(&mut *tx)
    .await?;

    let record_id = record_for_update(&mut tx, session_id, participant_id, false).await?;

    // Latest entry per question wins, matching autosave semantics.
    let mut by_question = std::collections::HashMap::new();
    for entry in entries {
        by_question.insert(entry.question_id, entry);
    }

    // The finalized record covers every session question in order.
    sqlx::query("DELETE FROM answer_items WHERE record_id = ?")
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

    let mut score: i64 = 0;
    let mut total_scored: i64 = 0;

    for (position, question) in questions.iter().enumerate() {
        let entry = by_question.get(&question.id);

        let (kind, selected, code, is_correct) = match question.kind {
            QuestionKind::Mcq => {
                total_scored += 1;
                let selected = entry
                    .and_then(|e| e.selected_answer.as_deref())
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                let correct_key = question
                    .correct_answer
                    .as_deref()
                    .map(normalize)
                    .unwrap_or_default();
                let is_correct =
                    selected.map(normalize).as_deref() == Some(correct_key.as_str());
                if is_correct {
                    score += 1;
                }
                (
                    QuestionKind::Mcq,
                    Some(
                        selected
                            .map(str::to_string)
                            .unwrap_or_else(|| NOT_ANSWERED.to_string()),
                    ),
                    None,
                    Some(is_correct),
                )
            }
            QuestionKind::Code => {
                let code = entry
                    .and_then(|e| e.code_answer.as_deref())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| NOT_ANSWERED.to_string());
                (QuestionKind::Code, None, Some(code), None)
            }
        };

        sqlx::query(
            "INSERT INTO answer_items
                 (record_id, question_id, kind, selected_answer, code_answer, is_correct, position)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record_id)
        .bind(question.id)
        .bind(kind)
        .bind(&selected)
        .bind(&code)
        .bind(is_correct)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE answer_records
         SET score = ?, total_questions = ?, submitted = 1,
             submitted_at = datetime('now'), time_taken_secs = ?
         WHERE id = ?",
    )
    .bind(score)
    .bind(total_scored)
    .bind(time_taken_secs)
    .bind(record_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ExamScore {
        score,
        total_scored_questions: total_scored,
    })
}
