// src/exam/coordinator.rs
//
// Exam Runtime Coordinator: the per-participant flow from join through
// autosave to submission. Orchestrates the ledger and the session state
// machine; the countdown itself is client-held, the server only acts on
// the reported expiry.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    exam::{ledger, lifecycle, lifecycle::SessionLocks},
    models::{
        answer::{AnswerEntry, ExamScore},
        participant::{JoinSessionRequest, Participant},
        question::PublicQuestion,
        session::Session,
    },
    realtime::registry::EventRouter,
};

/// Result of a final submission, as returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub score: i64,
    pub total_questions: i64,
    /// Percentage to two decimals; absent when the session has no
    /// auto-scored questions.
    pub percentage: Option<f64>,
}

/// Registers a participant into the active session matching `code`.
/// Fails with `NotFound` (and creates no participant) unless a session
/// with that join code exists and is currently active.
pub async fn join(
    pool: &SqlitePool,
    req: &JoinSessionRequest,
) -> Result<(Participant, Session), AppError> {
    let code = req.session_code.trim().to_uppercase();

    let session: Session =
        sqlx::query_as("SELECT * FROM sessions WHERE code = ? AND status = 'active'")
            .bind(&code)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid or inactive session".to_string()))?;

    let participant_id = sqlx::query(
        "INSERT INTO participants (name, email, mobile, session_id) VALUES (?, ?, ?, ?)",
    )
    .bind(req.name.trim())
    .bind(req.email.trim().to_lowercase())
    .bind(req.mobile.trim())
    .bind(session.id)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let participant: Participant = sqlx::query_as("SELECT * FROM participants WHERE id = ?")
        .bind(participant_id)
        .fetch_one(pool)
        .await?;

    tracing::info!(
        session_id = session.id,
        participant_id,
        name = %participant.name,
        "Participant joined session"
    );

    Ok((participant, session))
}

/// The session's questions with answer keys withheld, in a fresh random
/// order on every call. The shuffle is deterrence against shared
/// orderings, nothing cryptographic.
pub async fn questions_for_session(
    pool: &SqlitePool,
    session_id: i64,
) -> Result<Vec<PublicQuestion>, AppError> {
    ensure_session(pool, session_id).await?;

    let questions = sqlx::query_as::<_, PublicQuestion>(
        "SELECT q.id, q.text, q.kind, q.option_a, q.option_b, q.option_c, q.option_d,
                q.coding_template, q.difficulty, q.category
         FROM questions q
         JOIN session_questions sq ON sq.question_id = q.id
         WHERE sq.session_id = ?
         ORDER BY RANDOM()",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(questions)
}

async fn ensure_session(pool: &SqlitePool, session_id: i64) -> Result<Session, AppError> {
    sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

/// Validates a whole autosave batch, then hands it to the ledger.
/// A single malformed entry fails the call with zero mutation.
pub async fn autosave(
    pool: &SqlitePool,
    session_id: i64,
    participant_id: i64,
    answers: &[AnswerEntry],
) -> Result<(), AppError> {
    ensure_session(pool, session_id).await?;
    let validated = ledger::validate_entries(answers)?;
    ledger::upsert_answers(pool, session_id, participant_id, &validated).await
}

/// Final submission: score via the ledger, complete the session (which
/// ends it for everyone in this one-exam-per-session deployment), and
/// let the lifecycle broadcast the termination pair.
pub async fn submit(
    pool: &SqlitePool,
    locks: &SessionLocks,
    router: &EventRouter,
    session_id: i64,
    participant_id: i64,
    answers: &[AnswerEntry],
    time_taken_secs: Option<i64>,
) -> Result<SubmitOutcome, AppError> {
    let session = ensure_session(pool, session_id).await?;
    // Reject before finalizing: once the ledger marks the record
    // submitted there is no retry, so a session that cannot complete
    // must not consume the participant's one submission.
    if session.status == lifecycle::SessionStatus::Pending {
        return Err(AppError::InvalidTransition(
            "Cannot submit to a session that was never activated".to_string(),
        ));
    }
    let validated = ledger::validate_entries(answers)?;
    let ExamScore {
        score,
        total_scored_questions,
    } = ledger::finalize(pool, session_id, participant_id, &validated, time_taken_secs).await?;

    lifecycle::complete(pool, locks, router, session_id).await?;

    let percentage = if total_scored_questions > 0 {
        Some((score as f64 / total_scored_questions as f64 * 10_000.0).round() / 100.0)
    } else {
        None
    };

    tracing::info!(
        session_id,
        participant_id,
        score,
        total = total_scored_questions,
        "Exam submitted"
    );

    Ok(SubmitOutcome {
        score,
        total_questions: total_scored_questions,
        percentage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionKind;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed_active_session(pool: &SqlitePool, code: &str) -> i64 {
        sqlx::query(
            "INSERT INTO sessions (name, code, start_time, duration_minutes, status)
             VALUES ('Midterm', ?, '2026-01-01T09:00:00Z', 45, 'active')",
        )
        .bind(code)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn join_request(code: &str) -> JoinSessionRequest {
        JoinSessionRequest {
            name: "Ada".to_string(),
            email: "Ada@Example.com".to_string(),
            mobile: "5551234".to_string(),
            session_code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn join_normalizes_code_and_registers_participant() {
        let pool = test_pool().await;
        let session_id = seed_active_session(&pool, "WXYZ34").await;

        let (participant, session) = join(&pool, &join_request("  wxyz34 ")).await.unwrap();
        assert_eq!(session.id, session_id);
        assert_eq!(participant.email, "ada@example.com");
        assert!(participant.is_active);
    }

    #[tokio::test]
    async fn join_with_dead_code_creates_no_participant() {
        let pool = test_pool().await;
        seed_active_session(&pool, "WXYZ34").await;

        let err = join(&pool, &join_request("NOPE99")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM participants")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn join_rejects_inactive_session() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO sessions (name, code, start_time, duration_minutes, status)
             VALUES ('Pending', 'PEND22', '2026-01-01T09:00:00Z', 45, 'pending')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = join(&pool, &join_request("PEND22")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn questions_hide_the_answer_key() {
        let pool = test_pool().await;
        let session_id = seed_active_session(&pool, "QQQQ22").await;
        let qid = sqlx::query(
            "INSERT INTO questions (text, kind, option_a, option_b, option_c, option_d, correct_answer)
             VALUES ('pick one', 'mcq', '1', '2', '3', '4', 'C')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO session_questions (session_id, question_id, position) VALUES (?, ?, 0)",
        )
        .bind(session_id)
        .bind(qid)
        .execute(&pool)
        .await
        .unwrap();

        let questions = questions_for_session(&pool, session_id).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].kind, QuestionKind::Mcq);
        let as_json = serde_json::to_value(&questions[0]).unwrap();
        assert!(as_json.get("correctAnswer").is_none());
    }

    #[tokio::test]
    async fn submit_completes_session_and_reports_percentage() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let session_id = seed_active_session(&pool, "SUBM77").await;

        let q1 = sqlx::query(
            "INSERT INTO questions (text, kind, option_a, option_b, option_c, option_d, correct_answer)
             VALUES ('q', 'mcq', 'a', 'b', 'c', 'd', 'A')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query(
            "INSERT INTO session_questions (session_id, question_id, position) VALUES (?, ?, 0)",
        )
        .bind(session_id)
        .bind(q1)
        .execute(&pool)
        .await
        .unwrap();

        let (participant, _) = join(&pool, &join_request("SUBM77")).await.unwrap();

        let answers = vec![AnswerEntry {
            question_id: q1,
            kind: Some("mcq".to_string()),
            selected_answer: Some("A".to_string()),
            code_answer: None,
        }];
        let outcome = submit(
            &pool,
            &locks,
            &router,
            session_id,
            participant.id,
            &answers,
            Some(30),
        )
        .await
        .unwrap();

        assert_eq!(outcome.score, 1);
        assert_eq!(outcome.total_questions, 1);
        assert_eq!(outcome.percentage, Some(100.0));

        let status: (String,) = sqlx::query_as("SELECT status FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status.0, "completed");
    }

    #[tokio::test]
    async fn submit_to_pending_session_does_not_burn_the_submission() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let session_id = sqlx::query(
            "INSERT INTO sessions (name, code, start_time, duration_minutes, status)
             VALUES ('Early', 'ERLY55', '2026-01-01T09:00:00Z', 45, 'pending')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let participant_id = sqlx::query(
            "INSERT INTO participants (name, email, mobile, session_id)
             VALUES ('Ada', 'ada@example.com', '5551234', ?)",
        )
        .bind(session_id)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let err = submit(&pool, &locks, &router, session_id, participant_id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        // Nothing was finalized, so the same participant can still
        // submit once the session goes active.
        let records: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM answer_records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(records.0, 0);

        lifecycle::activate(&pool, &locks, session_id).await.unwrap();
        let outcome = submit(&pool, &locks, &router, session_id, participant_id, &[], None)
            .await
            .unwrap();
        assert_eq!(outcome.score, 0);
    }

    #[tokio::test]
    async fn double_submit_is_rejected() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let session_id = seed_active_session(&pool, "TWIC11").await;
        let (participant, _) = join(&pool, &join_request("TWIC11")).await.unwrap();

        submit(&pool, &locks, &router, session_id, participant.id, &[], None)
            .await
            .unwrap();
        let err = submit(&pool, &locks, &router, session_id, participant.id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }
}
