// src/exam/lifecycle.rs
//
// Session lifecycle state machine. A session moves
// pending -> active -> completed | terminated; the two end states are
// terminal. All transitions for one session run under its own async
// mutex so a terminate racing a complete can never interleave.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::AppError,
    models::session::Session,
    realtime::{event::ServerEvent, registry::EventRouter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Terminated => "terminated",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Terminated)
    }

    /// Participants may join only while the session is active.
    pub fn is_joinable(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was forcibly ended. Both reasons collapse to the same
/// events on the wire; the distinction only reaches the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Proctor,
    TimeExpired,
}

/// Per-session mutual exclusion for lifecycle transitions.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

async fn fetch_session(pool: &SqlitePool, session_id: i64) -> Result<Session, AppError> {
    sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

async fn set_status(
    pool: &SqlitePool,
    session_id: i64,
    status: SessionStatus,
) -> Result<Session, AppError> {
    sqlx::query("UPDATE sessions SET status = ? WHERE id = ?")
        .bind(status)
        .bind(session_id)
        .execute(pool)
        .await?;
    fetch_session(pool, session_id).await
}

/// Activates a pending session, making it joinable.
pub async fn activate(
    pool: &SqlitePool,
    locks: &SessionLocks,
    session_id: i64,
) -> Result<Session, AppError> {
    let _guard = locks.acquire(session_id).await;
    let session = fetch_session(pool, session_id).await?;

    match session.status {
        SessionStatus::Pending => {
            let session = set_status(pool, session_id, SessionStatus::Active).await?;
            tracing::info!(session_id, code = %session.code, "Session activated");
            Ok(session)
        }
        other => Err(AppError::InvalidTransition(format!(
            "Cannot activate a session in '{}' state",
            other
        ))),
    }
}

/// Forcibly ends a session. Idempotent: terminating an already
/// terminated session is a no-op success and emits nothing, so the
/// termination events reach clients exactly once.
pub async fn terminate(
    pool: &SqlitePool,
    locks: &SessionLocks,
    router: &EventRouter,
    session_id: i64,
    reason: TerminationReason,
) -> Result<Session, AppError> {
    let _guard = locks.acquire(session_id).await;
    let session = fetch_session(pool, session_id).await?;

    match session.status {
        SessionStatus::Pending | SessionStatus::Active => {
            let session = set_status(pool, session_id, SessionStatus::Terminated).await?;
            tracing::info!(session_id, ?reason, "Session terminated");
            broadcast_termination(router, session_id);
            Ok(session)
        }
        SessionStatus::Terminated => Ok(session),
        SessionStatus::Completed => Err(AppError::InvalidTransition(
            "Cannot terminate a completed session".to_string(),
        )),
    }
}

/// Marks a session completed after a participant submits. A submit
/// racing a proctor terminate must not error, so calling this on a
/// session that already reached a terminal state is a no-op.
pub async fn complete(
    pool: &SqlitePool,
    locks: &SessionLocks,
    router: &EventRouter,
    session_id: i64,
) -> Result<Session, AppError> {
    let _guard = locks.acquire(session_id).await;
    let session = fetch_session(pool, session_id).await?;

    match session.status {
        SessionStatus::Active => {
            let session = set_status(pool, session_id, SessionStatus::Completed).await?;
            tracing::info!(session_id, "Session completed");
            broadcast_termination(router, session_id);
            Ok(session)
        }
        SessionStatus::Completed | SessionStatus::Terminated => Ok(session),
        SessionStatus::Pending => Err(AppError::InvalidTransition(
            "Cannot complete a session that was never activated".to_string(),
        )),
    }
}

/// Every termination path emits the same pair of events: the legacy
/// payloadless `examTerminated` plus `session_terminated` carrying the
/// session id for client-side filtering. Proctors get the tagged event.
fn broadcast_termination(router: &EventRouter, session_id: i64) {
    router.broadcast_to_session(session_id, &ServerEvent::ExamTerminated, None);
    router.broadcast_to_session(
        session_id,
        &ServerEvent::SessionTerminated { session_id },
        None,
    );
    router.broadcast_to_proctors(&ServerEvent::SessionTerminated { session_id });
}

#[cfg(test)]
mod tests {
    use super::*;
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

    async fn seed_session(pool: &SqlitePool) -> i64 {
        sqlx::query(
            "INSERT INTO sessions (name, code, start_time, duration_minutes)
             VALUES ('Test', 'ABC234', '2026-01-01T09:00:00Z', 60)",
        )
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn activate_moves_pending_to_active() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let id = seed_session(&pool).await;

        let session = activate(&pool, &locks, id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.status.is_joinable());
    }

    #[tokio::test]
    async fn activate_twice_is_invalid_transition() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let id = seed_session(&pool).await;

        activate(&pool, &locks, id).await.unwrap();
        let err = activate(&pool, &locks, id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        activate(&pool, &locks, id).await.unwrap();
        let first = terminate(&pool, &locks, &router, id, TerminationReason::Proctor)
            .await
            .unwrap();
        assert_eq!(first.status, SessionStatus::Terminated);

        // Second call succeeds without changing anything.
        let second = terminate(&pool, &locks, &router, id, TerminationReason::Proctor)
            .await
            .unwrap();
        assert_eq!(second.status, SessionStatus::Terminated);
    }

    #[tokio::test]
    async fn terminate_from_pending_is_allowed() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        let session = terminate(&pool, &locks, &router, id, TerminationReason::Proctor)
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Terminated);
    }

    #[tokio::test]
    async fn complete_requires_active() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        let err = complete(&pool, &locks, &router, id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        activate(&pool, &locks, id).await.unwrap();
        let session = complete(&pool, &locks, &router, id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn complete_after_terminate_is_noop() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        activate(&pool, &locks, id).await.unwrap();
        terminate(&pool, &locks, &router, id, TerminationReason::TimeExpired)
            .await
            .unwrap();

        let session = complete(&pool, &locks, &router, id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Terminated);
    }

    #[tokio::test]
    async fn terminate_after_complete_is_invalid() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        activate(&pool, &locks, id).await.unwrap();
        complete(&pool, &locks, &router, id).await.unwrap();

        let err = terminate(&pool, &locks, &router, id, TerminationReason::Proctor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    fn presence(id: i64, name: &str) -> crate::realtime::event::PresenceUser {
        crate::realtime::event::PresenceUser {
            id,
            name: name.to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn terminate_emits_the_event_pair_exactly_once() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        let (taker, mut taker_rx) = router.register();
        router.join_room(&taker, id, presence(1, "Ada"));
        let (proctor, mut proctor_rx) = router.register();
        router.join_proctors(&proctor);

        activate(&pool, &locks, id).await.unwrap();
        terminate(&pool, &locks, &router, id, TerminationReason::Proctor)
            .await
            .unwrap();

        let first = taker_rx.try_recv().unwrap();
        assert!(first.contains("examTerminated"));
        let second = taker_rx.try_recv().unwrap();
        assert!(second.contains("session_terminated"));
        assert!(second.contains(&format!("\"sessionId\":{id}")));
        assert!(taker_rx.try_recv().is_err());

        let tagged = proctor_rx.try_recv().unwrap();
        assert!(tagged.contains("session_terminated"));
        assert!(proctor_rx.try_recv().is_err());

        // The idempotent second terminate stays silent.
        terminate(&pool, &locks, &router, id, TerminationReason::Proctor)
            .await
            .unwrap();
        assert!(taker_rx.try_recv().is_err());
        assert!(proctor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn complete_emits_the_event_pair() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let router = EventRouter::new(8);
        let id = seed_session(&pool).await;

        let (taker, mut taker_rx) = router.register();
        router.join_room(&taker, id, presence(1, "Ada"));

        activate(&pool, &locks, id).await.unwrap();
        complete(&pool, &locks, &router, id).await.unwrap();

        assert!(taker_rx.try_recv().unwrap().contains("examTerminated"));
        assert!(taker_rx.try_recv().unwrap().contains("session_terminated"));
        assert!(taker_rx.try_recv().is_err());

        // Completing again is a no-op and emits nothing.
        complete(&pool, &locks, &router, id).await.unwrap();
        assert!(taker_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let pool = test_pool().await;
        let locks = SessionLocks::new();
        let err = activate(&pool, &locks, 9999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
