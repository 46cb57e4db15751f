use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{config::Config, exam::lifecycle::SessionLocks, realtime::registry::EventRouter};

/// Outbound queue depth per realtime connection. Video frames dominate
/// the traffic, so the queue is sized for bursts of them.
const MAX_SEND_QUEUE: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub router: Arc<EventRouter>,
    pub locks: Arc<SessionLocks>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            pool,
            config,
            router: Arc::new(EventRouter::new(MAX_SEND_QUEUE)),
            locks: Arc::new(SessionLocks::new()),
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
