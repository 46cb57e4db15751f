// src/realtime/socket.rs
//
// WebSocket endpoint: one connection per client, split into a writer
// task draining the connection's outbound queue and a reader loop
// dispatching typed client events.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};

use crate::{
    exam::lifecycle::{self, TerminationReason},
    realtime::{
        event::{ClientEvent, ServerEvent},
        registry::ConnId,
    },
    state::AppState,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn_id, mut rx) = state.router.register();
    tracing::info!(conn_id = %conn_id, "Realtime client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: forward queued events to the socket + periodic ping.
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: parse and dispatch inbound frames until the peer goes away.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => dispatch(&state, &conn_id, text.as_str()).await,
            Message::Close(_) => break,
            // axum answers pings automatically
            _ => {}
        }
    }

    writer.abort();

    // Best-effort departure notice; a crash without a clean close is
    // only ever detected by the transport's own keepalive.
    if let Some((session_id, user)) = state.router.unregister(&conn_id) {
        state.router.broadcast_to_session(
            session_id,
            &ServerEvent::UserDisconnected { user },
            None,
        );
    }
    tracing::info!(conn_id = %conn_id, "Realtime client disconnected");
}

/// Routes one inbound event. Malformed frames are logged and dropped;
/// nothing here ever raises an observable error back to the sender.
async fn dispatch(state: &AppState, conn_id: &ConnId, raw: &str) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(conn_id = %conn_id, %err, "Dropping malformed realtime frame");
            return;
        }
    };

    match event {
        ClientEvent::AdminJoin => {
            state.router.join_proctors(conn_id);
            tracing::info!(conn_id = %conn_id, "Connection joined the proctor group");
        }

        ClientEvent::JoinSession { session_id, user } => {
            state.router.join_room(conn_id, session_id, user.clone());
            state.router.broadcast_to_session(
                session_id,
                &ServerEvent::UserJoined { user: user.clone() },
                Some(conn_id),
            );
            state
                .router
                .broadcast_to_proctors(&ServerEvent::UserJoinedSession {
                    session_id,
                    user_id: user.id,
                    user_name: user.name,
                    user_email: user.email,
                    joined_at: chrono::Utc::now().to_rfc3339(),
                });
        }

        ClientEvent::VideoFrame {
            session_id,
            user,
            frame,
        } => {
            state.router.broadcast_to_proctors(&ServerEvent::VideoFrame {
                session_id,
                user,
                frame,
            });
        }

        ClientEvent::UserTypedLog {
            session_id,
            user,
            typed_text,
            timestamp,
        } => {
            state
                .router
                .broadcast_to_proctors(&ServerEvent::UserTypedLog {
                    session_id,
                    user,
                    typed_text,
                    timestamp,
                });
        }

        ClientEvent::SubmitExam { session_id } => {
            if let Err(err) =
                lifecycle::complete(&state.pool, &state.locks, &state.router, session_id).await
            {
                tracing::warn!(session_id, %err, "submitExam event could not complete session");
            }
        }

        ClientEvent::ExamTimeExpired { session_id } => {
            if let Err(err) = lifecycle::terminate(
                &state.pool,
                &state.locks,
                &state.router,
                session_id,
                TerminationReason::TimeExpired,
            )
            .await
            {
                tracing::warn!(session_id, %err, "Timer expiry could not terminate session");
            }
        }

        ClientEvent::TerminateSession { session_id } => {
            if let Err(err) = lifecycle::terminate(
                &state.pool,
                &state.locks,
                &state.router,
                session_id,
                TerminationReason::Proctor,
            )
            .await
            {
                tracing::warn!(session_id, %err, "Proctor terminate failed");
            }
        }
    }
}
