// src/realtime/event.rs
//
// The closed set of realtime events. Frames are JSON objects of the
// form {"event": "...", "data": {...}} and anything that does not
// deserialize into one of these variants is dropped at the boundary.

use serde::{Deserialize, Serialize};

/// Identity of an exam taker as announced over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUser {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Events a client may send to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Subscribe this connection to the proctor broadcast group.
    #[serde(rename = "adminJoin")]
    AdminJoin,

    /// Join a session room as a participant.
    #[serde(rename = "joinSession", rename_all = "camelCase")]
    JoinSession { session_id: i64, user: PresenceUser },

    /// Live monitoring frame; the payload is an opaque encoded image.
    #[serde(rename = "videoFrame", rename_all = "camelCase")]
    VideoFrame {
        session_id: i64,
        user: PresenceUser,
        frame: String,
    },

    /// Periodic typed-activity snapshot (full current value, not a diff).
    #[serde(rename = "userTypedLog", rename_all = "camelCase")]
    UserTypedLog {
        session_id: i64,
        user: PresenceUser,
        typed_text: String,
        timestamp: String,
    },

    /// The participant submitted; the session ends for everyone in it.
    #[serde(rename = "submitExam", rename_all = "camelCase")]
    SubmitExam { session_id: i64 },

    /// The client-held countdown reached zero.
    #[serde(rename = "examTimeExpired", rename_all = "camelCase")]
    ExamTimeExpired { session_id: i64 },

    /// Proctor forcibly ends the session.
    #[serde(rename = "terminateSession", rename_all = "camelCase")]
    TerminateSession { session_id: i64 },
}

/// Events the server broadcasts to rooms or the proctor group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "userJoined")]
    UserJoined { user: PresenceUser },

    #[serde(rename = "userDisconnected")]
    UserDisconnected { user: PresenceUser },

    /// Proctor-group notice of a participant joining a session.
    #[serde(rename = "user_joined_session", rename_all = "camelCase")]
    UserJoinedSession {
        session_id: i64,
        user_id: i64,
        user_name: String,
        user_email: Option<String>,
        joined_at: String,
    },

    /// Typed-activity relay to the proctor group.
    #[serde(rename = "user_typed_log", rename_all = "camelCase")]
    UserTypedLog {
        session_id: i64,
        user: PresenceUser,
        typed_text: String,
        timestamp: String,
    },

    /// Monitoring-frame relay to the proctor group.
    #[serde(rename = "videoFrame", rename_all = "camelCase")]
    VideoFrame {
        session_id: i64,
        user: PresenceUser,
        frame: String,
    },

    /// Legacy termination signal, no payload. Always emitted together
    /// with `session_terminated` so older clients keep working.
    #[serde(rename = "examTerminated")]
    ExamTerminated,

    /// Termination signal carrying the session id for client-side
    /// filtering.
    #[serde(rename = "session_terminated", rename_all = "camelCase")]
    SessionTerminated { session_id: i64 },
}
