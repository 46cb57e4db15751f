// src/realtime/registry.rs
//
// Connection Registry, owned by the Realtime Event Router and scoped to
// process lifetime. Each connection carries a bounded outbound queue;
// broadcasts are fire-and-forget try_sends so a slow or disconnected
// receiver never stalls the sender's request path.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::{PresenceUser, ServerEvent};

/// Unique identifier for a realtime connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnId(String);

impl ConnId {
    fn new() -> Self {
        Self(format!("conn_{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct Connection {
    tx: mpsc::Sender<String>,
    /// Session room this connection joined, if any.
    session_id: Option<i64>,
    /// Member of the proctor broadcast group.
    proctor: bool,
    /// Participant identity announced on joinSession.
    participant: Option<PresenceUser>,
}

/// Fans session-scoped events out to room members and
/// session-independent events to the proctor group.
pub struct EventRouter {
    connections: DashMap<ConnId, Connection>,
    max_send_queue: usize,
}

impl EventRouter {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Insert-on-connect: registers a connection and hands back its id
    /// plus the receiving end of its outbound queue.
    pub fn register(&self) -> (ConnId, mpsc::Receiver<String>) {
        let id = ConnId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.connections.insert(
            id.clone(),
            Connection {
                tx,
                session_id: None,
                proctor: false,
                participant: None,
            },
        );
        (id, rx)
    }

    /// Remove-on-disconnect. Returns the room and participant identity
    /// if the connection had joined a session, so the caller can notify
    /// the room of the departure.
    pub fn unregister(&self, id: &ConnId) -> Option<(i64, PresenceUser)> {
        let (_, conn) = self.connections.remove(id)?;
        match (conn.session_id, conn.participant) {
            (Some(session_id), Some(user)) => Some((session_id, user)),
            _ => None,
        }
    }

    /// Adds a connection to a session's room.
    pub fn join_room(&self, id: &ConnId, session_id: i64, user: PresenceUser) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            conn.session_id = Some(session_id);
            conn.participant = Some(user);
        }
    }

    /// Subscribes a connection to the proctor broadcast group.
    pub fn join_proctors(&self, id: &ConnId) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            conn.proctor = true;
        }
    }

    /// Broadcasts an event to every connection in a session's room,
    /// optionally skipping the sender. Frames for full or closed queues
    /// are dropped.
    pub fn broadcast_to_session(
        &self,
        session_id: i64,
        event: &ServerEvent,
        except: Option<&ConnId>,
    ) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        for entry in self.connections.iter() {
            if entry.value().session_id != Some(session_id) {
                continue;
            }
            if except == Some(entry.key()) {
                continue;
            }
            self.deliver(entry.key(), &entry.value().tx, &payload);
        }
    }

    /// Broadcasts an event to the proctor group.
    pub fn broadcast_to_proctors(&self, event: &ServerEvent) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        for entry in self.connections.iter() {
            if entry.value().proctor {
                self.deliver(entry.key(), &entry.value().tx, &payload);
            }
        }
    }

    fn deliver(&self, id: &ConnId, tx: &mpsc::Sender<String>, payload: &str) {
        match tx.try_send(payload.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %id, "Send queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str) -> PresenceUser {
        PresenceUser {
            id,
            name: name.to_string(),
            email: None,
        }
    }

    #[test]
    fn register_and_unregister() {
        let router = EventRouter::new(8);
        assert_eq!(router.count(), 0);

        let (id1, _rx1) = router.register();
        let (id2, _rx2) = router.register();
        assert_eq!(router.count(), 2);

        router.unregister(&id1);
        router.unregister(&id2);
        assert_eq!(router.count(), 0);
    }

    #[test]
    fn room_broadcast_skips_other_rooms_and_sender() {
        let router = EventRouter::new(8);
        let (id1, mut rx1) = router.register();
        let (id2, mut rx2) = router.register();
        let (_id3, mut rx3) = router.register();

        router.join_room(&id1, 7, user(1, "Ada"));
        router.join_room(&id2, 7, user(2, "Grace"));
        // id3 never joins a room.

        router.broadcast_to_session(7, &ServerEvent::ExamTerminated, Some(&id1));

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn proctor_broadcast_only_reaches_the_group() {
        let router = EventRouter::new(8);
        let (proctor, mut proctor_rx) = router.register();
        let (taker, mut taker_rx) = router.register();

        router.join_proctors(&proctor);
        router.join_room(&taker, 1, user(1, "Ada"));

        router.broadcast_to_proctors(&ServerEvent::SessionTerminated { session_id: 1 });

        let frame = proctor_rx.try_recv().unwrap();
        assert!(frame.contains("session_terminated"));
        assert!(taker_rx.try_recv().is_err());
    }

    #[test]
    fn unregister_reports_departed_participant() {
        let router = EventRouter::new(8);
        let (id, _rx) = router.register();
        router.join_room(&id, 42, user(9, "Ada"));

        let departed = router.unregister(&id).unwrap();
        assert_eq!(departed.0, 42);
        assert_eq!(departed.1.id, 9);

        // A connection that never joined a room reports nothing.
        let (id2, _rx2) = router.register();
        assert!(router.unregister(&id2).is_none());
    }

    #[test]
    fn full_queue_drops_frames_without_blocking() {
        let router = EventRouter::new(1);
        let (id, mut rx) = router.register();
        router.join_room(&id, 1, user(1, "Ada"));

        router.broadcast_to_session(1, &ServerEvent::ExamTerminated, None);
        router.broadcast_to_session(1, &ServerEvent::ExamTerminated, None);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
