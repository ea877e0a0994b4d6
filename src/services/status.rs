//! Status session registry with websocket fan-out (C8).
//!
//! A session is created before (or at) the websocket handshake and carries
//! staged progress updates for the in-flight chat turn. Frame writes go
//! through a per-session mpsc channel drained by the connection task, with
//! a per-session lock serializing senders so the client sees updates in
//! issue order. Sessions expire one hour after their last update; an
//! opportunistic sweep runs at most every five minutes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

pub const PING_INTERVAL: Duration = Duration::from_secs(30);
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(3600);
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Depth of a connection's outbound frame queue.
pub const FRAME_BUFFER: usize = 64;

/// A frame queued for delivery on a status websocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFrame {
    Json(String),
    /// Ask the connection task to close the socket.
    Close,
}

#[derive(Clone)]
struct StatusConnection {
    tx: mpsc::Sender<StatusFrame>,
    write_lock: Arc<Mutex<()>>,
}

#[derive(Clone)]
struct SessionStatus {
    user_id: i32,
    message: String,
    last_updated: Instant,
    expires_at: Instant,
    connection: Option<StatusConnection>,
    active: bool,
}

struct Bookkeeping {
    connection_count: usize,
    last_cleanup: Instant,
}

pub struct StatusSessionManager {
    sessions: scc::HashMap<String, SessionStatus>,
    // Serializes connection-count changes and the cleanup sweep
    bookkeeping: Mutex<Bookkeeping>,
}

impl StatusSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: scc::HashMap::new(),
            bookkeeping: Mutex::new(Bookkeeping {
                connection_count: 0,
                last_cleanup: Instant::now(),
            }),
        }
    }

    fn generate_session_id(user_id: i32) -> String {
        format!("{}-{}", user_id, Uuid::new_v4())
    }

    /// Create a new session and return its ID.
    pub async fn create_session(&self, user_id: i32) -> String {
        let session_id = Self::generate_session_id(user_id);
        let now = Instant::now();

        let _ = self
            .sessions
            .insert_async(
                session_id.clone(),
                SessionStatus {
                    user_id,
                    message: "Session initialized".to_string(),
                    last_updated: now,
                    expires_at: now + SESSION_TIMEOUT,
                    connection: None,
                    active: false,
                },
            )
            .await;

        self.cleanup_expired_sessions().await;
        session_id
    }

    /// Attach a websocket sender to a pre-created session. Returns false if
    /// the session does not exist or the initial frame cannot be delivered.
    pub async fn register_connection(
        &self,
        session_id: &str,
        tx: mpsc::Sender<StatusFrame>,
    ) -> bool {
        let mut bookkeeping = self.bookkeeping.lock().await;

        let connection = StatusConnection {
            tx,
            write_lock: Arc::new(Mutex::new(())),
        };

        let now = Instant::now();
        let registered = self
            .sessions
            .update_async(session_id, |_, session| {
                // Count each session at most once, even on double register
                let newly_active = !session.active;
                session.message = "Connected to status updates".to_string();
                session.last_updated = now;
                session.expires_at = now + SESSION_TIMEOUT;
                session.connection = Some(connection.clone());
                session.active = true;
                newly_active
            })
            .await;

        let newly_active = match registered {
            Some(newly_active) => newly_active,
            None => return false,
        };
        if newly_active {
            bookkeeping.connection_count += 1;
        }
        drop(bookkeeping);

        let initial = serde_json::json!({
            "type": "status",
            "status": "connected",
            "session_id": session_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if connection.tx.send(StatusFrame::Json(initial.to_string())).await.is_err() {
            tracing::error!("Error sending initial connection message for {}", session_id);
            return false;
        }

        tracing::debug!(
            "WebSocket connection registered for session ID: {}",
            session_id
        );
        true
    }

    /// Push a status frame to a session. Tears the connection down and
    /// returns false when delivery fails.
    pub async fn send_status_update(
        &self,
        session_id: &str,
        message: &str,
        status: Option<&str>,
    ) -> bool {
        let now = Instant::now();
        let connection = self
            .sessions
            .update_async(session_id, |_, session| {
                if !session.active {
                    return None;
                }
                session.message = message.to_string();
                session.last_updated = now;
                session.expires_at = now + SESSION_TIMEOUT;
                session.connection.clone()
            })
            .await
            .flatten();

        let Some(connection) = connection else {
            return false;
        };

        let mut frame = serde_json::json!({
            "type": "status",
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "id": Uuid::new_v4().to_string(),
        });
        if let Some(status) = status {
            frame["status"] = serde_json::json!(status);
        }

        let _write_guard = connection.write_lock.lock().await;
        if connection.tx.send(StatusFrame::Json(frame.to_string())).await.is_err() {
            drop(_write_guard);
            tracing::error!("Error sending status update for {}", session_id);
            self.remove_connection(session_id, false).await;
            return false;
        }
        true
    }

    /// Keepalive ping; failure tears the connection down.
    pub async fn send_ping(&self, session_id: &str) -> bool {
        let connection = self
            .sessions
            .read_async(session_id, |_, session| {
                session.active.then(|| session.connection.clone()).flatten()
            })
            .await
            .flatten();

        let Some(connection) = connection else {
            return false;
        };

        let frame = serde_json::json!({
            "type": "ping",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let _write_guard = connection.write_lock.lock().await;
        if connection.tx.send(StatusFrame::Json(frame.to_string())).await.is_err() {
            drop(_write_guard);
            tracing::debug!("Error sending ping for {}", session_id);
            self.remove_connection(session_id, false).await;
            return false;
        }
        true
    }

    /// Mark a session inactive and release its connection. The socket is
    /// asked to close only when the caller is not the websocket handler
    /// itself; the handler owns its own close path.
    pub async fn remove_connection(&self, session_id: &str, initiated_by_handler: bool) {
        let mut bookkeeping = self.bookkeeping.lock().await;

        let removed = self
            .sessions
            .update_async(session_id, |_, session| {
                let was_active = session.active;
                let connection = session.connection.take();
                session.active = false;
                session.last_updated = Instant::now();
                (was_active, connection)
            })
            .await;

        if let Some((was_active, connection)) = removed {
            if was_active {
                bookkeeping.connection_count = bookkeeping.connection_count.saturating_sub(1);
            }
            if let Some(connection) = connection {
                if !initiated_by_handler {
                    let _ = connection.tx.try_send(StatusFrame::Close);
                }
            }
            tracing::debug!(
                "WebSocket connection removed for session ID: {}. Active connections: {}",
                session_id,
                bookkeeping.connection_count
            );
        }
    }

    /// Orchestrator convenience: push a stage update, swallowing failures.
    pub async fn update_status(&self, session_id: &str, message: &str) {
        self.update_status_with(session_id, message, None).await;
    }

    pub async fn update_status_with(&self, session_id: &str, message: &str, status: Option<&str>) {
        if !self.send_status_update(session_id, message, status).await {
            tracing::debug!("Status update not delivered for session {}", session_id);
        }
    }

    pub async fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.contains_async(session_id).await
    }

    pub async fn session_user(&self, session_id: &str) -> Option<i32> {
        self.sessions
            .read_async(session_id, |_, session| session.user_id)
            .await
    }

    pub async fn connection_count(&self) -> usize {
        self.bookkeeping.lock().await.connection_count
    }

    /// Drop sessions past their expiry. Runs at most every five minutes.
    async fn cleanup_expired_sessions(&self) {
        let now = Instant::now();
        {
            let mut bookkeeping = self.bookkeeping.lock().await;
            if now.duration_since(bookkeeping.last_cleanup) < CLEANUP_INTERVAL {
                return;
            }
            bookkeeping.last_cleanup = now;
        }
        self.sessions
            .retain_async(|_, session| session.expires_at > now)
            .await;
    }
}

impl Default for StatusSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<StatusFrame>, mpsc::Receiver<StatusFrame>) {
        mpsc::channel(FRAME_BUFFER)
    }

    #[tokio::test]
    async fn session_ids_embed_the_user() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(42).await;
        assert!(session_id.starts_with("42-"));
        assert!(manager.session_exists(&session_id).await);
        assert_eq!(manager.session_user(&session_id).await, Some(42));
    }

    #[tokio::test]
    async fn register_sends_connected_frame() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, mut rx) = channel();

        assert!(manager.register_connection(&session_id, tx).await);
        assert_eq!(manager.connection_count().await, 1);

        let frame = rx.recv().await.unwrap();
        let StatusFrame::Json(json) = frame else {
            panic!("expected a JSON frame");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "connected");
        assert_eq!(value["session_id"], session_id);
    }

    #[tokio::test]
    async fn register_requires_a_created_session() {
        let manager = StatusSessionManager::new();
        let (tx, _rx) = channel();
        assert!(!manager.register_connection("1-unknown", tx).await);
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn double_register_does_not_double_count() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;

        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        assert!(manager.register_connection(&session_id, tx1).await);
        assert!(manager.register_connection(&session_id, tx2).await);
        assert_eq!(manager.connection_count().await, 1);
    }

    #[tokio::test]
    async fn status_updates_arrive_in_order() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, mut rx) = channel();
        manager.register_connection(&session_id, tx).await;
        let _ = rx.recv().await; // connected frame

        assert!(manager.send_status_update(&session_id, "first", None).await);
        assert!(manager.send_status_update(&session_id, "second", Some("error")).await);

        let first: serde_json::Value = match rx.recv().await.unwrap() {
            StatusFrame::Json(json) => serde_json::from_str(&json).unwrap(),
            StatusFrame::Close => panic!("unexpected close"),
        };
        let second: serde_json::Value = match rx.recv().await.unwrap() {
            StatusFrame::Json(json) => serde_json::from_str(&json).unwrap(),
            StatusFrame::Close => panic!("unexpected close"),
        };
        assert_eq!(first["message"], "first");
        assert!(first.get("status").is_none());
        assert_eq!(second["message"], "second");
        assert_eq!(second["status"], "error");
        assert!(first.get("id").is_some());
    }

    #[tokio::test]
    async fn update_without_connection_returns_false() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        assert!(!manager.send_status_update(&session_id, "hello", None).await);
    }

    #[tokio::test]
    async fn failed_send_tears_down_the_connection() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, rx) = channel();
        manager.register_connection(&session_id, tx).await;
        drop(rx); // peer went away

        assert!(!manager.send_status_update(&session_id, "lost", None).await);
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn remove_connection_is_idempotent_and_never_negative() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, _rx) = channel();
        manager.register_connection(&session_id, tx).await;

        manager.remove_connection(&session_id, false).await;
        manager.remove_connection(&session_id, false).await;
        manager.remove_connection("1-unknown", true).await;
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn orchestrator_initiated_removal_requests_socket_close() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, mut rx) = channel();
        manager.register_connection(&session_id, tx).await;
        let _ = rx.recv().await; // connected frame

        manager.remove_connection(&session_id, false).await;
        assert_eq!(rx.recv().await, Some(StatusFrame::Close));
    }

    #[tokio::test]
    async fn handler_initiated_removal_leaves_close_to_the_handler() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, mut rx) = channel();
        manager.register_connection(&session_id, tx).await;
        let _ = rx.recv().await;

        manager.remove_connection(&session_id, true).await;
        // No Close frame queued; the channel just drains empty.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_sessions_are_swept() {
        let manager = StatusSessionManager::new();
        let stale = manager.create_session(1).await;

        // Past the TTL and past the sweep interval
        tokio::time::advance(SESSION_TIMEOUT + CLEANUP_INTERVAL + Duration::from_secs(1)).await;

        // A new session triggers the opportunistic sweep
        let fresh = manager.create_session(2).await;
        assert!(!manager.session_exists(&stale).await);
        assert!(manager.session_exists(&fresh).await);
    }

    #[tokio::test]
    async fn ping_frames_have_ping_type() {
        let manager = StatusSessionManager::new();
        let session_id = manager.create_session(1).await;
        let (tx, mut rx) = channel();
        manager.register_connection(&session_id, tx).await;
        let _ = rx.recv().await;

        assert!(manager.send_ping(&session_id).await);
        let value: serde_json::Value = match rx.recv().await.unwrap() {
            StatusFrame::Json(json) => serde_json::from_str(&json).unwrap(),
            StatusFrame::Close => panic!("unexpected close"),
        };
        assert_eq!(value["type"], "ping");
    }
}
