//! Session metadata and its lifecycle state machine.
//!
//! ```text
//! Connected ──ping failures ≥ threshold──▶ Distressed
//!     ▲                                        │
//!     └────────────ping success────────────────┘
//!
//! any state ──stale timeout / DELETE / stream close──▶ Disconnected (terminal)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

use hfmcp_app::ClientIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connected,
    Distressed,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub request_count: u64,
    pub is_authenticated: bool,
    pub client_info: Option<ClientIdentity>,
    pub capabilities: Option<Value>,
    pub ping_failures: u32,
    pub last_ping_attempt: Option<Instant>,
    pub ip_address: Option<String>,
    pub state: SessionState,
}

/// Serializable view for the management surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    pub idle_ms: u64,
    pub request_count: u64,
    pub is_authenticated: bool,
    pub client_info: Option<ClientIdentity>,
    pub ping_failures: u32,
    pub ip_address: Option<String>,
    pub state: SessionState,
}

impl SessionMetadata {
    pub fn new(id: String, is_authenticated: bool, ip_address: Option<String>) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            last_activity: Instant::now(),
            request_count: 0,
            is_authenticated,
            client_info: None,
            capabilities: None,
            ping_failures: 0,
            last_ping_attempt: None,
            ip_address,
            state: SessionState::Connected,
        }
    }

    /// Called on every request routed to this session.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.request_count += 1;
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn record_ping_attempt(&mut self) {
        self.last_ping_attempt = Some(Instant::now());
    }

    /// Ping success refreshes activity and recovers a distressed session.
    pub fn record_ping_success(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.ping_failures = 0;
        self.last_activity = Instant::now();
        self.state = SessionState::Connected;
    }

    pub fn record_ping_failure(&mut self, threshold: u32) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.ping_failures += 1;
        if self.ping_failures >= threshold {
            self.state = SessionState::Distressed;
        }
    }

    /// Terminal transition; the session is about to be removed.
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            connected_at: self.connected_at,
            idle_ms: self.last_activity.elapsed().as_millis() as u64,
            request_count: self.request_count,
            is_authenticated: self.is_authenticated,
            client_info: self.client_info.clone(),
            ping_failures: self.ping_failures,
            ip_address: self.ip_address.clone(),
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionMetadata {
        SessionMetadata::new("s-1".to_string(), false, None)
    }

    #[test]
    fn test_new_session_is_connected() {
        let meta = session();
        assert_eq!(meta.state, SessionState::Connected);
        assert_eq!(meta.request_count, 0);
        assert_eq!(meta.ping_failures, 0);
    }

    #[test]
    fn test_touch_updates_activity_and_count() {
        let mut meta = session();
        meta.touch();
        meta.touch();
        assert_eq!(meta.request_count, 2);
        assert!(!meta.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn test_ping_failure_reaches_distressed_at_threshold() {
        let mut meta = session();
        meta.record_ping_failure(2);
        assert_eq!(meta.state, SessionState::Connected);
        meta.record_ping_failure(2);
        assert_eq!(meta.state, SessionState::Distressed);
        assert_eq!(meta.ping_failures, 2);
    }

    #[test]
    fn test_default_threshold_is_immediate() {
        let mut meta = session();
        meta.record_ping_failure(1);
        assert_eq!(meta.state, SessionState::Distressed);
    }

    #[test]
    fn test_ping_success_recovers_distressed() {
        let mut meta = session();
        meta.record_ping_failure(1);
        assert_eq!(meta.state, SessionState::Distressed);

        meta.record_ping_success();
        assert_eq!(meta.state, SessionState::Connected);
        assert_eq!(meta.ping_failures, 0);
    }

    #[test]
    fn test_disconnected_is_terminal() {
        let mut meta = session();
        meta.disconnect();
        meta.record_ping_success();
        assert_eq!(meta.state, SessionState::Disconnected);
        meta.record_ping_failure(1);
        assert_eq!(meta.state, SessionState::Disconnected);
    }

    #[test]
    fn test_staleness() {
        let mut meta = session();
        meta.last_activity = Instant::now() - Duration::from_secs(601);
        assert!(meta.is_stale(Duration::from_secs(600)));
        assert!(!meta.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn test_snapshot_shape() {
        let mut meta = session();
        meta.touch();
        let snapshot = meta.snapshot();
        assert_eq!(snapshot.id, "s-1");
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.state, SessionState::Connected);
    }
}
