use std::time::{Duration, Instant};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport opened, INIT not yet sent
    Connecting,
    /// INIT sent, traffic flowing
    Connected,
    /// Transport closed
    Disconnected,
}

/// Per-session connection bookkeeping
#[derive(Debug)]
pub struct Connection {
    pub url: String,
    pub state: ConnectionState,
    pub created_at: Instant,
    pub connected_at: Option<Instant>,
    pub last_activity: Instant,
    pub close_reason: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl Connection {
    pub fn new(url: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            url: url.into(),
            state: ConnectionState::Connecting,
            created_at: now,
            connected_at: None,
            last_activity: now,
            close_reason: None,
            bytes_sent: 0,
            bytes_received: 0,
            messages_sent: 0,
            messages_received: 0,
        }
    }

    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.connected_at = Some(Instant::now());
        self.touch();
    }

    /// Mark as fully disconnected, keeping the first reason seen
    pub fn mark_disconnected(&mut self, reason: Option<String>) {
        self.state = ConnectionState::Disconnected;
        if self.close_reason.is_none() {
            self.close_reason = reason;
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.messages_received += 1;
        self.touch();
    }

    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Time since the transport reported it was up
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|t| t.elapsed())
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lifecycle() {
        let mut conn = Connection::new("ws://127.0.0.1:8001");
        assert_eq!(conn.state, ConnectionState::Connecting);
        assert!(conn.uptime().is_none());

        conn.mark_connected();
        assert!(conn.is_connected());
        assert!(conn.uptime().is_some());

        conn.mark_disconnected(Some("server going away".to_string()));
        conn.mark_disconnected(None);
        assert_eq!(conn.state, ConnectionState::Disconnected);
        assert_eq!(conn.close_reason.as_deref(), Some("server going away"));
    }

    #[test]
    fn test_traffic_accounting() {
        let mut conn = Connection::new("ws://localhost");
        conn.record_sent(4);
        conn.record_received(30);
        conn.record_received(12);

        assert_eq!(conn.messages_sent, 1);
        assert_eq!(conn.bytes_sent, 4);
        assert_eq!(conn.messages_received, 2);
        assert_eq!(conn.bytes_received, 42);
        assert!(conn.idle_time() < Duration::from_secs(5));
    }
}
