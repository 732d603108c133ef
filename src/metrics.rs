//! Prometheus-compatible session metrics
//!
//! Counters for wire traffic and event handling plus world gauges, optionally
//! served over a tiny HTTP endpoint.
//! Default endpoint: http://localhost:<METRICS_PORT>/metrics

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics_server")]
use std::sync::Arc;
use std::time::{Duration, Instant};
#[cfg(feature = "metrics_server")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(feature = "metrics_server")]
use tokio::net::TcpListener;
#[cfg(feature = "metrics_server")]
use tracing::{debug, info};

/// Samples kept for apply-time percentiles
const APPLY_HISTORY: usize = 1000;

/// Metrics registry for one client session
#[derive(Debug)]
pub struct Metrics {
    // Wire traffic
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Event handling
    pub events_applied: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub controller_errors: AtomicU64,
    pub dropped_while_loading: AtomicU64,
    pub ignored_events: AtomicU64,
    pub bomb_ticks: AtomicU64,
    pub local_moves: AtomicU64,

    // World gauges
    pub running: AtomicU64,
    pub worm_count: AtomicU64,
    pub food_count: AtomicU64,
    pub bomb_count: AtomicU64,

    // Apply timing (microseconds)
    pub apply_time_us: AtomicU64,
    pub apply_time_p95_us: AtomicU64,
    pub apply_time_p99_us: AtomicU64,
    pub apply_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling apply times for percentile calculation
    apply_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            controller_errors: AtomicU64::new(0),
            dropped_while_loading: AtomicU64::new(0),
            ignored_events: AtomicU64::new(0),
            bomb_ticks: AtomicU64::new(0),
            local_moves: AtomicU64::new(0),
            running: AtomicU64::new(0),
            worm_count: AtomicU64::new(0),
            food_count: AtomicU64::new(0),
            bomb_count: AtomicU64::new(0),
            apply_time_us: AtomicU64::new(0),
            apply_time_p95_us: AtomicU64::new(0),
            apply_time_p99_us: AtomicU64::new(0),
            apply_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            apply_history: RwLock::new(VecDeque::with_capacity(APPLY_HISTORY)),
        }
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record how long one event took to apply and update percentiles
    pub fn record_apply_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.apply_time_us.store(us, Ordering::Relaxed);
        self.events_applied.fetch_add(1, Ordering::Relaxed);

        let mut history = self.apply_history.write();
        history.push_back(us);
        while history.len() > APPLY_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.apply_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.apply_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.apply_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn set_world(&self, running: bool, worms: usize, food: usize, bombs: usize) {
        self.running.store(running as u64, Ordering::Relaxed);
        self.worm_count.store(worms as u64, Ordering::Relaxed);
        self.food_count.store(food as u64, Ordering::Relaxed);
        self.bomb_count.store(bombs as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Network
        metric!("wormo_messages_received_total", "Total messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("wormo_messages_sent_total", "Total messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("wormo_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("wormo_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));

        // Events
        metric!("wormo_events_applied_total", "Server events applied", "counter",
            self.events_applied.load(Ordering::Relaxed));
        metric!("wormo_protocol_errors_total", "Messages that failed to decode", "counter",
            self.protocol_errors.load(Ordering::Relaxed));
        metric!("wormo_controller_errors_total", "Events rejected as inconsistent", "counter",
            self.controller_errors.load(Ordering::Relaxed));
        metric!("wormo_dropped_while_loading_total", "Events dropped before INIT", "counter",
            self.dropped_while_loading.load(Ordering::Relaxed));
        metric!("wormo_ignored_events_total", "Server echoes ignored in predictive mode", "counter",
            self.ignored_events.load(Ordering::Relaxed));
        metric!("wormo_bomb_ticks_total", "Bomb countdown ticks", "counter",
            self.bomb_ticks.load(Ordering::Relaxed));
        metric!("wormo_local_moves_total", "Directions handled locally", "counter",
            self.local_moves.load(Ordering::Relaxed));

        // World
        metric!("wormo_running", "World loaded (0/1)", "gauge",
            self.running.load(Ordering::Relaxed));
        metric!("wormo_worms", "Worms in the world", "gauge",
            self.worm_count.load(Ordering::Relaxed));
        metric!("wormo_food", "Food pellets in the world", "gauge",
            self.food_count.load(Ordering::Relaxed));
        metric!("wormo_bombs", "Live bombs", "gauge",
            self.bomb_count.load(Ordering::Relaxed));

        // Timing
        metric!("wormo_apply_time_microseconds", "Last event apply time", "gauge",
            self.apply_time_us.load(Ordering::Relaxed));
        metric!("wormo_apply_time_p95_microseconds", "95th percentile apply time", "gauge",
            self.apply_time_p95_us.load(Ordering::Relaxed));
        metric!("wormo_apply_time_p99_microseconds", "99th percentile apply time", "gauge",
            self.apply_time_p99_us.load(Ordering::Relaxed));
        metric!("wormo_apply_time_max_microseconds", "Maximum apply time", "gauge",
            self.apply_time_max_us.load(Ordering::Relaxed));
        metric!("wormo_uptime_seconds", "Session uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON view for direct API access
    pub fn to_json(&self) -> String {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        serde_json::json!({
            "network": {
                "messages_received": load(&self.messages_received),
                "messages_sent": load(&self.messages_sent),
                "bytes_received": load(&self.bytes_received),
                "bytes_sent": load(&self.bytes_sent),
            },
            "events": {
                "applied": load(&self.events_applied),
                "protocol_errors": load(&self.protocol_errors),
                "controller_errors": load(&self.controller_errors),
                "dropped_while_loading": load(&self.dropped_while_loading),
                "ignored": load(&self.ignored_events),
                "bomb_ticks": load(&self.bomb_ticks),
                "local_moves": load(&self.local_moves),
            },
            "world": {
                "running": load(&self.running) == 1,
                "worms": load(&self.worm_count),
                "food": load(&self.food_count),
                "bombs": load(&self.bomb_count),
            },
            "performance": {
                "apply_time_us": load(&self.apply_time_us),
                "apply_time_p95_us": load(&self.apply_time_p95_us),
                "apply_time_p99_us": load(&self.apply_time_p99_us),
                "apply_time_max_us": load(&self.apply_time_max_us),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics_server")]
fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
#[cfg(feature = "metrics_server")]
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // Longest prefix first
                    let response = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.messages_received.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.events_applied.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_apply_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_apply_time(Duration::from_micros(10 + i));
        }

        assert_eq!(metrics.events_applied.load(Ordering::Relaxed), 100);
        assert!(metrics.apply_time_p95_us.load(Ordering::Relaxed) >= 100);
        assert_eq!(metrics.apply_time_max_us.load(Ordering::Relaxed), 109);
    }

    #[test]
    fn test_traffic_counters() {
        let metrics = Metrics::new();
        metrics.record_received(10);
        metrics.record_received(5);
        metrics.record_sent(4);

        assert_eq!(metrics.messages_received.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.bytes_received.load(Ordering::Relaxed), 15);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.set_world(true, 3, 12, 1);
        metrics.protocol_errors.store(2, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("wormo_worms 3"));
        assert!(output.contains("wormo_food 12"));
        assert!(output.contains("wormo_running 1"));
        assert!(output.contains("wormo_protocol_errors_total 2"));
        assert!(output.contains("# TYPE wormo_bombs gauge"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.set_world(false, 0, 0, 0);
        metrics.controller_errors.store(4, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();

        assert_eq!(value["events"]["controller_errors"], 4);
        assert_eq!(value["world"]["running"], false);
    }

    #[cfg(feature = "metrics_server")]
    #[tokio::test]
    async fn test_metrics_server_serves_json() {
        use tokio::net::TcpStream;

        let metrics = Arc::new(Metrics::new());
        metrics.set_world(true, 2, 0, 0);

        // Grab a free port, then hand it to the server
        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            probe.local_addr().unwrap().port()
        };
        tokio::spawn(start_metrics_server(metrics, port));

        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = TcpStream::connect(("127.0.0.1", port)).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut stream = stream.expect("metrics server did not start");

        stream.write_all(b"GET /metrics/json HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("application/json"));
        assert!(response.contains("\"worms\":2"));
    }
}
