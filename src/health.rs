/// Health check HTTP endpoint
/// Exposes tick outcomes on /health, /ready and /metrics for monitoring systems

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timeout for reading HTTP request (prevents slow-loris attacks)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time view of the tick metrics
#[derive(Debug, Clone)]
pub struct TickStatus {
    /// Number of ticks that reconciled roles successfully
    pub ticks_ok: u64,
    /// Number of ticks that failed (guild unreachable, store error, ...)
    pub ticks_failed: u64,
    /// Timestamp of last tick (Unix epoch seconds)
    pub last_tick_time: u64,
    /// Whether the last tick succeeded
    pub last_tick_ok: bool,
    /// Users who should hold the role as of the last successful tick
    pub active_users: u64,
    /// Role additions and removals applied since startup
    pub role_changes: u64,
}

impl Default for TickStatus {
    fn default() -> Self {
        Self {
            ticks_ok: 0,
            ticks_failed: 0,
            last_tick_time: 0,
            last_tick_ok: true, // Assume healthy until proven otherwise
            active_users: 0,
            role_changes: 0,
        }
    }
}

/// Shared tick metrics updated by the reconciliation loop
#[derive(Debug)]
pub struct TickMetrics {
    ticks_ok: AtomicU64,
    ticks_failed: AtomicU64,
    last_tick_time: AtomicU64,
    last_tick_ok: AtomicBool,
    active_users: AtomicU64,
    role_changes: AtomicU64,
}

impl Default for TickMetrics {
    fn default() -> Self {
        Self {
            ticks_ok: AtomicU64::new(0),
            ticks_failed: AtomicU64::new(0),
            last_tick_time: AtomicU64::new(0),
            last_tick_ok: AtomicBool::new(true), // Assume healthy until proven otherwise
            active_users: AtomicU64::new(0),
            role_changes: AtomicU64::new(0),
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl TickMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick
    pub fn record_success(&self, active_users: usize, role_changes: usize) {
        self.ticks_ok.fetch_add(1, Ordering::Relaxed);
        self.active_users.store(active_users as u64, Ordering::Relaxed);
        self.role_changes.fetch_add(role_changes as u64, Ordering::Relaxed);
        self.last_tick_time.store(unix_now(), Ordering::Relaxed);
        self.last_tick_ok.store(true, Ordering::Relaxed);
    }

    /// Record a tick that could not reconcile roles
    pub fn record_failure(&self) {
        self.ticks_failed.fetch_add(1, Ordering::Relaxed);
        self.last_tick_time.store(unix_now(), Ordering::Relaxed);
        self.last_tick_ok.store(false, Ordering::Relaxed);
    }

    pub fn status(&self) -> TickStatus {
        TickStatus {
            ticks_ok: self.ticks_ok.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
            last_tick_time: self.last_tick_time.load(Ordering::Relaxed),
            last_tick_ok: self.last_tick_ok.load(Ordering::Relaxed),
            active_users: self.active_users.load(Ordering::Relaxed),
            role_changes: self.role_changes.load(Ordering::Relaxed),
        }
    }
}

/// Run the health check HTTP server
pub async fn run_health_server(port: u16, metrics: Arc<TickMetrics>, cancel_token: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind health check server on port {}: {}", port, e);
            return;
        }
    };

    info!("Health check server listening on http://0.0.0.0:{}/health", port);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((mut socket, peer_addr)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_request(&mut socket, &metrics).await {
                                debug!("Error handling request from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Health check server shutting down");
                break;
            }
        }
    }
}

async fn handle_request(socket: &mut tokio::net::TcpStream, metrics: &TickMetrics) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];

    let n = match timeout(REQUEST_TIMEOUT, socket.read(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!("Request timeout after {:?}", REQUEST_TIMEOUT);
            return Ok(());
        }
    };

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let response = route(path, &metrics.status());

    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;

    Ok(())
}

fn route(path: &str, status: &TickStatus) -> String {
    match path {
        "/health" | "/healthz" | "/health/" => build_health_response(status),
        // Ready before the first tick so startup is not flagged as an outage
        "/ready" | "/readyz" | "/ready/" => build_ready_response(status.last_tick_ok || status.last_tick_time == 0),
        "/metrics" => build_metrics_response(status),
        _ => build_not_found_response(),
    }
}

fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        content_type,
        body.len(),
        body
    )
}

fn build_health_response(status: &TickStatus) -> String {
    let body = format!(
        r#"{{"status":"healthy","ticks_ok":{},"ticks_failed":{},"last_tick_time":{},"last_tick_ok":{},"active_users":{}}}"#,
        status.ticks_ok, status.ticks_failed, status.last_tick_time, status.last_tick_ok, status.active_users
    );
    http_response("200 OK", "application/json", &body)
}

fn build_ready_response(ready: bool) -> String {
    if ready {
        http_response("200 OK", "application/json", r#"{"ready":true}"#)
    } else {
        http_response("503 Service Unavailable", "application/json", r#"{"ready":false}"#)
    }
}

fn build_metrics_response(status: &TickStatus) -> String {
    // Prometheus-compatible metrics format
    let body = format!(
        "# HELP shiftrole_ticks_total Total number of reconciliation ticks\n\
         # TYPE shiftrole_ticks_total counter\n\
         shiftrole_ticks_total{{result=\"success\"}} {}\n\
         shiftrole_ticks_total{{result=\"failure\"}} {}\n\
         # HELP shiftrole_last_tick_timestamp Unix timestamp of last tick\n\
         # TYPE shiftrole_last_tick_timestamp gauge\n\
         shiftrole_last_tick_timestamp {}\n\
         # HELP shiftrole_last_tick_ok Whether the last tick succeeded (1) or failed (0)\n\
         # TYPE shiftrole_last_tick_ok gauge\n\
         shiftrole_last_tick_ok {}\n\
         # HELP shiftrole_active_users Users who should hold the role\n\
         # TYPE shiftrole_active_users gauge\n\
         shiftrole_active_users {}\n\
         # HELP shiftrole_role_changes_total Role additions and removals applied\n\
         # TYPE shiftrole_role_changes_total counter\n\
         shiftrole_role_changes_total {}\n",
        status.ticks_ok,
        status.ticks_failed,
        status.last_tick_time,
        if status.last_tick_ok { 1 } else { 0 },
        status.active_users,
        status.role_changes,
    );
    http_response("200 OK", "text/plain; version=0.0.4", &body)
}

fn build_not_found_response() -> String {
    http_response("404 Not Found", "application/json", r#"{"error":"Not Found"}"#)
}
