//! MCP transport layer (SPEC_FULL §4.4).
//!
//! Grounded in the teacher's `mcp-client::transport`, with one structural
//! fix: the teacher's `StdioTransport` serializes entire request/response
//! cycles behind a single `request_lock`, so two concurrent callers on the
//! same server block each other for the full round trip. This version
//! keeps a dedicated reader task and an id → response-channel pending map
//! instead, so concurrent calls are multiplexed by id and complete
//! out of order as their responses arrive — writes still serialize (one
//! line at a time on a single stdin), but no caller waits on another
//! caller's response.
//!
//! The teacher's SSE transport was a permanent stub; this adds a real
//! HTTP transport (plain JSON-RPC-over-POST) since SPEC_FULL names a
//! remote MCP server as a first-class case, not a placeholder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex};

use crate::config::McpServerConfig;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;
    fn is_alive(&self) -> bool;
    async fn shutdown(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MCP server process has exited")]
    ProcessExited,
    #[error("timeout waiting for response")]
    Timeout,
    #[error("HTTP transport error: {0}")]
    Http(String),
    #[error("transport not supported: {0}")]
    Unsupported(String),
}

impl TransportError {
    pub fn category(&self) -> agentcore_domain::ErrorCategory {
        use agentcore_domain::ErrorCategory;
        match self {
            TransportError::Timeout => ErrorCategory::Timeout,
            TransportError::ProcessExited | TransportError::Io(_) | TransportError::Http(_) => {
                ErrorCategory::NetworkError
            }
            TransportError::Json(_) => ErrorCategory::Unknown,
            TransportError::Unsupported(_) => ErrorCategory::InvalidInput,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport — id-multiplexed
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_SKIP_LINES: usize = 1000;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl StdioTransport {
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture child stdin"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture child stdout"))
        })?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        spawn_reader(BufReader::new(stdout), pending.clone(), alive.clone());

        Ok(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
            alive,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

/// Owns stdout for the lifetime of the transport: reads lines, parses
/// responses, and routes each to the pending caller waiting on its id.
/// Lines that aren't a recognizable response (notifications, stray
/// stderr-on-stdout chatter) are logged and skipped.
fn spawn_reader(
    mut stdout: BufReader<tokio::process::ChildStdout>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            match stdout.read_line(&mut line).await {
                Ok(0) => {
                    alive.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if !trimmed.starts_with('{') {
                        skipped += 1;
                        tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
                        if skipped >= MAX_SKIP_LINES {
                            tracing::warn!("MCP server produced too many non-JSON lines, marking dead");
                            alive.store(false, Ordering::SeqCst);
                            break;
                        }
                        continue;
                    }
                    skipped = 0;
                    match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                        Ok(resp) => {
                            let mut pending = pending.lock().await;
                            if let Some(tx) = pending.remove(&resp.id) {
                                let _ = tx.send(resp);
                            } else {
                                tracing::debug!(id = resp.id, "response for unknown/expired request id, dropping");
                            }
                        }
                        Err(_) => {
                            tracing::debug!(line = %trimmed, "skipping non-response message (likely a notification)");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "MCP stdio reader error, marking dead");
                    alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        tracing::debug!(id, method, "sending MCP request");
        if let Err(e) = self.write_line(&json).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TransportError::ProcessExited),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(?status, "MCP server process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for MCP server process"),
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                let _ = child.kill().await;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport — JSON-RPC over POST, one request per round trip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Each HTTP POST carries its own response, so there's no manual
/// multiplexing to do — the underlying connection pool already lets
/// concurrent calls run without blocking each other, which is the
/// property the stdio transport's reader task exists to recover.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &McpServerConfig) -> Result<Self, TransportError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| TransportError::Unsupported("http transport requires a url".into()))?;
        Ok(Self {
            url,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let result = tokio::time::timeout(
            self.request_timeout,
            self.client.post(&self.url).json(&req).send(),
        )
        .await;

        let resp = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Http(e.to_string()));
            }
            Err(_) => return Err(TransportError::Timeout),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            self.alive.store(false, Ordering::SeqCst);
            return Err(TransportError::Http(format!("HTTP {status}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        self.client
            .post(&self.url)
            .json(&notif)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_categories_match_taxonomy() {
        use agentcore_domain::ErrorCategory;
        assert_eq!(TransportError::Timeout.category(), ErrorCategory::Timeout);
        assert_eq!(TransportError::ProcessExited.category(), ErrorCategory::NetworkError);
        assert_eq!(
            TransportError::Unsupported("x".into()).category(),
            ErrorCategory::InvalidInput
        );
    }

    #[test]
    fn http_transport_requires_url() {
        let config = McpServerConfig {
            id: "remote".into(),
            transport: crate::config::McpTransportKind::Http,
            command: String::new(),
            args: vec![],
            env: HashMap::new(),
            url: None,
            request_timeout_ms: 1000,
        };
        assert!(HttpTransport::new(&config).is_err());
    }
}
