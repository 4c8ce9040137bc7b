//! JSON-RPC 2.0 over `Content-Length` framed byte streams.
//!
//! One background reader task per connection:
//!   - responses complete the matching pending request (by id)
//!   - `session.event` notifications are fanned out to the callbacks
//!     registered for that session, inline on the reader task
//!   - server→client requests (`permission.request`, `tool.call`) are
//!     answered directly
//!
//! When the stream ends every pending request fails with a connection
//! error and [`RpcConnection::closed`] resolves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, watch, Mutex};

use super::events::SessionEvent;
use super::types::{ConnectionState, PermissionPolicy};
use crate::error::{Result, ScgError};

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback invoked for every event of one session. Runs on the reader
/// task, so it must return quickly.
pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// In-flight requests: id → (method, completion). The method classifies
/// error responses. Once `closed` is set no new request is accepted.
#[derive(Default)]
struct PendingRequests {
    requests: HashMap<u64, (String, oneshot::Sender<Result<Value>>)>,
    closed: bool,
}

const METHOD_NOT_FOUND: i64 = -32601;
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

// ─── Framing ────────────────────────────────────────────────────────────

/// Read one framed message body. `Ok(None)` on a clean EOF between frames.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if saw_header {
                return Err(ScgError::Protocol("stream ended inside frame header".to_string()));
            }
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            // Stray blank line between frames.
            continue;
        }
        saw_header = true;
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let parsed = value.trim().parse::<usize>().map_err(|e| {
                    ScgError::Protocol(format!("invalid Content-Length '{}': {}", value.trim(), e))
                })?;
                content_length = Some(parsed);
            }
        }
    }

    let len = content_length
        .ok_or_else(|| ScgError::Protocol("frame without Content-Length header".to_string()))?;
    if len > MAX_FRAME_BYTES {
        return Err(ScgError::Protocol(format!("frame of {} bytes exceeds limit", len)));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub(crate) fn encode_frame(message: &Value) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)
        .map_err(|e| ScgError::Protocol(format!("failed to encode message: {}", e)))?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

async fn write_message(writer: &Mutex<BoxedWriter>, message: &Value) -> Result<()> {
    let frame = encode_frame(message)?;
    let mut writer = writer.lock().await;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// ─── Session routing ────────────────────────────────────────────────────

/// Session id → registered event callbacks.
#[derive(Default)]
pub(crate) struct SessionRouter {
    sessions: Mutex<HashMap<String, Vec<(u64, EventCallback)>>>,
    next_subscription: AtomicU64,
}

impl SessionRouter {
    pub async fn register_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default();
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn subscribe(&self, session_id: &str, callback: EventCallback) -> u64 {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    pub async fn unsubscribe(&self, session_id: &str, subscription: u64) {
        if let Some(callbacks) = self.sessions.lock().await.get_mut(session_id) {
            callbacks.retain(|(id, _)| *id != subscription);
        }
    }

    /// Deliver `event` to every callback of `session_id`, in registration order.
    pub async fn dispatch(&self, session_id: &str, event: &SessionEvent) {
        let callbacks: Vec<EventCallback> = match self.sessions.lock().await.get(session_id) {
            Some(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
            None => {
                tracing::debug!(
                    "[RpcConnection] Event {} for unknown session {}",
                    event.event_type(),
                    session_id
                );
                return;
            }
        };
        for callback in callbacks {
            callback(event);
        }
    }
}

// ─── Connection ─────────────────────────────────────────────────────────

pub(crate) struct RpcConnection {
    writer: Arc<Mutex<BoxedWriter>>,
    pending: Arc<Mutex<PendingRequests>>,
    next_id: AtomicU64,
    router: Arc<SessionRouter>,
    closed_rx: watch::Receiver<bool>,
    request_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RpcConnection {
    /// Start the reader task over `reader` and return the connection.
    ///
    /// `state` is moved to [`ConnectionState::Error`] if the stream ends
    /// while the client still considers itself connected.
    pub fn start(
        reader: BoxedReader,
        writer: BoxedWriter,
        state: Arc<AtomicU8>,
        permission_policy: PermissionPolicy,
        request_timeout: Duration,
    ) -> Self {
        let writer = Arc::new(Mutex::new(writer));
        let pending: Arc<Mutex<PendingRequests>> = Arc::new(Mutex::new(PendingRequests::default()));
        let router = Arc::new(SessionRouter::default());
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_handle = tokio::spawn(reader_loop(
            BufReader::new(reader),
            writer.clone(),
            pending.clone(),
            router.clone(),
            closed_tx,
            state,
            permission_policy,
        ));

        Self {
            writer,
            pending,
            next_id: AtomicU64::new(1),
            router,
            closed_rx,
            request_timeout,
            reader_handle,
        }
    }

    pub fn router(&self) -> &Arc<SessionRouter> {
        &self.router
    }

    pub fn is_closed(&self) -> bool {
        // The sender is dropped when the reader task is aborted.
        *self.closed_rx.borrow() || self.closed_rx.has_changed().is_err()
    }

    /// Resolves once the reader has stopped.
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        // A dropped sender means the reader task is gone, which is closed too.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(ScgError::Connection(format!(
                "connection is closed, cannot send {}",
                method
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            // Checked under the lock so a reader that stops concurrently
            // cannot miss this request when it fails the pending set.
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(ScgError::Connection(format!(
                    "connection is closed, cannot send {}",
                    method
                )));
            }
            pending.requests.insert(id, (method.to_string(), tx));
        }

        let message = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(e) = write_message(&self.writer, &message).await {
            self.pending.lock().await.requests.remove(&id);
            return Err(ScgError::Connection(format!("write {}: {}", method, e)));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ScgError::Connection(format!(
                "connection closed while waiting for {} (id={})",
                method, id
            ))),
            Err(_) => {
                self.pending.lock().await.requests.remove(&id);
                Err(ScgError::timeout(method, timeout))
            }
        }
    }

    /// Stop reading, close the write half and fail whatever is still pending.
    pub async fn shutdown(&self) {
        self.reader_handle.abort();
        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        fail_pending(&self.pending, "connection shut down").await;
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

async fn fail_pending(pending: &Mutex<PendingRequests>, reason: &str) {
    let mut pending = pending.lock().await;
    pending.closed = true;
    for (_, (_, tx)) in pending.requests.drain() {
        let _ = tx.send(Err(ScgError::Connection(reason.to_string())));
    }
}

/// Map a JSON-RPC error response onto the error taxonomy: session methods
/// fail as session errors, everything else as connection errors.
fn rpc_error(method_hint: Option<&str>, error: &Value) -> ScgError {
    let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error");
    let text = format!("RPC error [{}]: {}", code, message);
    match method_hint {
        Some(m) if m.starts_with("session.") => ScgError::Session(text),
        _ => ScgError::Connection(text),
    }
}

async fn reader_loop(
    mut reader: BufReader<BoxedReader>,
    writer: Arc<Mutex<BoxedWriter>>,
    pending: Arc<Mutex<PendingRequests>>,
    router: Arc<SessionRouter>,
    closed_tx: watch::Sender<bool>,
    state: Arc<AtomicU8>,
    permission_policy: PermissionPolicy,
) {
    loop {
        let body = match read_frame(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::info!("[RpcConnection] Server closed the stream");
                break;
            }
            Err(e) => {
                tracing::error!("[RpcConnection] Failed to read frame: {}", e);
                break;
            }
        };

        let msg: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("[RpcConnection] Dropping non-JSON frame: {}", e);
                continue;
            }
        };

        let id = msg.get("id").filter(|v| !v.is_null());
        let method = msg.get("method").and_then(|m| m.as_str());
        let has_result = msg.get("result").is_some();
        let has_error = msg.get("error").is_some();

        match (id, method) {
            (Some(id), None) if has_result || has_error => {
                let Some(id) = id.as_u64() else {
                    tracing::warn!("[RpcConnection] Response with foreign id: {}", id);
                    continue;
                };
                let Some((method, tx)) = pending.lock().await.requests.remove(&id) else {
                    tracing::debug!("[RpcConnection] Late response for id={}", id);
                    continue;
                };
                let result = if has_error {
                    Err(rpc_error(Some(&method), &msg["error"]))
                } else {
                    Ok(msg["result"].clone())
                };
                let _ = tx.send(result);
            }
            (Some(id), Some(method)) => {
                let reply = match handle_server_request(method, &msg["params"], permission_policy) {
                    Ok(result) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err((code, message)) => serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": code, "message": message },
                    }),
                };
                if let Err(e) = write_message(&writer, &reply).await {
                    tracing::error!("[RpcConnection] Failed to answer {}: {}", method, e);
                }
            }
            (None, Some("session.event")) => {
                let params = &msg["params"];
                let Some(session_id) = params.get("sessionId").and_then(|s| s.as_str()) else {
                    tracing::warn!("[RpcConnection] session.event without sessionId");
                    continue;
                };
                match SessionEvent::from_value(&params["event"]) {
                    Ok(event) => router.dispatch(session_id, &event).await,
                    Err(e) => tracing::warn!("[RpcConnection] Bad event for {}: {}", session_id, e),
                }
            }
            (None, Some(other)) => {
                tracing::debug!("[RpcConnection] Ignoring notification {}", other);
            }
            _ => {
                tracing::debug!("[RpcConnection] Unhandled message: {}", msg);
            }
        }
    }

    if state.load(Ordering::SeqCst) == ConnectionState::Connected.as_u8() {
        state.store(ConnectionState::Error.as_u8(), Ordering::SeqCst);
    }
    fail_pending(&pending, "connection closed").await;
    let _ = closed_tx.send(true);
}

/// Answer server→client requests.
fn handle_server_request(
    method: &str,
    params: &Value,
    permission_policy: PermissionPolicy,
) -> std::result::Result<Value, (i64, String)> {
    match method {
        "permission.request" => {
            let kind = params
                .pointer("/permissionRequest/kind")
                .and_then(|k| k.as_str())
                .unwrap_or("unknown");
            let decision = match permission_policy {
                PermissionPolicy::ApproveAll => "approved",
                PermissionPolicy::DenyAll => "denied-no-approval-rule-and-could-not-request-from-user",
            };
            tracing::debug!("[RpcConnection] Permission '{}' -> {}", kind, decision);
            Ok(serde_json::json!({ "result": { "kind": decision } }))
        }
        "tool.call" => {
            let tool = params
                .get("toolName")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown");
            tracing::warn!("[RpcConnection] Server asked for unregistered tool '{}'", tool);
            Ok(serde_json::json!({
                "result": {
                    "textResultForLlm": format!("Tool '{}' is not supported by this client.", tool),
                    "resultType": "failure",
                    "error": format!("tool '{}' not supported", tool),
                }
            }))
        }
        _ => {
            tracing::warn!("[RpcConnection] Unknown server request: {}", method);
            Err((METHOD_NOT_FOUND, format!("Method not found: {}", method)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_frame_roundtrip_over_buffer() {
        let first = encode_frame(&json!({ "jsonrpc": "2.0", "id": 1, "result": {} })).unwrap();
        let second = encode_frame(&json!({ "jsonrpc": "2.0", "method": "x" })).unwrap();
        let mut bytes = first;
        bytes.extend_from_slice(&second);

        let mut reader = BufReader::new(&bytes[..]);
        let a: Value = serde_json::from_slice(&read_frame(&mut reader).await.unwrap().unwrap()).unwrap();
        let b: Value = serde_json::from_slice(&read_frame(&mut reader).await.unwrap().unwrap()).unwrap();
        assert_eq!(a["id"], 1);
        assert_eq!(b["method"], "x");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_header_is_case_insensitive() {
        let data = b"content-length: 2\r\nContent-Type: application/json\r\n\r\n{}";
        let mut reader = BufReader::new(&data[..]);
        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn test_frame_without_length_is_rejected() {
        let data = b"X-Other: 1\r\n\r\n{}";
        let mut reader = BufReader::new(&data[..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, ScgError::Protocol(_)));
    }

    #[test]
    fn test_permission_policy_answers() {
        let params = json!({ "permissionRequest": { "kind": "write" } });
        let approved = handle_server_request("permission.request", &params, PermissionPolicy::ApproveAll).unwrap();
        assert_eq!(approved["result"]["kind"], "approved");
        let denied = handle_server_request("permission.request", &params, PermissionPolicy::DenyAll).unwrap();
        assert_ne!(denied["result"]["kind"], "approved");
        let unknown = handle_server_request("fs.nuke", &params, PermissionPolicy::ApproveAll).unwrap_err();
        assert_eq!(unknown.0, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_rpc_error_classification() {
        let error = json!({ "code": -32000, "message": "unknown model" });
        assert!(matches!(rpc_error(Some("session.create"), &error), ScgError::Session(_)));
        assert!(matches!(rpc_error(Some("ping"), &error), ScgError::Connection(_)));
        assert!(matches!(rpc_error(None, &error), ScgError::Connection(_)));
    }

    #[tokio::test]
    async fn test_router_dispatch_order_and_unsubscribe() {
        let router = SessionRouter::default();
        router.register_session("s1").await;
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let a = seen.clone();
        let first = router
            .subscribe("s1", Arc::new(move |e: &SessionEvent| a.lock().unwrap().push(format!("a:{}", e.event_type()))))
            .await;
        let b = seen.clone();
        router
            .subscribe("s1", Arc::new(move |e: &SessionEvent| b.lock().unwrap().push(format!("b:{}", e.event_type()))))
            .await;

        router.dispatch("s1", &SessionEvent::Idle).await;
        router.unsubscribe("s1", first).await;
        router.dispatch("s1", &SessionEvent::Idle).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["a:session.idle", "b:session.idle", "b:session.idle"]);
    }

    #[tokio::test]
    async fn test_request_fails_when_stream_ends() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(client_io);
        let state = Arc::new(AtomicU8::new(ConnectionState::Connected.as_u8()));
        let conn = RpcConnection::start(
            Box::new(read_half),
            Box::new(write_half),
            state.clone(),
            PermissionPolicy::ApproveAll,
            Duration::from_secs(5),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        // The "server" reads the request and hangs up without answering.
        tokio::spawn(async move {
            let mut server = BufReader::new(server_io);
            if read_frame(&mut server).await.unwrap().is_some() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = conn.request("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, ScgError::Connection(_)), "{:?}", err);
        conn.closed().await;
        assert!(conn.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ConnectionState::from_u8(state.load(Ordering::SeqCst)), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_request_after_pending_set_failed_is_rejected() {
        let (client_io, _server_io) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(client_io);
        let conn = RpcConnection::start(
            Box::new(read_half),
            Box::new(write_half),
            Arc::new(AtomicU8::new(ConnectionState::Connected.as_u8())),
            PermissionPolicy::ApproveAll,
            Duration::from_secs(30),
        );

        // The reader has failed the pending set but not yet announced the close.
        fail_pending(&conn.pending, "connection closed").await;
        assert!(!conn.is_closed());

        let started = std::time::Instant::now();
        let err = conn.request("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, ScgError::Connection(_)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(conn.pending.lock().await.requests.is_empty());
    }
}
