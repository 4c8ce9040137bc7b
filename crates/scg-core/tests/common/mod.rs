//! In-process fake Copilot server for integration tests.
//!
//! Speaks the same `Content-Length` framed JSON-RPC as `copilot --server`
//! over a `tokio::io::duplex` pipe and counts the session calls it sees.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use scg_core::copilot::{ClientOptions, CopilotClient, PROTOCOL_VERSION};
use scg_core::wrapper::DeltaSink;

#[derive(Default)]
pub struct ServerStats {
    pub creates: AtomicUsize,
    pub sends: AtomicUsize,
    pub destroys: AtomicUsize,
    pub create_params: Mutex<Vec<Value>>,
    pub send_params: Mutex<Vec<Value>>,
}

impl ServerStats {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn last_create(&self) -> Value {
        self.create_params.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }

    pub fn last_send(&self) -> Value {
        self.send_params.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }
}

/// What the fake server does.
#[derive(Clone)]
pub struct FakeServer {
    pub protocol_version: Option<u32>,
    /// Events emitted (in order) right after answering `session.send`.
    pub events: Vec<Value>,
    /// Close the stream right after answering `session.send`.
    pub hang_up_after_send: bool,
    /// Answer `session.destroy` with an RPC error (the call is still counted).
    pub fail_destroy: bool,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self {
            protocol_version: Some(PROTOCOL_VERSION),
            events: Vec::new(),
            hang_up_after_send: false,
            fail_destroy: false,
        }
    }
}

impl FakeServer {
    pub fn with_events(events: Vec<Value>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Start the server task and return a client wired to it (not started).
    pub fn spawn(self) -> (CopilotClient, Arc<ServerStats>) {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let stats = Arc::new(ServerStats::default());
        tokio::spawn(serve(self, server_io, stats.clone()));
        let client = CopilotClient::from_streams(client_read, client_write, ClientOptions::default());
        (client, stats)
    }
}

pub fn delta(text: &str) -> Value {
    json!({ "type": "assistant.message_delta", "data": { "messageId": "m1", "deltaContent": text } })
}

pub fn message(content: &str) -> Value {
    json!({ "type": "assistant.message", "data": { "messageId": "m1", "content": content } })
}

pub fn usage() -> Value {
    json!({ "type": "assistant.usage", "data": { "model": "m1", "inputTokens": 1200, "outputTokens": 80 } })
}

pub fn session_error(message: &str) -> Value {
    json!({ "type": "session.error", "data": { "errorType": "model", "message": message } })
}

pub fn idle() -> Value {
    json!({ "type": "session.idle", "data": {} })
}

/// Collects deltas written by the wrapper's event handler.
#[derive(Default)]
pub struct RecordingSink(pub Mutex<Vec<String>>);

impl RecordingSink {
    pub fn deltas(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl DeltaSink for RecordingSink {
    fn write_delta(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) {
    let body = serde_json::to_vec(message).unwrap();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await.unwrap();
    writer.write_all(&body).await.unwrap();
    writer.flush().await.unwrap();
}

async fn serve(server: FakeServer, io: tokio::io::DuplexStream, stats: Arc<ServerStats>) {
    let (read_half, mut writer) = tokio::io::split(io);
    let mut reader = BufReader::new(read_half);

    loop {
        let mut length = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some(value) = trimmed.strip_prefix("Content-Length:") {
                length = value.trim().parse::<usize>().ok();
            }
        }
        let Some(length) = length else { return };
        let mut body = vec![0u8; length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }
        let request: Value = serde_json::from_slice(&body).unwrap();
        let id = request["id"].clone();
        let params = request["params"].clone();

        match request["method"].as_str().unwrap_or("") {
            "ping" => {
                let mut result = json!({ "message": "pong", "timestamp": 1_700_000_000_000i64 });
                if let Some(version) = server.protocol_version {
                    result["protocolVersion"] = json!(version);
                }
                write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "result": result })).await;
            }
            "models.list" => {
                let result = json!({ "models": [
                    { "id": "m1", "name": "Model One" },
                    { "id": "m2", "name": "Model Two" }
                ]});
                write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "result": result })).await;
            }
            "session.create" => {
                stats.create_params.lock().unwrap().push(params.clone());
                if params["model"] == "unknown-model" {
                    let error = json!({ "code": -32000, "message": "Model unknown-model is not available" });
                    write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "error": error })).await;
                    continue;
                }
                let n = stats.creates.fetch_add(1, Ordering::SeqCst) + 1;
                let result = json!({ "sessionId": format!("session-{}", n) });
                write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "result": result })).await;
            }
            "session.send" => {
                stats.sends.fetch_add(1, Ordering::SeqCst);
                stats.send_params.lock().unwrap().push(params.clone());
                let session_id = params["sessionId"].clone();
                write_frame(
                    &mut writer,
                    &json!({ "jsonrpc": "2.0", "id": id, "result": { "messageId": "msg-1" } }),
                )
                .await;
                if server.hang_up_after_send {
                    return;
                }
                for event in &server.events {
                    let notification = json!({
                        "jsonrpc": "2.0",
                        "method": "session.event",
                        "params": { "sessionId": session_id, "event": event }
                    });
                    write_frame(&mut writer, &notification).await;
                }
            }
            "session.destroy" => {
                stats.destroys.fetch_add(1, Ordering::SeqCst);
                if server.fail_destroy {
                    let error = json!({ "code": -32000, "message": "session is busy" });
                    write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "error": error })).await;
                    continue;
                }
                write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "result": {} })).await;
            }
            other => {
                let error = json!({ "code": -32601, "message": format!("Method not found: {}", other) });
                write_frame(&mut writer, &json!({ "jsonrpc": "2.0", "id": id, "error": error })).await;
            }
        }
    }
}
