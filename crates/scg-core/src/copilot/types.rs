//! Wire and configuration types for the Copilot CLI server protocol.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Protocol version this client speaks. The server reports its own
/// version in the `ping` response and the two must match.
pub const PROTOCOL_VERSION: u32 = 2;

/// Default limit for a single JSON-RPC request/response round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Connection ─────────────────────────────────────────────────────────

/// Connection state of a [`super::CopilotClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Error => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// How the client reaches the server.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Spawn `copilot --server --stdio` and talk over its stdin/stdout.
    Stdio {
        cli_path: String,
        extra_args: Vec<String>,
        cwd: Option<PathBuf>,
        log_level: String,
    },
    /// Connect to a server that is already listening, e.g. `localhost:4321`.
    Tcp { url: String },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Stdio {
            cli_path: "copilot".to_string(),
            extra_args: Vec::new(),
            cwd: None,
            log_level: "info".to_string(),
        }
    }
}

/// Answer given to `permission.request` calls from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionPolicy {
    /// Approve every tool permission the assistant asks for. The task
    /// prompts expect the assistant to write its report to disk.
    #[default]
    ApproveAll,
    DenyAll,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub transport: TransportConfig,
    pub request_timeout: Duration,
    pub permission_policy: PermissionPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            permission_policy: PermissionPolicy::default(),
        }
    }
}

// ─── Sessions ───────────────────────────────────────────────────────────

/// System message customization for a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SystemMessageConfig {
    /// Append `content` to the server's default system message.
    Append { content: String },
    /// Replace the server's system message entirely.
    Replace { content: String },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<SystemMessageConfig>,
    pub streaming: bool,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn with_system_message(mut self, system_message: SystemMessageConfig) -> Self {
        self.system_message = Some(system_message);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// When a message is delivered relative to an in-progress turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    Enqueue,
    Immediate,
}

/// A file or directory handed to the assistant by path. The client never
/// reads the contents itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Attachment {
    #[serde(rename_all = "camelCase")]
    File {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Directory {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
}

impl Attachment {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            display_name: None,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::File { path, .. } | Self::Directory { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOptions {
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SendMode>,
}

impl MessageOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: Vec::new(),
            mode: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_mode(mut self, mode: SendMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

// ─── Server responses ───────────────────────────────────────────────────

/// One entry of the server's model catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    #[serde(default)]
    pub message: String,
    /// Server time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub protocol_version: Option<u32>,
}

impl PingResponse {
    pub fn server_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp).single()
    }

    /// Server time as local `YYYY-MM-DD HH:MM:SS.mmm`.
    pub fn formatted_local_time(&self) -> String {
        self.server_time()
            .map(|t| t.format("%F %T%.3f").to_string())
            .unwrap_or_else(|| format!("<invalid timestamp {}>", self.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_wire_shape() {
        let config = SessionConfig::new("gpt-5")
            .with_system_message(SystemMessageConfig::Append {
                content: "You are a reviewer.".to_string(),
            })
            .with_streaming(true);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["model"], "gpt-5");
        assert_eq!(json["streaming"], true);
        assert_eq!(json["systemMessage"]["mode"], "append");
        assert_eq!(json["systemMessage"]["content"], "You are a reviewer.");
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_message_options_wire_shape() {
        let options = MessageOptions::new("compare these")
            .with_attachments(vec![Attachment::file("/specs/UART_latest.pdf")])
            .with_mode(SendMode::Immediate);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["prompt"], "compare these");
        assert_eq!(json["mode"], "immediate");
        assert_eq!(json["attachments"][0]["type"], "file");
        assert_eq!(json["attachments"][0]["path"], "/specs/UART_latest.pdf");
        assert!(json["attachments"][0].get("displayName").is_none());
        assert_eq!(
            options.attachments[0].path(),
            std::path::Path::new("/specs/UART_latest.pdf")
        );
    }

    #[test]
    fn test_ping_local_time() {
        let ping = PingResponse {
            message: "pong".to_string(),
            timestamp: 1_700_000_000_123,
            protocol_version: Some(PROTOCOL_VERSION),
        };
        let formatted = ping.formatted_local_time();
        assert!(formatted.ends_with(".123"), "{}", formatted);
        assert_eq!(formatted.len(), "2023-11-14 22:13:20.123".len());
    }

    #[test]
    fn test_connection_state_roundtrip_u8() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
