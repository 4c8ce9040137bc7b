//! Session events pushed by the server through `session.event` notifications.
//!
//! The wire envelope is `{ "type": "<kind>", "data": { ... } }`. Kinds this
//! client does not know about are kept as [`SessionEvent::Unrecognized`]
//! instead of failing the parse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScgError};

pub const ASSISTANT_MESSAGE_DELTA: &str = "assistant.message_delta";
pub const ASSISTANT_REASONING_DELTA: &str = "assistant.reasoning_delta";
pub const ASSISTANT_MESSAGE: &str = "assistant.message";
pub const ASSISTANT_REASONING: &str = "assistant.reasoning";
pub const ASSISTANT_USAGE: &str = "assistant.usage";
pub const SESSION_USAGE_INFO: &str = "session.usage_info";
pub const SESSION_ERROR: &str = "session.error";
pub const SESSION_IDLE: &str = "session.idle";
pub const TOOL_EXECUTION_START: &str = "tool.execution_start";
pub const TOOL_EXECUTION_COMPLETE: &str = "tool.execution_complete";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MessageDelta(DeltaData),
    ReasoningDelta(DeltaData),
    Message(AssistantMessageData),
    Reasoning(AssistantReasoningData),
    UsageInfo(UsageInfoData),
    ToolStart(ToolStartData),
    ToolComplete(ToolCompleteData),
    Usage(AssistantUsageData),
    Error(SessionErrorData),
    Idle,
    Unrecognized { event_type: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaData {
    #[serde(default, alias = "reasoningId")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub delta_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessageData {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_requests: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReasoningData {
    #[serde(default)]
    pub reasoning_id: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfoData {
    #[serde(default)]
    pub current_tokens: Option<f64>,
    #[serde(default)]
    pub token_limit: Option<f64>,
    #[serde(default)]
    pub messages_length: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStartData {
    #[serde(default)]
    pub tool_call_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub detailed_content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCompleteData {
    #[serde(default)]
    pub tool_call_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<ToolResult>,
    #[serde(default)]
    pub error: Option<ToolError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantUsageData {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<f64>,
    #[serde(default)]
    pub output_tokens: Option<f64>,
    #[serde(default)]
    pub cache_read_tokens: Option<f64>,
    #[serde(default)]
    pub cache_write_tokens: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionErrorData {
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

impl SessionErrorData {
    /// Never fails: a `session.error` must always end the turn, so fields
    /// of an unexpected shape fall back to the raw payload.
    pub fn from_data(data: &serde_json::Value) -> Self {
        let text = |key: &str| data.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let message = text("message")
            .or_else(|| data.as_str().map(str::to_string))
            .unwrap_or_else(|| {
                if data.is_null() {
                    "unknown session error".to_string()
                } else {
                    data.to_string()
                }
            });
        Self {
            error_type: text("errorType"),
            message,
            stack: text("stack"),
        }
    }
}

impl SessionEvent {
    /// Parse a wire event (`{ "type": ..., "data": ... }`).
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let event_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ScgError::Protocol("session event without a type".to_string()))?;
        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);

        let event = match event_type {
            ASSISTANT_MESSAGE_DELTA => Self::MessageDelta(parse_data(event_type, data)?),
            ASSISTANT_REASONING_DELTA => Self::ReasoningDelta(parse_data(event_type, data)?),
            ASSISTANT_MESSAGE => Self::Message(parse_data(event_type, data)?),
            ASSISTANT_REASONING => Self::Reasoning(parse_data(event_type, data)?),
            SESSION_USAGE_INFO => Self::UsageInfo(parse_data(event_type, data)?),
            TOOL_EXECUTION_START => Self::ToolStart(parse_data(event_type, data)?),
            TOOL_EXECUTION_COMPLETE => Self::ToolComplete(parse_data(event_type, data)?),
            ASSISTANT_USAGE => Self::Usage(parse_data(event_type, data)?),
            SESSION_ERROR => Self::Error(SessionErrorData::from_data(&data)),
            SESSION_IDLE => Self::Idle,
            other => Self::Unrecognized {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }

    /// The wire name of this event kind.
    pub fn event_type(&self) -> &str {
        match self {
            Self::MessageDelta(_) => ASSISTANT_MESSAGE_DELTA,
            Self::ReasoningDelta(_) => ASSISTANT_REASONING_DELTA,
            Self::Message(_) => ASSISTANT_MESSAGE,
            Self::Reasoning(_) => ASSISTANT_REASONING,
            Self::UsageInfo(_) => SESSION_USAGE_INFO,
            Self::ToolStart(_) => TOOL_EXECUTION_START,
            Self::ToolComplete(_) => TOOL_EXECUTION_COMPLETE,
            Self::Usage(_) => ASSISTANT_USAGE,
            Self::Error(_) => SESSION_ERROR,
            Self::Idle => SESSION_IDLE,
            Self::Unrecognized { event_type } => event_type,
        }
    }

    /// Idle and error end a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Error(_))
    }
}

fn parse_data<T: DeserializeOwned + Default>(event_type: &str, data: serde_json::Value) -> Result<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data)
        .map_err(|e| ScgError::Protocol(format!("invalid '{}' event data: {}", event_type, e)))
}
