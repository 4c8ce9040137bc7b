//! A single conversation on the Copilot server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::events::{AssistantMessageData, SessionEvent};
use super::jsonrpc::RpcConnection;
use super::types::MessageOptions;
use crate::error::{Result, ScgError};

/// Handle returned by [`CopilotSession::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
pub struct CopilotSession {
    session_id: String,
    workspace_path: Option<String>,
    connection: Arc<RpcConnection>,
}

impl std::fmt::Debug for CopilotSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopilotSession")
            .field("session_id", &self.session_id)
            .field("workspace_path", &self.workspace_path)
            .finish()
    }
}

impl CopilotSession {
    pub(crate) fn new(
        session_id: String,
        workspace_path: Option<String>,
        connection: Arc<RpcConnection>,
    ) -> Self {
        Self {
            session_id,
            workspace_path,
            connection,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Server-side workspace directory of this session, if it reported one.
    pub fn workspace_path(&self) -> Option<&str> {
        self.workspace_path.as_deref()
    }

    /// Register `callback` for every event of this session. The callback
    /// runs on the connection's reader task.
    pub async fn on<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self
            .connection
            .router()
            .subscribe(&self.session_id, Arc::new(callback))
            .await;
        SubscriptionId(id)
    }

    pub async fn off(&self, subscription: SubscriptionId) {
        self.connection
            .router()
            .unsubscribe(&self.session_id, subscription.0)
            .await;
    }

    /// Dispatch a message. Returns the server's message id; the response
    /// arrives later as events.
    pub async fn send(&self, options: &MessageOptions) -> Result<String> {
        let mut params = serde_json::to_value(options)
            .map_err(|e| ScgError::Protocol(format!("failed to encode message options: {}", e)))?;
        params["sessionId"] = serde_json::Value::String(self.session_id.clone());

        let result = self.connection.request("session.send", params).await?;
        Ok(result
            .get("messageId")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Dispatch a message and wait for the turn to end.
    ///
    /// Returns the last `assistant.message` of the turn (if any) once
    /// `session.idle` arrives. A `session.error` fails with
    /// [`ScgError::Session`]; no terminal event within `timeout` fails with
    /// [`ScgError::Timeout`].
    pub async fn send_and_wait(
        &self,
        options: &MessageOptions,
        timeout: Duration,
    ) -> Result<Option<AssistantMessageData>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let subscription = self
            .on(move |event| {
                if event.is_terminal() || matches!(event, SessionEvent::Message(_)) {
                    let _ = tx.send(event.clone());
                }
            })
            .await;

        let result = async {
            self.send(options).await?;

            let turn = async {
                let mut last_message = None;
                while let Some(event) = rx.recv().await {
                    match event {
                        SessionEvent::Message(data) => last_message = Some(data),
                        SessionEvent::Idle => return Ok(last_message),
                        SessionEvent::Error(data) => return Err(ScgError::Session(data.message)),
                        _ => {}
                    }
                }
                Err(ScgError::Connection("session event stream ended".to_string()))
            };

            tokio::select! {
                outcome = tokio::time::timeout(timeout, turn) => {
                    outcome.unwrap_or_else(|_| Err(ScgError::timeout("session.idle", timeout)))
                }
                _ = self.connection.closed() => Err(ScgError::Connection(
                    "connection closed while waiting for session.idle".to_string(),
                )),
            }
        }
        .await;

        self.off(subscription).await;
        result
    }

    /// Destroy the session on the server. Local callbacks are dropped even
    /// when the server call fails.
    pub async fn destroy(&self) -> Result<()> {
        let result = self
            .connection
            .request(
                "session.destroy",
                serde_json::json!({ "sessionId": self.session_id }),
            )
            .await;
        self.connection.router().remove_session(&self.session_id).await;
        result.map(|_| ())
    }
}
