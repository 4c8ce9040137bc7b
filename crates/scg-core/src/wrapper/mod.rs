//! Client wrapper — one Copilot connection, at most one live session.
//!
//! The wrapper logs every operation through its own span, propagates every
//! failure unchanged, and turns the session event stream into a
//! [`CompletionSignal`] the streaming send path waits on.

pub mod completion;
pub mod handler;

pub use completion::{CompletionSignal, CompletionState};
pub use handler::{DeltaSink, EventHandler, StdoutSink};

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, Span};

use crate::copilot::{
    ConnectionState, CopilotClient, CopilotSession, MessageOptions, ModelInfo, PingResponse,
    SessionConfig, SubscriptionId,
};
use crate::error::{Result, ScgError};

struct ActiveSession {
    session: CopilotSession,
    subscription: SubscriptionId,
}

pub struct CopilotWrapper {
    client: CopilotClient,
    session: Option<ActiveSession>,
    /// Signal of the most recent session; kept after destroy for inspection.
    completion: Option<CompletionSignal>,
    sink: Arc<dyn DeltaSink>,
    stream_deadline: Option<Duration>,
    span: Span,
}

impl CopilotWrapper {
    pub fn new(client: CopilotClient, span: Span) -> Self {
        Self {
            client,
            session: None,
            completion: None,
            sink: Arc::new(StdoutSink),
            stream_deadline: None,
            span,
        }
    }

    /// Where message and reasoning deltas are written (stdout by default).
    pub fn with_sink(mut self, sink: Arc<dyn DeltaSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Upper bound for a streaming send. Without one, a streaming send
    /// waits until the server reports idle or error, or the connection drops.
    pub fn with_stream_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.stream_deadline = deadline;
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn client(&self) -> &CopilotClient {
        &self.client
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session.session_id())
    }

    /// Completion signal of the current (or last destroyed) session.
    pub fn completion(&self) -> Option<&CompletionSignal> {
        self.completion.as_ref()
    }

    pub async fn start(&mut self) -> Result<()> {
        let span = self.span.clone();
        async {
            match self.client.start().await {
                Ok(()) => {
                    tracing::info!("Client started");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("Error: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        async {
            match self.client.list_models().await {
                Ok(models) => {
                    tracing::debug!(
                        "List models: {}",
                        models.iter().map(|m| m.id.as_str()).collect::<Vec<_>>().join(", ")
                    );
                    Ok(models)
                }
                Err(e) => {
                    tracing::error!("Error: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn ping(&self, payload: &str) -> Result<PingResponse> {
        async {
            match self.client.ping(payload).await {
                Ok(response) => {
                    tracing::info!("Server responded at {}", response.formatted_local_time());
                    Ok(response)
                }
                Err(e) => {
                    tracing::error!("Error pinging server: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    pub fn check_connection(&self) -> ConnectionState {
        let state = self.client.state();
        self.span.in_scope(|| tracing::info!("Client state is {}", state));
        state
    }

    /// Open the wrapper's single session and attach the event handler.
    pub async fn create_session(&mut self, config: SessionConfig) -> Result<()> {
        let span = self.span.clone();
        async {
            if let Some(active) = &self.session {
                let e = ScgError::Session(format!(
                    "session {} is still open; destroy it first",
                    active.session.session_id()
                ));
                tracing::error!("Error: {}", e);
                return Err(e);
            }

            let session = match self.client.create_session(&config).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!("Error: {}", e);
                    return Err(e);
                }
            };

            let signal = CompletionSignal::new();
            let handler = EventHandler::new(signal.clone(), self.sink.clone(), self.span.clone());
            let subscription = session.on(move |event| handler.handle(event)).await;

            tracing::debug!(
                session_id = session.session_id(),
                model = ?config.model,
                streaming = config.streaming,
                "Session created"
            );
            self.completion = Some(signal);
            self.session = Some(ActiveSession {
                session,
                subscription,
            });
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Send one message on the open session.
    ///
    /// Streaming: returns `Ok(None)` once the completion signal is set; the
    /// content went through the delta sink. Non-streaming: returns the
    /// final message content, or fails with a timeout after `timeout`.
    pub async fn send(
        &self,
        options: MessageOptions,
        streaming: bool,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let result = async {
            let active = self
                .session
                .as_ref()
                .ok_or_else(|| ScgError::Session("no open session; call create_session first".to_string()))?;

            if streaming {
                let signal = self
                    .completion
                    .as_ref()
                    .ok_or_else(|| ScgError::Session("session has no completion signal".to_string()))?;
                active.session.send(&options).await?;
                self.wait_for_completion(signal).await?;
                Ok(None)
            } else {
                let message = active.session.send_and_wait(&options, timeout).await?;
                Ok(message.map(|m| m.content))
            }
        }
        .instrument(self.span.clone())
        .await;

        if let Err(e) = &result {
            self.span.in_scope(|| tracing::error!("Error: {}", e));
        }
        result
    }

    async fn wait_for_completion(&self, signal: &CompletionSignal) -> Result<()> {
        let idle = async {
            match self.stream_deadline {
                Some(deadline) => tokio::time::timeout(deadline, signal.wait())
                    .await
                    .unwrap_or_else(|_| Err(ScgError::timeout("session.idle", deadline))),
                None => signal.wait().await,
            }
        };
        tokio::select! {
            outcome = idle => outcome,
            _ = self.client.closed() => {
                // An idle that raced the close still counts.
                match signal.state() {
                    CompletionState::Idle => Ok(()),
                    CompletionState::Failed(message) => Err(ScgError::Session(message)),
                    CompletionState::Pending => Err(ScgError::Connection(
                        "connection closed while waiting for session.idle".to_string(),
                    )),
                }
            }
        }
    }

    /// Release the open session. Does nothing when there is none, so it is
    /// safe after a failed `create_session`.
    pub async fn destroy_session(&mut self) -> Result<()> {
        let span = self.span.clone();
        async {
            let Some(active) = self.session.take() else {
                tracing::debug!("No session to destroy");
                return Ok(());
            };
            tracing::debug!("Destroying session...");
            active.session.off(active.subscription).await;
            match active.session.destroy().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::error!("Error: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn stop(&mut self) -> Result<()> {
        let span = self.span.clone();
        async {
            tracing::debug!("Stopping client...");
            self.session = None;
            match self.client.stop().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::error!("Error: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
