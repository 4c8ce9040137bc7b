//! Session event handler: one arm per event kind.

use std::io::Write;
use std::sync::Arc;

use tracing::Span;

use super::completion::CompletionSignal;
use crate::copilot::SessionEvent;

/// Receives incremental message and reasoning text.
pub trait DeltaSink: Send + Sync {
    fn write_delta(&self, text: &str);
}

/// Writes deltas straight to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl DeltaSink for StdoutSink {
    fn write_delta(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Turns session events into output, logs and completion state. Invoked
/// on the transport reader task, so nothing in here blocks.
pub struct EventHandler {
    signal: CompletionSignal,
    sink: Arc<dyn DeltaSink>,
    span: Span,
}

impl EventHandler {
    pub fn new(signal: CompletionSignal, sink: Arc<dyn DeltaSink>, span: Span) -> Self {
        Self { signal, sink, span }
    }

    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }

    pub fn handle(&self, event: &SessionEvent) {
        let _entered = self.span.enter();
        match event {
            SessionEvent::MessageDelta(delta) | SessionEvent::ReasoningDelta(delta) => {
                self.sink.write_delta(&delta.delta_content);
            }
            SessionEvent::Message(message) => {
                if !message.content.is_empty() {
                    tracing::info!("{}", message.content);
                }
            }
            SessionEvent::Reasoning(reasoning) => {
                tracing::debug!("--- Reasoning ---");
                tracing::debug!("{}", reasoning.content);
            }
            SessionEvent::UsageInfo(info) => {
                tracing::debug!(
                    current_tokens = ?info.current_tokens,
                    token_limit = ?info.token_limit,
                    "Usage info"
                );
            }
            SessionEvent::ToolStart(tool) => {
                tracing::debug!("Tool name: {} with id={}", tool.tool_name, tool.tool_call_id);
            }
            SessionEvent::ToolComplete(tool) => {
                if let Some(result) = &tool.result {
                    tracing::debug!("Content: {}", result.content);
                    if let Some(detailed) = &result.detailed_content {
                        tracing::debug!("Detailed Content: {}", detailed);
                    }
                }
                if let Some(error) = &tool.error {
                    tracing::debug!("Message: {}", error.message);
                }
                tracing::debug!("Success: {} (id={})", tool.success, tool.tool_call_id);
            }
            SessionEvent::Usage(usage) => {
                tracing::debug!(
                    model = ?usage.model,
                    input_tokens = ?usage.input_tokens,
                    output_tokens = ?usage.output_tokens,
                    cache_read_tokens = ?usage.cache_read_tokens,
                    cache_write_tokens = ?usage.cache_write_tokens,
                    cost = ?usage.cost,
                    duration = ?usage.duration,
                    "Assistant usage"
                );
            }
            SessionEvent::Error(error) => {
                tracing::error!(
                    error_type = ?error.error_type,
                    "Session error: {}",
                    error.message
                );
                self.signal.fail(error.message.clone());
            }
            SessionEvent::Idle => {
                if !self.signal.set() {
                    tracing::debug!("Repeated session.idle ignored");
                }
            }
            SessionEvent::Unrecognized { event_type } => {
                tracing::debug!("Unhandled event type: {}", event_type);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::copilot::events::{DeltaData, SessionErrorData};
    use crate::wrapper::completion::CompletionState;
    use std::sync::Mutex;

    /// Collects deltas in memory.
    #[derive(Default)]
    pub(crate) struct RecordingSink(pub Mutex<Vec<String>>);

    impl DeltaSink for RecordingSink {
        fn write_delta(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn handler() -> (EventHandler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let handler = EventHandler::new(CompletionSignal::new(), sink.clone(), Span::none());
        (handler, sink)
    }

    fn delta(text: &str) -> DeltaData {
        DeltaData {
            message_id: None,
            delta_content: text.to_string(),
        }
    }

    #[test]
    fn test_deltas_go_to_sink_without_completing() {
        let (handler, sink) = handler();
        handler.handle(&SessionEvent::MessageDelta(delta("Hel")));
        handler.handle(&SessionEvent::ReasoningDelta(delta("thinking")));
        handler.handle(&SessionEvent::MessageDelta(delta("lo")));
        assert_eq!(*sink.0.lock().unwrap(), vec!["Hel", "thinking", "lo"]);
        assert_eq!(handler.signal().state(), CompletionState::Pending);
    }

    #[test]
    fn test_repeated_idle_is_noop() {
        let (handler, _) = handler();
        handler.handle(&SessionEvent::Idle);
        handler.handle(&SessionEvent::Idle);
        assert!(handler.signal().is_set());
    }

    #[test]
    fn test_error_fails_signal() {
        let (handler, _) = handler();
        handler.handle(&SessionEvent::Error(SessionErrorData {
            error_type: Some("rate_limit".to_string()),
            message: "quota exceeded".to_string(),
            stack: None,
        }));
        assert_eq!(
            handler.signal().state(),
            CompletionState::Failed("quota exceeded".to_string())
        );
    }

    #[test]
    fn test_unrecognized_is_ignored() {
        let (handler, sink) = handler();
        handler.handle(&SessionEvent::Unrecognized {
            event_type: "session.snapshot_rewind".to_string(),
        });
        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(handler.signal().state(), CompletionState::Pending);
    }
}
