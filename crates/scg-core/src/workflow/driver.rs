//! Workflow driver — runs one named task end to end:
//! create session → send → await result → destroy session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{Instrument, Span};

use super::tasks::TaskRegistry;
use crate::copilot::{Attachment, MessageOptions, SendMode, SessionConfig, SystemMessageConfig};
use crate::error::{Result, ScgError};
use crate::wrapper::CopilotWrapper;

pub struct WorkflowDriver {
    wrapper: CopilotWrapper,
    tasks: Arc<TaskRegistry>,
    /// Values for `${name}` placeholders in prompt templates.
    variables: HashMap<String, String>,
    span: Span,
}

impl WorkflowDriver {
    pub fn new(wrapper: CopilotWrapper, tasks: Arc<TaskRegistry>, span: Span) -> Self {
        Self {
            wrapper,
            tasks,
            variables: HashMap::new(),
            span,
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn wrapper(&self) -> &CopilotWrapper {
        &self.wrapper
    }

    pub fn wrapper_mut(&mut self) -> &mut CopilotWrapper {
        &mut self.wrapper
    }

    pub fn into_wrapper(self) -> CopilotWrapper {
        self.wrapper
    }

    /// Run `task_name` against `model`.
    ///
    /// Returns the final message content for a non-streaming run and
    /// `None` for a streaming one. The session is destroyed on every path
    /// once it may exist; a destroy failure is logged and does not replace
    /// the run's own outcome.
    pub async fn run(
        &mut self,
        task_name: &str,
        model: &str,
        streaming: bool,
        attachments: Vec<Attachment>,
    ) -> Result<Option<String>> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            parent: &self.span,
            "run",
            task = task_name,
            model,
            streaming,
            %run_id
        );

        async {
            let Some(task) = self.tasks.get(task_name).cloned() else {
                let e = ScgError::NotFound(format!(
                    "task '{}'. Available: {}",
                    task_name,
                    self.tasks.names().collect::<Vec<_>>().join(", ")
                ));
                tracing::error!("Error: {}", e);
                return Err(e);
            };

            let config = SessionConfig::new(model)
                .with_system_message(SystemMessageConfig::Append {
                    content: task.system_preamble.clone(),
                })
                .with_streaming(streaming);
            let options = MessageOptions::new(task.render_prompt(&self.variables))
                .with_attachments(attachments)
                .with_mode(SendMode::Immediate);

            tracing::info!(
                "Running task {} ({} attachment(s), timeout {}s)",
                task.name,
                options.attachments.len(),
                task.default_timeout_secs
            );
            for attachment in &options.attachments {
                tracing::debug!("Attachment: {}", attachment.path().display());
            }

            let outcome = async {
                self.wrapper.create_session(config).await?;
                self.wrapper
                    .send(options, streaming, task.default_timeout())
                    .await
            }
            .await;

            if let Err(e) = self.wrapper.destroy_session().await {
                tracing::error!("Failed to destroy session: {}", e);
            }

            match &outcome {
                Ok(_) => tracing::info!("Task {} completed", task.name),
                Err(e) => tracing::error!("Error: {}", e),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}
