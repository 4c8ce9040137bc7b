//! `scg run`, `scg delta-report`, `scg build-tb` — run one task end to end.

use std::path::PathBuf;
use std::sync::Arc;

use scg_core::copilot::Attachment;
use scg_core::wrapper::CopilotWrapper;
use scg_core::{ScgConfig, WorkflowDriver};

/// Run `task` and hand the wrapper back so the caller can stop it.
pub async fn run(
    wrapper: CopilotWrapper,
    config: &ScgConfig,
    task: &str,
    model: &str,
    streaming: bool,
    paths: Vec<PathBuf>,
) -> (CopilotWrapper, Result<(), String>) {
    let registry = match config.task_registry() {
        Ok(registry) => Arc::new(registry),
        Err(e) => return (wrapper, Err(e.to_string())),
    };
    let attachments = match to_attachments(paths) {
        Ok(attachments) => attachments,
        Err(e) => return (wrapper, Err(e)),
    };

    let span = wrapper.span().clone();
    let mut driver =
        WorkflowDriver::new(wrapper, registry, span).with_variables(config.prompt_variables());

    println!("Running {} with {}...", task, model);
    let result = match driver.run(task, model, streaming, attachments).await {
        Ok(Some(content)) => {
            println!("{}", content);
            Ok(())
        }
        Ok(None) => {
            // Streamed output ends without a newline.
            println!();
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    };
    (driver.into_wrapper(), result)
}

fn to_attachments(paths: Vec<PathBuf>) -> Result<Vec<Attachment>, String> {
    paths
        .into_iter()
        .map(|path| {
            if path.is_dir() {
                Ok(Attachment::Directory {
                    path,
                    display_name: None,
                })
            } else if path.is_file() {
                Ok(Attachment::file(path))
            } else {
                Err(format!("Attachment not found: {}", path.display()))
            }
        })
        .collect()
}
