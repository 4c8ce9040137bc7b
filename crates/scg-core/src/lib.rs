//! SCG core — drives specification analysis tasks through the Copilot CLI.
//!
//! - [`copilot`] — JSON-RPC client for `copilot --server` (sessions, events)
//! - [`wrapper`] — single-session wrapper with event handling and completion
//! - [`workflow`] — task table and the driver that runs one task end to end
//! - [`config`] — environment-driven settings (paths, CLI location)

pub mod config;
pub mod copilot;
pub mod error;
pub mod workflow;
pub mod wrapper;

// Convenience re-exports
pub use config::ScgConfig;
pub use error::{Result, ScgError};
pub use workflow::{TaskDefinition, TaskRegistry, WorkflowDriver};
pub use wrapper::{CompletionSignal, CopilotWrapper};
