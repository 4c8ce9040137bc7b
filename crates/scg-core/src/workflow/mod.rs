//! Workflow layer — the fixed task table and the driver that runs one
//! task against the assistant.
//!
//! ```text
//! TaskRegistry (builtin + tasks dir) ──► WorkflowDriver.run(task, model, ...)
//!                                              │
//!                                        CopilotWrapper
//!                                              │
//!                                     copilot --server (JSON-RPC)
//! ```

pub mod driver;
pub mod prompts;
pub mod tasks;

pub use driver::WorkflowDriver;
pub use tasks::{builtin_tasks, TaskDefinition, TaskRegistry, BUILD_UVM_TB, DELTA_REPORT};
