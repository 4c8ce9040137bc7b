//! CLI command implementations.
//!
//! Each submodule backs one or more top-level commands and goes through
//! the scg-core wrapper; the caller owns starting and stopping it.

pub mod client;
pub mod run;
pub mod tasks;

use scg_core::copilot::CopilotClient;
use scg_core::wrapper::CopilotWrapper;
use scg_core::ScgConfig;

/// Build a (not yet started) wrapper for the configured transport.
pub fn new_wrapper(config: &ScgConfig) -> CopilotWrapper {
    let client = CopilotClient::new(config.client_options());
    let transport = if config.cli_url.is_some() { "tcp" } else { "stdio" };
    let span = tracing::info_span!("scg", transport);
    CopilotWrapper::new(client, span).with_stream_deadline(config.stream_deadline)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
