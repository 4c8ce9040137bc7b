//! SCG CLI — runs specification analysis tasks through the Copilot CLI.
//!
//! All assistant work goes through scg-core; this binary only parses
//! arguments, sets up logging and always stops the client on the way out.

mod commands;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scg_core::copilot::PermissionPolicy;
use scg_core::wrapper::CopilotWrapper;
use scg_core::ScgConfig;

/// SCG — spec delta reports and UVM testbenches via GitHub Copilot
#[derive(Parser)]
#[command(name = "scg", version, about = "SCG — spec delta reports and UVM testbenches via GitHub Copilot")]
pub struct Cli {
    /// Project root (specs/, reports/ and scg.log default to it)
    #[arg(long, env = "SCG_PROJECT_ROOT", global = true)]
    project_root: Option<PathBuf>,

    /// Path to the Copilot CLI executable
    #[arg(long, env = "COPILOT_CLI_PATH", global = true)]
    cli_path: Option<String>,

    /// Connect to a running Copilot server instead of spawning one (host:port)
    #[arg(long, env = "COPILOT_CLI_URL", global = true)]
    cli_url: Option<String>,

    /// Directory of YAML task definitions overriding the builtin tasks
    #[arg(long, env = "SCG_TASKS_DIR", global = true)]
    tasks_dir: Option<PathBuf>,

    /// Debug log file
    #[arg(long, env = "SCG_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Give up on a streaming run after this many seconds
    #[arg(long, env = "SCG_STREAM_DEADLINE_SECS", global = true)]
    stream_deadline: Option<u64>,

    /// Refuse every tool permission the assistant asks for
    #[arg(long, global = true)]
    deny_permissions: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Copilot server answers
    Ping {
        /// Payload echoed back by the server
        #[arg(default_value = "Hello")]
        message: String,
    },

    /// List the models available to this account
    Models {
        /// Print the raw JSON catalog
        #[arg(long)]
        json: bool,
    },

    /// Show the client connection state
    State,

    /// List the available tasks
    Tasks,

    /// Run a task by name
    Run {
        /// Task name (see `scg tasks`)
        task: String,
        /// Model ID (see `scg models`)
        #[arg(long)]
        model: String,
        /// Stream the answer as it is produced
        #[arg(long)]
        streaming: bool,
        /// Files or directories to attach
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },

    /// Compare the latest specification against the current one
    DeltaReport {
        #[arg(long, default_value = "gpt-5.2-Codex")]
        model: String,
        #[arg(long)]
        streaming: bool,
        /// Latest specification (default: <specs>/UART_latest.pdf)
        #[arg(long)]
        latest: Option<PathBuf>,
        /// Previous specification (default: <specs>/UART_current.pdf)
        #[arg(long)]
        current: Option<PathBuf>,
    },

    /// Build a UVM testbench from a specification
    BuildTb {
        #[arg(long, default_value = "claude-sonnet-4.6")]
        model: String,
        #[arg(long)]
        streaming: bool,
        /// Specification (default: <specs>/UART_latest.pdf)
        #[arg(long)]
        spec: Option<PathBuf>,
    },
}

impl Cli {
    fn apply(&self, config: &mut ScgConfig) {
        if let Some(root) = &self.project_root {
            // Only paths still derived from the old root follow the new one.
            let old = config.project_root.clone();
            if config.specs_dir == old.join("specs") {
                config.specs_dir = root.join("specs");
            }
            if config.reports_dir == old.join("reports") {
                config.reports_dir = root.join("reports");
            }
            if config.log_file == old.join("scg.log") {
                config.log_file = root.join("scg.log");
            }
            config.project_root = root.clone();
        }
        if let Some(path) = &self.cli_path {
            config.cli_path = path.clone();
        }
        if let Some(url) = &self.cli_url {
            config.cli_url = Some(url.clone());
        }
        if let Some(dir) = &self.tasks_dir {
            config.tasks_dir = Some(dir.clone());
        }
        if let Some(file) = &self.log_file {
            config.log_file = file.clone();
        }
        if let Some(secs) = self.stream_deadline {
            config.stream_deadline = Some(Duration::from_secs(secs));
        }
        if self.deny_permissions {
            config.permission_policy = PermissionPolicy::DenyAll;
        }
    }
}

#[tokio::main]
async fn main() {
    // Before parsing, so `.env` values act as argument fallbacks.
    ScgConfig::load_dotenv();
    let cli = Cli::parse();

    let mut config = match ScgConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);
    logging::init(&config.log_file);

    let result = match cli.command {
        Some(command) => execute(command, &config).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn execute(command: Commands, config: &ScgConfig) -> Result<(), String> {
    if let Commands::Tasks = command {
        return commands::tasks::list(config);
    }

    let mut wrapper = commands::new_wrapper(config);
    let (mut wrapper, result) = match wrapper.start().await {
        Ok(()) => dispatch(command, wrapper, config).await,
        Err(e) => (wrapper, Err(e.to_string())),
    };

    if let Err(e) = wrapper.stop().await {
        tracing::warn!("[CLI] Client did not stop cleanly: {}", e);
    }
    result
}

async fn dispatch(
    command: Commands,
    wrapper: CopilotWrapper,
    config: &ScgConfig,
) -> (CopilotWrapper, Result<(), String>) {
    match command {
        Commands::Ping { message } => {
            let result = commands::client::ping(&wrapper, &message).await;
            (wrapper, result)
        }
        Commands::Models { json } => {
            let result = commands::client::models(&wrapper, json).await;
            (wrapper, result)
        }
        Commands::State => {
            let result = commands::client::state(&wrapper);
            (wrapper, result)
        }
        Commands::Tasks => {
            let result = commands::tasks::list(config);
            (wrapper, result)
        }
        Commands::Run {
            task,
            model,
            streaming,
            attachments,
        } => commands::run::run(wrapper, config, &task, &model, streaming, attachments).await,
        Commands::DeltaReport {
            model,
            streaming,
            latest,
            current,
        } => {
            let attachments = vec![
                latest.unwrap_or_else(|| config.latest_spec()),
                current.unwrap_or_else(|| config.current_spec()),
            ];
            commands::run::run(
                wrapper,
                config,
                scg_core::workflow::DELTA_REPORT,
                &model,
                streaming,
                attachments,
            )
            .await
        }
        Commands::BuildTb {
            model,
            streaming,
            spec,
        } => {
            let attachments = vec![spec.unwrap_or_else(|| config.latest_spec())];
            commands::run::run(
                wrapper,
                config,
                scg_core::workflow::BUILD_UVM_TB,
                &model,
                streaming,
                attachments,
            )
            .await
        }
    }
}
