//! Tracing setup: `RUST_LOG`-filtered output on stdout plus a debug log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "scg_core=info,scg_cli=info";
const FILE_FILTER: &str = "scg_core=debug,scg_cli=debug";

/// Install the global subscriber. When the log file cannot be opened only
/// the stdout layer is installed and a warning is logged.
pub fn init(log_file: &Path) {
    let stdout_layer = fmt::layer().with_target(false).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );

    let (file_layer, open_error) = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => {
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(e) = open_error {
        tracing::warn!("[Logging] Cannot open log file '{}': {}", log_file.display(), e);
    }
}
