//! Copilot CLI server client.
//!
//! Talks JSON-RPC to `copilot --server`, either over the stdio of a child
//! process or over TCP to a server that is already running.
//!
//! Lifecycle:
//!   1. `start()`          — open the transport, ping, verify protocol version
//!   2. `create_session()` — `session.create`, returns a [`CopilotSession`]
//!   3. session `send*()`  — `session.send`, events arrive via `session.event`
//!   4. session `destroy()`
//!   5. `stop()`           — destroy leftover sessions, close, kill the child

pub mod events;
pub(crate) mod jsonrpc;
pub mod session;
pub mod types;

pub use events::SessionEvent;
pub use jsonrpc::EventCallback;
pub use session::{CopilotSession, SubscriptionId};
pub use types::{
    Attachment, ClientOptions, ConnectionState, MessageOptions, ModelInfo, PermissionPolicy,
    PingResponse, SendMode, SessionConfig, SystemMessageConfig, TransportConfig,
    PROTOCOL_VERSION,
};

use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;

use crate::error::{Result, ScgError};
use jsonrpc::{BoxedReader, BoxedWriter, RpcConnection};
use types::ModelList;

pub struct CopilotClient {
    options: ClientOptions,
    state: Arc<AtomicU8>,
    connection: Option<Arc<RpcConnection>>,
    child: Option<Child>,
    stderr_handle: Option<tokio::task::JoinHandle<()>>,
    /// Streams supplied by the caller instead of a spawned process or socket.
    provided_streams: Option<(BoxedReader, BoxedWriter)>,
}

impl CopilotClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.as_u8())),
            connection: None,
            child: None,
            stderr_handle: None,
            provided_streams: None,
        }
    }

    /// Use an already-connected byte stream pair as the transport, e.g. an
    /// in-process server or a pipe set up by the caller. The transport
    /// settings in `options` are ignored.
    pub fn from_streams<R, W>(reader: R, writer: W, options: ClientOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut client = Self::new(options);
        client.provided_streams = Some((Box::new(reader), Box::new(writer)));
        client
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn connection(&self) -> Result<&Arc<RpcConnection>> {
        self.connection
            .as_ref()
            .ok_or_else(|| ScgError::Connection("client is not started".to_string()))
    }

    /// Open the transport and verify the server speaks [`PROTOCOL_VERSION`].
    pub async fn start(&mut self) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            tracing::debug!("[CopilotClient] Already connected");
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting);

        let (reader, writer) = match self.open_transport().await {
            Ok(streams) => streams,
            Err(e) => {
                self.set_state(ConnectionState::Error);
                return Err(e);
            }
        };

        let connection = Arc::new(RpcConnection::start(
            reader,
            writer,
            self.state.clone(),
            self.options.permission_policy,
            self.options.request_timeout,
        ));
        self.connection = Some(connection.clone());

        if let Err(e) = self.verify_protocol_version().await {
            connection.shutdown().await;
            self.connection = None;
            self.kill_child().await;
            self.set_state(ConnectionState::Error);
            return Err(e);
        }

        self.set_state(ConnectionState::Connected);
        tracing::info!("[CopilotClient] Connected");
        Ok(())
    }

    async fn open_transport(&mut self) -> Result<(BoxedReader, BoxedWriter)> {
        if let Some(streams) = self.provided_streams.take() {
            return Ok(streams);
        }

        match self.options.transport.clone() {
            TransportConfig::Stdio {
                cli_path,
                extra_args,
                cwd,
                log_level,
            } => {
                let mut args = vec![
                    "--server".to_string(),
                    "--log-level".to_string(),
                    log_level,
                    "--stdio".to_string(),
                ];
                args.extend(extra_args);
                tracing::info!("[CopilotClient] Spawning: {} {}", cli_path, args.join(" "));

                let mut command = tokio::process::Command::new(&cli_path);
                command
                    .args(&args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                if let Some(dir) = cwd {
                    command.current_dir(dir);
                }

                let mut child = command.spawn().map_err(|e| {
                    ScgError::Connection(format!(
                        "failed to spawn '{}': {}. Is the Copilot CLI installed and in PATH?",
                        cli_path, e
                    ))
                })?;

                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| ScgError::Connection("no stdin on child process".to_string()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| ScgError::Connection("no stdout on child process".to_string()))?;

                if let Some(stderr) = child.stderr.take() {
                    self.stderr_handle = Some(tokio::spawn(async move {
                        let mut lines = BufReader::new(stderr).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if !line.trim().is_empty() {
                                tracing::debug!("[CopilotClient stderr] {}", line);
                            }
                        }
                    }));
                }

                self.child = Some(child);
                Ok((Box::new(stdout), Box::new(stdin)))
            }
            TransportConfig::Tcp { url } => {
                let address = normalize_server_address(&url);
                tracing::info!("[CopilotClient] Connecting to {}", address);
                let stream = tokio::net::TcpStream::connect(&address).await.map_err(|e| {
                    ScgError::Connection(format!("failed to connect to {}: {}", address, e))
                })?;
                let (read_half, write_half) = stream.into_split();
                Ok((Box::new(read_half), Box::new(write_half)))
            }
        }
    }

    async fn verify_protocol_version(&self) -> Result<()> {
        let ping = self.ping("protocol check").await?;
        match ping.protocol_version {
            Some(PROTOCOL_VERSION) => Ok(()),
            Some(other) => Err(ScgError::Connection(format!(
                "protocol version mismatch: client expects {}, server reports {}",
                PROTOCOL_VERSION, other
            ))),
            None => Err(ScgError::Connection(format!(
                "protocol version mismatch: client expects {}, server reports none",
                PROTOCOL_VERSION
            ))),
        }
    }

    pub async fn ping(&self, message: &str) -> Result<PingResponse> {
        let result = self
            .connection()?
            .request("ping", serde_json::json!({ "message": message }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| ScgError::Protocol(format!("invalid ping response: {}", e)))
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let result = self
            .connection()?
            .request("models.list", serde_json::json!({}))
            .await?;
        let list: ModelList = serde_json::from_value(result)
            .map_err(|e| ScgError::Protocol(format!("invalid models.list response: {}", e)))?;
        Ok(list.models)
    }

    pub async fn create_session(&self, config: &SessionConfig) -> Result<CopilotSession> {
        let connection = self.connection()?;
        let params = serde_json::to_value(config)
            .map_err(|e| ScgError::Protocol(format!("failed to encode session config: {}", e)))?;
        let result = connection.request("session.create", params).await?;

        let session_id = result
            .get("sessionId")
            .and_then(|s| s.as_str())
            .ok_or_else(|| ScgError::Protocol("no sessionId in session.create response".to_string()))?
            .to_string();
        let workspace_path = result
            .get("workspacePath")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string());

        connection.router().register_session(&session_id).await;
        tracing::info!("[CopilotClient] Session created: {}", session_id);
        Ok(CopilotSession::new(session_id, workspace_path, connection.clone()))
    }

    /// Resolves when the transport closes. Returns immediately when the
    /// client was never started.
    pub async fn closed(&self) {
        if let Some(connection) = &self.connection {
            connection.closed().await;
        }
    }

    /// Destroy every session still open on this client, close the
    /// transport and kill the child process. Every step is attempted; the
    /// first failure is returned.
    pub async fn stop(&mut self) -> Result<()> {
        let mut first_error: Option<ScgError> = None;

        if let Some(connection) = self.connection.take() {
            for session_id in connection.router().session_ids().await {
                let session = CopilotSession::new(session_id.clone(), None, connection.clone());
                if let Err(e) = session.destroy().await {
                    tracing::error!("[CopilotClient] Failed to destroy session {}: {}", session_id, e);
                    first_error.get_or_insert(e);
                }
            }
            self.set_state(ConnectionState::Disconnected);
            connection.shutdown().await;
        }

        self.kill_child().await;
        if let Some(handle) = self.stderr_handle.take() {
            handle.abort();
        }
        self.set_state(ConnectionState::Disconnected);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::info!("[CopilotClient] Killing server process");
            if let Err(e) = child.kill().await {
                tracing::warn!("[CopilotClient] Failed to kill server process: {}", e);
            }
        }
    }
}

/// Accepts `host:port`, a bare port, or an `http(s)://` URL.
fn normalize_server_address(url: &str) -> String {
    let trimmed = url
        .trim()
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/');
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("localhost:{}", trimmed)
    } else {
        trimmed.to_string()
    }
}
