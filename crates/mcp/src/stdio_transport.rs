//! Stdio transport: spawn a child process and exchange newline-delimited
//! JSON-RPC over its stdin/stdout.

use std::{process::Stdio, time::Duration};

use {
    relay_config::StdioServerConfig,
    serde_json::Value,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
        sync::{Mutex, oneshot, watch},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    error::{Context, Error, Result},
    message::{MessageFactory, OutgoingMessage},
    pending::{PendingRequests, await_settlement},
    transport::DEFAULT_REQUEST_TIMEOUT,
    types::JsonRpcResponse,
};

/// How long a freshly spawned server must stay up before `connect` succeeds.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(100);

/// After stdout closes, how long to wait for the exit status before failing
/// outstanding requests without one.
const EXIT_STATUS_WAIT: Duration = Duration::from_millis(250);

/// After the child exits, how long to keep reading output it had already
/// written before failing outstanding requests.
const EXIT_DRAIN: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitState {
    Running,
    Exited(Option<i32>),
}

impl ExitState {
    fn has_exited(&self) -> bool {
        matches!(self, Self::Exited(_))
    }

    fn code(&self) -> Option<i32> {
        match self {
            Self::Running => None,
            Self::Exited(code) => *code,
        }
    }
}

struct Connection {
    kill_tx: oneshot::Sender<()>,
    exit_rx: watch::Receiver<ExitState>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

enum ConnectionState {
    Unconnected,
    Connected(Connection),
    Closed,
}

/// What a single stdout line turned out to be.
#[derive(Debug)]
pub(crate) enum InboundLine {
    Blank,
    /// Banners, progress output and other non-JSON noise.
    NotJson,
    /// A request or notification initiated by the server.
    ServerMessage { method: String },
    Response(JsonRpcResponse),
    /// Valid JSON that is neither a message nor a response we can correlate.
    Unrecognized,
}

pub(crate) fn classify_line(line: &str) -> InboundLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InboundLine::Blank;
    }
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return InboundLine::NotJson;
    };
    if let Some(method) = value.get("method").and_then(Value::as_str) {
        return InboundLine::ServerMessage {
            method: method.to_string(),
        };
    }
    match JsonRpcResponse::lenient(value) {
        Some(resp) if resp.numeric_id().is_some() => InboundLine::Response(resp),
        _ => InboundLine::Unrecognized,
    }
}

/// Stdio-based transport for an MCP server process.
///
/// `Unconnected -> Connected -> Closed`. Requests may be outstanding
/// concurrently; responses are matched to callers by id, not arrival order.
pub struct StdioTransport {
    config: StdioServerConfig,
    ids: MessageFactory,
    pending: PendingRequests,
    request_timeout: Duration,
    startup_grace: Duration,
    state: Mutex<ConnectionState>,
    stdin: Mutex<Option<ChildStdin>>,
}

impl StdioTransport {
    pub fn new(config: StdioServerConfig) -> Self {
        let request_timeout = config.request_timeout().unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        Self {
            config,
            ids: MessageFactory::new(),
            pending: PendingRequests::default(),
            request_timeout,
            startup_grace: DEFAULT_STARTUP_GRACE,
            state: Mutex::new(ConnectionState::Unconnected),
            stdin: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn config(&self) -> &StdioServerConfig {
        &self.config
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn messages(&self) -> &MessageFactory {
        &self.ids
    }

    /// Spawn the server process and start the reader tasks.
    ///
    /// Succeeds only once the child has survived the startup grace period.
    /// Calling this on a connected transport does nothing.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ConnectionState::Connected(_) => return Ok(()),
            ConnectionState::Closed => {
                return Err(Error::message("stdio transport has already been closed"));
            },
            ConnectionState::Unconnected => {},
        }

        info!(
            command = %self.config.command,
            args = ?self.config.args,
            "spawning MCP server process"
        );

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let stdin = child.stdin.take().context("failed to capture stdin")?;
        let stdout = child.stdout.take().context("failed to capture stdout")?;
        let stderr = child.stderr.take();

        let (exit_tx, exit_rx) = watch::channel(ExitState::Running);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, kill_rx, exit_tx));

        let stderr = stderr.map(|s| tokio::spawn(drain_stderr(s)));
        let reader = tokio::spawn(read_stdout(stdout, self.pending.clone(), exit_rx.clone()));
        *self.stdin.lock().await = Some(stdin);

        let mut startup_watch = exit_rx.clone();
        let early_exit = tokio::select! {
            _ = tokio::time::sleep(self.startup_grace) => None,
            code = wait_for_exit(&mut startup_watch) => Some(code),
        };

        let conn = Connection {
            kill_tx,
            exit_rx,
            reader,
            stderr,
        };

        if let Some(code) = early_exit {
            warn!(command = %self.config.command, ?code, "MCP server exited during startup");
            self.teardown(conn).await;
            *state = ConnectionState::Closed;
            return Err(Error::ProcessTerminated { code });
        }

        *state = ConnectionState::Connected(conn);
        Ok(())
    }

    /// Whether the transport is connected and the child is still running.
    pub async fn is_connected(&self) -> bool {
        match &*self.state.lock().await {
            ConnectionState::Connected(conn) => !conn.exit_rx.borrow().has_exited(),
            _ => false,
        }
    }

    pub async fn send(&self, message: OutgoingMessage) -> Result<Option<Value>> {
        self.send_with_timeout(message, self.request_timeout).await
    }

    /// Write `message` as one line. Requests wait for the matching response,
    /// a timeout, or the child exiting; notifications return `None` at once.
    pub async fn send_with_timeout(
        &self,
        message: OutgoingMessage,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        let line = message.to_line()?;
        let method = message.method();

        let Some(id) = message.id() else {
            trace!(method = %method, "client -> MCP server (notification)");
            self.write_line(&line).await?;
            return Ok(None);
        };

        if self.stdin.lock().await.is_none() {
            return Err(Error::NotConnected);
        }
        let rx = self.pending.register(id, method).await?;
        debug!(method = %method, id, "client -> MCP server");

        if let Err(e) = self.write_line(&line).await {
            self.pending.forget(id).await;
            return Err(e);
        }

        await_settlement(&self.pending, id, method, rx, timeout)
            .await
            .map(Some)
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(Error::NotConnected)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Stop reading, close the child's stdin and terminate it. Outstanding
    /// requests are rejected with `ProcessClosed`. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ConnectionState::Closed);
        if let ConnectionState::Connected(conn) = previous {
            info!(command = %self.config.command, "closing MCP server process");
            self.teardown(conn).await;
        }
    }

    async fn teardown(&self, conn: Connection) {
        conn.reader.abort();
        self.stdin.lock().await.take();
        let _ = conn.kill_tx.send(());

        let mut exit_rx = conn.exit_rx;
        let code = exit_code(&mut exit_rx, EXIT_STATUS_WAIT).await;
        if let Some(handle) = conn.stderr {
            handle.abort();
        }
        self.pending.close_all(code).await;
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.len().await
    }
}

/// Own the child until it exits or a kill is requested, then publish the exit
/// code.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<ExitState>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Fires on an explicit kill and when the transport is dropped.
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "failed to kill MCP server process");
            }
            child.wait().await
        },
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "failed to collect MCP server exit status");
            None
        },
    };
    debug!(?code, "MCP server process exited");
    let _ = exit_tx.send(ExitState::Exited(code));
}

async fn read_stdout(
    stdout: ChildStdout,
    pending: PendingRequests,
    mut exit_rx: watch::Receiver<ExitState>,
) {
    let mut lines = BufReader::new(stdout).lines();
    // A descendant of the server can keep stdout open after the server itself
    // exits, so the exit status ends the session just like EOF does.
    let code = loop {
        tokio::select! {
            biased;
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&line, &pending).await,
                Ok(None) => {
                    debug!("MCP server stdout closed");
                    break exit_code(&mut exit_rx, EXIT_STATUS_WAIT).await;
                },
                Err(e) => {
                    warn!(error = %e, "error reading from MCP server stdout");
                    break exit_code(&mut exit_rx, EXIT_STATUS_WAIT).await;
                },
            },
            code = wait_for_exit(&mut exit_rx) => {
                debug!(?code, "MCP server exited, draining buffered stdout");
                while let Ok(Ok(Some(line))) =
                    tokio::time::timeout(EXIT_DRAIN, lines.next_line()).await
                {
                    handle_line(&line, &pending).await;
                }
                break code;
            },
        }
    };

    let rejected = pending.close_all(code).await;
    if rejected > 0 {
        warn!(rejected, ?code, "MCP server exited with requests outstanding");
    }
}

async fn wait_for_exit(exit_rx: &mut watch::Receiver<ExitState>) -> Option<i32> {
    exit_rx
        .wait_for(ExitState::has_exited)
        .await
        .map(|s| s.code())
        .unwrap_or(None)
}

/// Exit code of the child, waiting at most `wait` for it to be published.
async fn exit_code(exit_rx: &mut watch::Receiver<ExitState>, wait: Duration) -> Option<i32> {
    tokio::time::timeout(wait, wait_for_exit(exit_rx))
        .await
        .ok()
        .flatten()
}

async fn handle_line(line: &str, pending: &PendingRequests) {
    match classify_line(line) {
        InboundLine::Blank => {},
        InboundLine::NotJson => {
            debug!(line = %line.trim(), "ignoring non-JSON line from MCP server");
        },
        InboundLine::ServerMessage { method } => {
            debug!(method = %method, "ignoring server-initiated MCP message");
        },
        InboundLine::Unrecognized => {
            debug!(line = %line.trim(), "ignoring unrecognized MCP server output");
        },
        InboundLine::Response(resp) => {
            let id = resp.numeric_id();
            trace!(?id, "MCP server -> client");
            if !pending.settle(resp).await {
                warn!(?id, "received response for unknown request id");
            }
        },
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            warn!(stderr = %trimmed, "MCP server stderr");
        }
    }
}
