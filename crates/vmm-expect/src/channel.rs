//! Line channel: one spawned process and its byte streams.
//!
//! Output is drained by background reader tasks as soon as the process
//! writes it and forwarded over an unbounded channel, so a chatty process
//! never blocks on a full pipe while the scenario is busy with another
//! session. Stdout and stderr arrive merged: a PTY merges them natively,
//! the pipe transport runs one reader per stream feeding the same channel.
//!
//! The stream ends when every writer closes its end, or shortly after the
//! process itself exits: background helpers it leaves behind may keep a
//! pipe open, and a scenario waiting on that pipe would otherwise run into
//! its deadline instead of seeing the process end.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use vmm_pty::{PtyConfig, PtyError, UnixChild};

use crate::config::{LineEnding, SessionConfig, Transport};
use crate::error::{ExpectError, Result, SpawnError};
use crate::expect::{OutputBuffer, OutputSource};
use crate::types::{ExitStatus, Signal};

/// Bytes requested per read from the process.
const READ_CHUNK: usize = 4096;

/// How long output may keep trickling in after the process exited.
const EXIT_SETTLE: Duration = Duration::from_millis(100);

/// Whether more output can still arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// The stream is open.
    Open,
    /// Every writer closed its end and all delivered output was drained.
    Ended,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared transcript file written by the reader tasks.
#[derive(Clone)]
struct Transcript {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl Transcript {
    async fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(path).await?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    async fn record(&self, chunk: &[u8], label: &str) {
        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(chunk).await {
            tracing::warn!(session = %label, error = %e, "transcript write failed");
        }
    }
}

/// A running process with line-oriented input and continuously drained
/// output.
pub struct LineChannel {
    label: String,
    writer: Writer,
    child: UnixChild,
    rx: mpsc::UnboundedReceiver<Bytes>,
    pending: Option<Bytes>,
    ended: bool,
    exited: bool,
    readers: Vec<JoinHandle<()>>,
    line_ending: LineEnding,
}

impl fmt::Debug for LineChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineChannel")
            .field("label", &self.label)
            .field("pid", &self.child.pid())
            .field("exited", &self.exited)
            .field("ended", &self.ended)
            .finish()
    }
}

impl LineChannel {
    /// Spawn the process described by `config`.
    ///
    /// Fails with a [`SpawnError`] when the executable is missing or cannot
    /// be launched; never waits on the process itself.
    pub async fn spawn(config: &SessionConfig) -> std::result::Result<Self, SpawnError> {
        if config.command.trim().is_empty() {
            return Err(SpawnError::InvalidArgument {
                kind: "command".into(),
                value: config.command.clone(),
                reason: "empty command".into(),
            });
        }

        let label = config.display_label();
        let transcript = match &config.transcript {
            Some(path) => Some(Transcript::create(path).await?),
            None => None,
        };
        let (tx, rx) = mpsc::unbounded_channel();

        let (writer, child, readers) = match config.transport {
            Transport::Pty => spawn_pty(config, &label, tx, transcript)?,
            Transport::Pipe => spawn_pipe(config, &label, tx, transcript)?,
        };

        tracing::debug!(
            session = %label,
            pid = child.pid(),
            transport = ?config.transport,
            command = %config.command,
            args = ?config.args,
            "spawned process"
        );

        Ok(Self {
            label,
            writer,
            child,
            rx,
            pending: None,
            ended: false,
            exited: false,
            readers,
            line_ending: config.line_ending,
        })
    }

    /// Label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process ID of the child.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.pid()
    }

    /// Write raw bytes to the process's input.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .await
            .map_err(|e| ExpectError::io_context(format!("writing to {}", self.label), e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| ExpectError::io_context(format!("flushing input of {}", self.label), e))
    }

    /// Write `text` followed by the configured line ending.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let mut line = String::with_capacity(text.len() + 2);
        line.push_str(text);
        line.push_str(self.line_ending.as_str());
        self.send(line.as_bytes()).await
    }

    /// Move output delivered so far into `buffer` without blocking.
    pub fn read_available(&mut self, buffer: &mut OutputBuffer) -> StreamState {
        if let Some(chunk) = self.pending.take() {
            buffer.append(&chunk);
        }
        if self.ended {
            return StreamState::Ended;
        }
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => buffer.append(&chunk),
                Err(mpsc::error::TryRecvError::Empty) => return StreamState::Open,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.ended = true;
                    return StreamState::Ended;
                }
            }
        }
    }

    /// Block until a chunk arrives, the stream ends, or `deadline` passes.
    ///
    /// Once the process has exited, the stream is declared ended as soon as
    /// no output arrives for [`EXIT_SETTLE`], even if a leftover helper
    /// still holds the write end open.
    pub async fn readable(&mut self, deadline: Instant) {
        if self.pending.is_some() || self.ended {
            return;
        }
        if !self.exited {
            tokio::select! {
                biased;
                chunk = self.rx.recv() => {
                    match chunk {
                        Some(chunk) => self.pending = Some(chunk),
                        None => self.ended = true,
                    }
                    return;
                }
                status = self.child.wait() => {
                    self.exited = true;
                    match status {
                        Ok(status) => tracing::debug!(session = %self.label, %status, "process exited"),
                        Err(e) => tracing::warn!(session = %self.label, error = %e, "waiting for process failed"),
                    }
                }
                () = tokio::time::sleep_until(deadline) => return,
            }
        }

        match tokio::time::timeout(EXIT_SETTLE, self.rx.recv()).await {
            Ok(Some(chunk)) => self.pending = Some(chunk),
            Ok(None) => self.ended = true,
            Err(_) => {
                tracing::debug!(session = %self.label, "output still held open after exit");
                self.ended = true;
            }
        }
    }

    /// Whether the output stream has ended.
    #[must_use]
    pub const fn stream_ended(&self) -> bool {
        self.ended && self.pending.is_none()
    }

    /// Deliver a signal to the process (its whole process group).
    ///
    /// Signalling a process that already exited is not an error.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        match self.child.signal(signal.into()) {
            Ok(()) => Ok(()),
            Err(PtyError::ProcessExited(status)) => {
                tracing::debug!(session = %self.label, %signal, %status, "signal after exit ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// SIGTERM, then SIGKILL after `grace`; returns the exit status.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        Ok(self.child.terminate(grace).await?)
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Reap the process if it exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Whether the process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl OutputSource for LineChannel {
    fn drain_into(&mut self, buffer: &mut OutputBuffer) -> StreamState {
        self.read_available(buffer)
    }

    async fn wait_readable(&mut self, deadline: Instant) {
        self.readable(deadline).await;
    }
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

fn effective_env(config: &SessionConfig) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = if config.inherit_env {
        std::env::vars().collect()
    } else {
        HashMap::new()
    };
    env.extend(config.env.clone());
    env
}

fn spawn_pty(
    config: &SessionConfig,
    label: &str,
    tx: mpsc::UnboundedSender<Bytes>,
    transcript: Option<Transcript>,
) -> std::result::Result<(Writer, UnixChild, Vec<JoinHandle<()>>), SpawnError> {
    let mut pty_config = PtyConfig::builder()
        .env_clear()
        .window_size(config.dimensions.0, config.dimensions.1)
        .echo(config.echo);
    for (key, value) in effective_env(config) {
        pty_config = pty_config.env(key, value);
    }
    if let Some(dir) = &config.working_dir {
        pty_config = pty_config.working_directory(dir);
    }

    let (master, child) = vmm_pty::spawn(&config.command, &config.args, &pty_config.build())
        .map_err(|e| SpawnError::from_pty(&config.command, e))?;

    let (read_half, write_half) = tokio::io::split(master);
    let reader = tokio::spawn(pump(read_half, tx, transcript, label.to_string()));
    Ok((Box::new(write_half), child, vec![reader]))
}

fn spawn_pipe(
    config: &SessionConfig,
    label: &str,
    tx: mpsc::UnboundedSender<Bytes>,
    transcript: Option<Transcript>,
) -> std::result::Result<(Writer, UnixChild, Vec<JoinHandle<()>>), SpawnError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .env_clear()
        .envs(effective_env(config))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| SpawnError::from_launch(&config.command, e))?;

    let missing = || SpawnError::Io(std::io::Error::other("child stdio was not captured"));
    let stdin = child.stdin.take().ok_or_else(missing)?;
    let stdout = child.stdout.take().ok_or_else(missing)?;
    let stderr = child.stderr.take().ok_or_else(missing)?;

    let child =
        UnixChild::from_tokio(child, true).map_err(|e| SpawnError::from_pty(&config.command, e))?;

    let readers = vec![
        tokio::spawn(pump(stdout, tx.clone(), transcript.clone(), label.to_string())),
        tokio::spawn(pump(stderr, tx, transcript, label.to_string())),
    ];
    Ok((Box::new(stdin), child, readers))
}

/// Forward everything `reader` yields until end of stream.
async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::UnboundedSender<Bytes>,
    transcript: Option<Transcript>,
    label: String,
) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf.split().freeze();
                tracing::trace!(session = %label, bytes = n, "output");
                if let Some(t) = &transcript {
                    t.record(&chunk, &label).await;
                }
                if tx.send(chunk).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::debug!(session = %label, error = %e, "output stream closed with error");
                break;
            }
        }
    }
    tracing::trace!(session = %label, "reader finished");
}
