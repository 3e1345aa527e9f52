//! Transports carrying frames between a session and its engine.
//!
//! A link only moves opaque text frames. Inbound frames are posted through the [`SessionHandle`]
//! handed to [`EngineLink::start`], so they are processed on the session's own context no matter
//! which task or thread read them.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::SessionHandle;

const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Exclusively owned by one session and closed exactly once.
pub trait EngineLink: Send {
    /// Begin delivering inbound frames to `inbox`.
    fn start(&mut self, inbox: SessionHandle) -> Result<()> {
        let _ = inbox;
        Ok(())
    }

    /// Queue one outbound frame.
    fn send(&mut self, frame: String) -> Result<()>;

    /// Release the engine. Called once, at session teardown.
    fn close(&mut self);
}

/// In-process link. Outbound frames arrive on the receiver returned by [`ChannelLink::new`];
/// the engine answers through the session's [`SessionHandle`].
#[derive(Debug)]
pub struct ChannelLink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl ChannelLink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl EngineLink for ChannelLink {
    fn send(&mut self, frame: String) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("link closed"))?;
        tx.send(frame).map_err(|_| anyhow!("engine receiver dropped"))
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!(target: "session.link", kind = "channel", "link_closed");
        }
    }
}

/// Engine subprocess speaking newline-delimited JSON on stdin/stdout. stderr is inherited.
pub struct ProcessLink {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    writer_tx: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl ProcessLink {
    /// Spawn `program` with `args`. Must be called inside a Tokio runtime.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn engine {}", program.to_string_lossy()))?;
        let stdin = child.stdin.take().context("engine stdin unavailable")?;
        let stdout = child.stdout.take().context("engine stdout unavailable")?;
        info!(target: "session.link", pid = ?child.id(), "engine_spawned");

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(stdin, writer_rx));
        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
            writer_tx: Some(writer_tx),
            writer: Some(writer),
            reader: None,
        })
    }
}

impl EngineLink for ProcessLink {
    fn start(&mut self, inbox: SessionHandle) -> Result<()> {
        let stdout = self.stdout.take().context("engine link already started")?;
        self.reader = Some(tokio::spawn(read_frames(stdout, inbox)));
        Ok(())
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let tx = self.writer_tx.as_ref().ok_or_else(|| anyhow!("link closed"))?;
        tx.send(frame).map_err(|_| anyhow!("engine stdin closed"))
    }

    fn close(&mut self) {
        // Dropping the sender ends the writer task, which closes the engine's stdin.
        self.writer_tx.take();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        let Some(mut child) = self.child.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let writer = self.writer.take();
                rt.spawn(async move {
                    if let Some(writer) = writer {
                        let _ = writer.await;
                    }
                    match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                        Ok(Ok(status)) => {
                            debug!(target: "session.link", code = ?status.code(), "engine_exited")
                        }
                        _ => {
                            warn!(target: "session.link", "engine_kill_after_grace");
                            let _ = child.kill().await;
                        }
                    }
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}

impl Drop for ProcessLink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn write_frames(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = rx.recv().await {
        let written = async {
            stdin.write_all(frame.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(target: "session.link", error = %e, "engine_write_failed");
            break;
        }
    }
}

async fn read_frames(stdout: ChildStdout, inbox: SessionHandle) {
    let mut lines = BufReader::new(stdout).lines();
    let reason = loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if !inbox.deliver_frame(line) {
                    return;
                }
            }
            Ok(None) => break None,
            Err(e) => break Some(format!("engine stdout: {e}")),
        }
    };
    debug!(target: "session.link", reason = ?reason, "engine_stdout_closed");
    inbox.link_closed(reason);
}
