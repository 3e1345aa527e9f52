//! Out-of-process build/run execution with line-by-line output streaming.
//!
//! Output lines are pushed into an unbounded channel as they are read, so a slow consumer never
//! stalls pipe draining (and therefore never stalls the subprocess). The same lines are captured
//! for the terminal [`TaskResult`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::scaffold::{BIN_TARGET_NAME, create_cargo_scaffold};
use crate::{Task, TaskError, TaskErrorKind, TaskKind, TaskOutput, TaskResult};

pub type OutputSink = mpsc::UnboundedSender<TaskOutput>;

/// Requests cancellation of a running task. Safe to signal more than once, or after completion.
#[derive(Clone, Debug, Default)]
pub struct TaskCancel {
    notify: Arc<Notify>,
}

impl TaskCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.notify.notify_one();
    }

    async fn cancelled(&self) {
        self.notify.notified().await;
    }
}

/// A task running on the Tokio runtime.
pub struct TaskHandle {
    join: JoinHandle<Result<TaskResult, TaskError>>,
    cancel: TaskCancel,
}

impl TaskHandle {
    pub fn canceller(&self) -> TaskCancel {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<TaskResult, TaskError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(TaskError::new(
                TaskErrorKind::ProcessFailed,
                format!("task runner aborted: {e}"),
            )),
        }
    }
}

/// Runs tasks inside one scratch project directory.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    build_dir: PathBuf,
    cargo: PathBuf,
    rustup: PathBuf,
}

impl TaskRunner {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            cargo: PathBuf::from("cargo"),
            rustup: PathBuf::from("rustup"),
        }
    }

    /// Substitute the `cargo` and `rustup` executables (wrappers, pinned installs).
    pub fn with_programs(mut self, cargo: impl Into<PathBuf>, rustup: impl Into<PathBuf>) -> Self {
        self.cargo = cargo.into();
        self.rustup = rustup.into();
        self
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Spawn `task` on the runtime. Output arrives on the returned receiver as it is produced.
    pub fn spawn(&self, task: Task) -> (TaskHandle, mpsc::UnboundedReceiver<TaskOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = TaskCancel::new();
        let runner = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { runner.execute(task, tx, &token).await });
        (TaskHandle { join, cancel }, rx)
    }

    /// Run `task` to completion on the current task.
    pub async fn execute(
        &self,
        task: Task,
        sink: OutputSink,
        cancel: &TaskCancel,
    ) -> Result<TaskResult, TaskError> {
        info!(
            target: "tasks.runner",
            kind = task.kind.as_str(),
            toolchain = %task.toolchain,
            release = task.release,
            code_len = task.code.len(),
            "task_started"
        );
        create_cargo_scaffold(&self.build_dir, &task.code).await?;
        self.activate_toolchain(&task.toolchain).await?;

        let mut command = Command::new(&self.cargo);
        command
            .current_dir(&self.build_dir)
            .arg(task.kind.cargo_subcommand());
        if task.backtrace {
            command.env("RUST_BACKTRACE", "1");
        }
        if task.release {
            command.arg("--release");
        }

        let child = match spawn_piped(&mut command) {
            Ok(child) => child,
            Err(e) => {
                warn!(target: "tasks.runner", error = %e, "cargo_spawn_failed");
                return Ok(TaskResult {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("failed to start {}: {e}", self.cargo.display()),
                    executable: None,
                });
            }
        };

        let streamed = stream_child(child, sink, cancel).await?;
        let executable = match task.kind {
            TaskKind::Clean => None,
            _ => self.artifact_path(task.release),
        };
        let result = TaskResult {
            success: streamed.status.success(),
            stdout: streamed.stdout,
            stderr: streamed.stderr,
            executable,
        };
        info!(
            target: "tasks.runner",
            kind = task.kind.as_str(),
            success = result.success,
            exit_code = ?streamed.status.code(),
            has_executable = result.executable.is_some(),
            "task_finished"
        );
        Ok(result)
    }

    /// `target/{debug,release}/playground`, if it exists.
    pub fn artifact_path(&self, release: bool) -> Option<PathBuf> {
        let profile = if release { "release" } else { "debug" };
        let path = self.build_dir.join("target").join(profile).join(BIN_TARGET_NAME);
        path.exists().then_some(path)
    }

    async fn activate_toolchain(&self, toolchain: &str) -> Result<(), TaskError> {
        let output = Command::new(&self.rustup)
            .current_dir(&self.build_dir)
            .args(["override", "set", toolchain])
            .stdin(Stdio::null())
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                debug!(target: "tasks.runner", toolchain, "toolchain_selected");
                Ok(())
            }
            Ok(out) => Err(TaskError::new(
                TaskErrorKind::ToolchainSelectFailed,
                format!(
                    "failed to set toolchain `{toolchain}`: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(TaskError::missing_toolchain_manager())
            }
            Err(e) => Err(TaskError::new(
                TaskErrorKind::ToolchainSelectFailed,
                format!("failed to run rustup: {e}"),
            )),
        }
    }
}

/// Outcome of running a produced executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

/// Execute a built artifact, streaming its output the same way as a build.
pub async fn run_executable(
    path: &Path,
    sink: OutputSink,
    cancel: &TaskCancel,
) -> Result<RunOutcome, TaskError> {
    let mut command = Command::new(path);
    if let Some(dir) = path.parent() {
        command.current_dir(dir);
    }
    let child = spawn_piped(&mut command).map_err(|e| {
        TaskError::new(
            TaskErrorKind::ProcessFailed,
            format!("failed to start {}: {e}", path.display()),
        )
    })?;
    let streamed = stream_child(child, sink, cancel).await?;
    Ok(RunOutcome {
        success: streamed.status.success(),
        code: streamed.status.code(),
    })
}

fn spawn_piped(command: &mut Command) -> io::Result<Child> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

struct Streamed {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

async fn stream_child(
    mut child: Child,
    sink: OutputSink,
    cancel: &TaskCancel,
) -> Result<Streamed, TaskError> {
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(pump_lines(out, sink.clone(), TaskOutput::Stdout)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(pump_lines(err, sink, TaskOutput::Stderr)));

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                debug!(target: "tasks.runner", error = %e, "kill_failed");
            }
            info!(target: "tasks.runner", "task_cancelled");
            return Err(TaskError::new(TaskErrorKind::Cancelled, "task cancelled"));
        }
        status = child.wait() => status.map_err(|e| {
            TaskError::new(TaskErrorKind::ProcessFailed, format!("failed to wait for process: {e}"))
        })?,
    };

    Ok(Streamed {
        status,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
    })
}

async fn collect(pump: Option<JoinHandle<String>>) -> String {
    match pump {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Forward each line as it arrives and return everything read. Invalid UTF-8 is replaced rather
/// than ending the stream.
async fn pump_lines<R>(reader: R, sink: OutputSink, wrap: fn(String) -> TaskOutput) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                captured.push_str(&line);
                let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
                // Receiver gone means nobody is watching; keep draining so the child never blocks.
                let _ = sink.send(wrap(trimmed));
            }
            Err(e) => {
                debug!(target: "tasks.runner", error = %e, "pipe_read_failed");
                break;
            }
        }
    }
    captured
}
