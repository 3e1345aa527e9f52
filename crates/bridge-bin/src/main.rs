use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use core_session::{FrontendEvent, ProcessLink, Rect, Session};
use core_tasks::{
    Task, TaskCancel, TaskErrorKind, TaskKind, TaskOutput, TaskRunner, list_toolchains,
    run_executable, to_envelope,
};
use core_text::MonospaceMeasure;
use core_view::LineRange;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

const LOG_FILE: &str = "playbridge.log";
/// Rows shown by `attach`; invalidations below this are not re-fetched.
const ATTACH_ROWS: usize = 40;
const ATTACH_COLS: usize = 100;

#[derive(Parser, Debug)]
#[command(name = "playbridge", version, about = "Engine bridge and playground task runner")]
struct Args {
    /// Optional configuration file path (overrides discovery of `playbridge.toml`).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed toolchains for this host.
    Toolchains {
        /// Print a `{result}` / `{error}` JSON envelope instead of names.
        #[arg(long)]
        json: bool,
    },
    /// Build (and for `run`, execute) a single-file program.
    Task {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = KindArg::Run)]
        kind: KindArg,
        /// Overrides `[tasks] toolchain`.
        #[arg(long)]
        toolchain: Option<String>,
        #[arg(long)]
        release: bool,
        /// Stream output to stderr and print the build result as a JSON envelope on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Spawn an engine speaking newline-delimited JSON on stdio and drive it from stdin.
    Attach {
        #[arg(long)]
        engine: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        engine_args: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum KindArg {
    Run,
    Check,
    Test,
    Clean,
}

impl From<KindArg> for TaskKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Run => TaskKind::Run,
            KindArg::Check => TaskKind::Check,
            KindArg::Test => TaskKind::Test,
            KindArg::Clean => TaskKind::Clean,
        }
    }
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join(LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(_) => Some(guard),
        // Global subscriber already installed; dropping the guard shuts the writer down.
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let config = core_config::load_from(args.config.clone())?;
    info!(target: "runtime", config = ?config.path, "config_resolved");
    let code = match args.command {
        Command::Toolchains { json } => print_toolchains(json),
        Command::Task {
            file,
            kind,
            toolchain,
            release,
            json,
        } => {
            let tasks = &config.file.tasks;
            let task = Task {
                toolchain: toolchain.unwrap_or_else(|| tasks.toolchain.clone()),
                code: std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                kind: kind.into(),
                backtrace: tasks.backtrace,
                release: release || tasks.release,
            };
            run_task(TaskRunner::new(tasks.resolved_build_dir()), task, json).await?
        }
        Command::Attach {
            engine,
            engine_args,
        } => attach(&config.file, &engine, &engine_args).await?,
    };
    let telemetry = core_events::telemetry_snapshot();
    info!(target: "runtime", code = ?code, ?telemetry, "shutdown");
    Ok(code)
}

/// Exit status for a task error code; codes that do not fit a byte become 1.
fn exit_code(code: i64) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_toolchains(json: bool) -> ExitCode {
    let listed = list_toolchains();
    if json {
        println!("{}", to_envelope(&listed));
        return if listed.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }
    match listed {
        Ok(toolchains) => {
            for t in toolchains {
                println!("{}", t.name);
            }
            ExitCode::SUCCESS
        }
        Err(e) if e.kind == TaskErrorKind::MissingToolchainManager => {
            eprintln!("rustup was not found. Install it from https://rustup.rs to build programs.");
            exit_code(e.code())
        }
        Err(e) => {
            eprintln!("error: {e}");
            exit_code(e.code())
        }
    }
}

fn print_output(line: &TaskOutput, stdout_to_stderr: bool) {
    match line {
        TaskOutput::Stdout(s) if !stdout_to_stderr => println!("{s}"),
        TaskOutput::Stdout(s) | TaskOutput::Stderr(s) => eprintln!("{s}"),
    }
}

/// Stream output until `rx` closes, cancelling `cancel` on Ctrl-C.
async fn pump_output(
    mut rx: mpsc::UnboundedReceiver<TaskOutput>,
    cancel: TaskCancel,
    stdout_to_stderr: bool,
) {
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => print_output(&line, stdout_to_stderr),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!(target: "runtime", "interrupt_cancelling_task");
                cancel.cancel();
            }
        }
    }
}

async fn run_task(runner: TaskRunner, task: Task, json: bool) -> Result<ExitCode> {
    let kind = task.kind;
    let release = task.release;
    let (handle, rx) = runner.spawn(task);
    let printer = tokio::spawn(pump_output(rx, handle.canceller(), json));
    let outcome = handle.wait().await;
    // All senders are gone once the task ends, so the printer drains and exits.
    let _ = printer.await;
    if json {
        println!("{}", to_envelope(&outcome));
    }

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!(target: "runtime", code = e.code(), error = %e, "task_failed");
            if !json {
                eprintln!("error: {e}");
            }
            return Ok(exit_code(e.code()));
        }
    };
    if !result.success {
        return Ok(ExitCode::FAILURE);
    }
    if kind != TaskKind::Run {
        return Ok(ExitCode::SUCCESS);
    }
    let Some(executable) = result
        .executable
        .or_else(|| runner.artifact_path(release))
    else {
        eprintln!("build succeeded but produced no executable");
        return Ok(ExitCode::FAILURE);
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = TaskCancel::new();
    let printer = tokio::spawn(pump_output(rx, cancel.clone(), json));
    let run = run_executable(&executable, tx, &cancel).await;
    let _ = printer.await;
    match run {
        Ok(outcome) if outcome.success => Ok(ExitCode::SUCCESS),
        Ok(outcome) => Ok(exit_code(i64::from(outcome.code.unwrap_or(1)).clamp(1, 255))),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(exit_code(e.code()))
        }
    }
}

async fn attach(
    config: &core_config::ConfigFile,
    engine: &str,
    engine_args: &[String],
) -> Result<ExitCode> {
    let link = ProcessLink::spawn(engine, engine_args)?;
    let (mut session, mut events) =
        Session::new(link, MonospaceMeasure::default(), config.editor.clone())?;
    session.sync_config()?;
    if config.input.intercept {
        session.enable_input_interception()?;
    }
    session.frame_changed(Rect::new(0.0, 0.0, ATTACH_COLS as f64, ATTACH_ROWS as f64))?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        while let Ok(event) = events.try_recv() {
            match event {
                FrontendEvent::LinesInvalidated(range) => print_lines(&mut session, range).await?,
                FrontendEvent::ClipboardWrite(text) => eprintln!("[clipboard] {text}"),
                FrontendEvent::ScrollTo { line, col } => eprintln!("[scroll] {line}:{col}"),
                FrontendEvent::SessionAborted(reason) => {
                    eprintln!("engine session ended: {reason}");
                    return Ok(ExitCode::FAILURE);
                }
                _ => {}
            }
        }
        tokio::select! {
            line = stdin.next_line() => match line? {
                Some(text) => {
                    session.insert_text(&text)?;
                    session.do_command("insert_newline")?;
                }
                None => {
                    info!(target: "runtime", "stdin_closed");
                    break;
                }
            },
            processed = session.process_next() => match processed {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    eprintln!("engine session ended: {e}");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => warn!(target: "runtime", error = %e, "engine_error"),
            },
        }
    }
    let document = session.fetch_document().await;
    match document {
        Ok(text) => print!("{text}"),
        Err(e) => warn!(target: "runtime", error = %e, "document_fetch_failed"),
    }
    let _ = std::io::stdout().flush();
    session.shutdown();
    Ok(ExitCode::SUCCESS)
}

async fn print_lines(session: &mut Session, range: LineRange) -> Result<()> {
    let visible = session.total_lines().unwrap_or(ATTACH_ROWS).min(ATTACH_ROWS);
    let end = range.end.unwrap_or(visible).min(visible);
    for index in range.start..end {
        if let Some(line) = session.fetch_line(index).await? {
            println!("{index:>4} | {}", line.text.trim_end_matches('\n'));
        }
    }
    Ok(())
}
