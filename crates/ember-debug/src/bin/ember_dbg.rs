//! Minimal host: spawn a DAP adapter, launch a program under it, stream its
//! output to the terminal, and auto-continue through any stops after printing
//! where execution paused.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

use ember_dap::DapClient;
use ember_debug::{
    AdapterConfig, BreakpointStore, EngineError, FrameLocation, LaunchKind, Presenter, Session,
    SessionState,
};

#[derive(Parser)]
#[command(
    name = "ember-dbg",
    about = "Run a program under a DAP adapter and stream its output."
)]
struct Args {
    /// Adapter identifier reported to the adapter (e.g. "debugpy").
    #[arg(long)]
    adapter_id: String,

    /// Launch request arguments as inline JSON.
    #[arg(long)]
    launch: String,

    /// Breakpoints to set before launching.
    #[arg(long = "break", value_name = "FILE:LINE")]
    breakpoints: Vec<String>,

    /// Adapter command followed by its arguments.
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn message(&mut self, text: &str) {
        eprintln!("[ember] {text}");
    }

    fn output(&mut self, category: Option<&str>, text: &str) {
        if category == Some("stderr") {
            eprint!("{text}");
        } else {
            print!("{text}");
        }
    }

    fn state_changed(&mut self, state: SessionState) {
        tracing::debug!(?state, "session state");
    }

    fn current_frame(&mut self, frame: Option<&FrameLocation>) {
        if let Some(frame) = frame {
            match &frame.path {
                Some(path) => eprintln!(
                    "[ember] stopped in {} at {}:{}",
                    frame.frame_name,
                    path.display(),
                    frame.line
                ),
                None => eprintln!(
                    "[ember] stopped in {} at line {}",
                    frame.frame_name, frame.line
                ),
            }
        }
    }
}

fn parse_breakpoint(spec: &str) -> Result<(String, u32), EngineError> {
    let err = || EngineError::UserInput(format!("breakpoint {spec:?} is not FILE:LINE"));
    let (path, line) = spec.rsplit_once(':').ok_or_else(err)?;
    let line = line.parse().map_err(|_| err())?;
    Ok((path.to_string(), line))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let launch: serde_json::Value =
        serde_json::from_str(&args.launch).context("--launch must be valid JSON")?;

    let mut breakpoints = BreakpointStore::new();
    for spec in &args.breakpoints {
        let (path, line) = parse_breakpoint(spec)?;
        breakpoints.toggle(path, line);
    }

    let Some((program, adapter_args)) = args.command.split_first() else {
        bail!("no adapter command given");
    };
    let mut child = Command::new(program)
        .args(adapter_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to spawn adapter {program:?}"))?;
    let stdout = child.stdout.take().context("adapter stdout not captured")?;
    let stdin = child.stdin.take().context("adapter stdin not captured")?;

    let (client, events) = DapClient::connect(stdout, stdin);
    let config = AdapterConfig::new(args.adapter_id, LaunchKind::Launch(launch));
    let mut session = Session::new(client, events, config, breakpoints, ConsolePresenter);

    session.start().await?;
    loop {
        if !session.pump().await? {
            break;
        }
        if session.state() == SessionState::Stopped {
            session.continue_execution().await?;
        }
    }

    let status = child.wait().await.context("adapter did not exit")?;
    if !status.success() {
        bail!("adapter exited with {status}");
    }
    Ok(())
}
