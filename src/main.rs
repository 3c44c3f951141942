mod console;

use anyhow::Context;
use clap::Parser;
use gdbannot::process::install_signal_protection;
use gdbannot::session::forward_stderr;
use gdbannot::{run_session, Engine, EngineConfig, EngineEvent, GdbProcess, SessionRequest};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use console::Input;

/// Terminal front end for gdb's annotation interface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// gdb executable
    #[arg(long, env = "GDBTERM_GDB", default_value = "gdb")]
    gdb: String,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print debuggee output separately from gdb's
    #[arg(long)]
    separate_io: bool,

    #[arg(long, default_value_t = log::LevelFilter::Warn)]
    log_level: log::LevelFilter,

    /// Program to debug
    program: Option<String>,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_module_level("gdbannot", args.log_level)
        .with_module_level("gdbterm", args.log_level)
        .init()?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.separate_io {
        config.separate_io = true;
    }

    install_signal_protection();
    let mut gdb = GdbProcess::start(&args.gdb, args.program.as_deref(), &args.program_args)
        .await
        .with_context(|| format!("starting {}", args.gdb))?;
    log::info!("gdbterm started {} (PID {:?})", args.gdb, gdb.id());

    let stdin = gdb.take_stdin().context("gdb stdin is not piped")?;
    let stdout = gdb.take_stdout().context("gdb stdout is not piped")?;
    let stderr = gdb.take_stderr().context("gdb stderr is not piped")?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    forward_stderr(stderr, event_tx.clone());

    let mut engine = Engine::new(config, event_tx);
    engine.start_session();
    let mut session = tokio::spawn(run_session(engine, stdout, stdin, request_rx));

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let finished = loop {
        tokio::select! {
            finished = &mut session => break Some(finished),
            line = lines.next_line() => match line? {
                Some(line) => handle_line(&line, &request_tx).await,
                None => {
                    let _ = request_tx.send(SessionRequest::Shutdown);
                    break None;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = gdb.interrupt() {
                    log::warn!("Interrupt failed: {}", e);
                }
            }
        }
    };

    let finished = match finished {
        Some(finished) => finished,
        None => session.await,
    };
    finished??;

    if let Err(e) = gdb.kill().await {
        log::debug!("gdb already gone: {}", e);
    }
    log::info!("gdbterm exiting");
    Ok(())
}

async fn handle_line(line: &str, requests: &mpsc::UnboundedSender<SessionRequest>) {
    let input = match console::parse(line) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let request = match input {
        Input::Help => {
            println!("{}", console::HELP);
            return;
        }
        Input::Views => {
            let (reply_tx, reply_rx) = oneshot::channel();
            if requests.send(SessionRequest::Snapshot(reply_tx)).is_err() {
                return;
            }
            match reply_rx.await {
                Ok(snapshot) => match snapshot.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("{}", e),
                },
                Err(_) => log::warn!("Session ended before the snapshot was taken"),
            }
            return;
        }
        other => other.into_request(),
    };

    if let Some(request) = request {
        if requests.send(request).is_err() {
            log::warn!("Session has ended");
        }
    }
}

fn print_event(event: EngineEvent) {
    match event {
        EngineEvent::UserText { text, is_error: false } => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        EngineEvent::UserText { text, is_error: true } => eprint!("{}", text),
        EngineEvent::DebuggeeText(text) => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        EngineEvent::Resync(reason) => eprintln!("[gdbterm: resynchronised after {}]", reason),
        EngineEvent::Message(message) => eprintln!("{}", message),
        EngineEvent::PositionChanged(position) => {
            log::info!("Stopped at {}:{} ({})", position.file, position.line, position.address)
        }
        EngineEvent::ViewUpdated { kind, raw } => {
            log::debug!("View {} updated ({} bytes)", kind, raw.len())
        }
        other => log::trace!("Event: {:?}", other),
    }
}
