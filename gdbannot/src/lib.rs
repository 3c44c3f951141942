//! gdb annotation engine
//!
//! Drives gdb running with `--annotate=3` over its console channel: splits the
//! output stream into text and annotation markers, routes text to the user
//! transcript, the debuggee's I/O or a private capture, and keeps cached views
//! (breakpoints, stack, locals, registers, memory, threads, disassembly and
//! watch expressions) refreshed without duplicate requests.

use thiserror::Error;

pub mod commands;
pub mod config;
pub mod engine;
pub mod events;
pub mod mi;
pub mod parser;
pub mod process;
pub mod queue;
pub mod refresh;
pub mod session;
pub mod types;
pub mod views;
pub mod watch;

pub use config::{EngineConfig, MemoryConfig, MemoryFormat, MemoryUnit};
pub use engine::{Engine, EngineState, Snapshot};
pub use events::{EngineEvent, EngineHooks, EventLog};
pub use parser::AnnotationScanner;
pub use process::GdbProcess;
pub use refresh::Trigger;
pub use session::{run_session, SessionRequest};
pub use types::*;
pub use watch::{WatchTree, WatchVar};

#[derive(Error, Debug)]
pub enum GdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to start GDB process: {0}")]
    ProcessStartError(#[from] process::ProcessError),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Already watching {0}")]
    DuplicateWatch(String),
    #[error("No watch with handle {0}")]
    UnknownWatch(String),
    #[error("Only root watches can be deleted, not {0}")]
    NotRootWatch(String),
    #[error("Watch {0} has no children")]
    NoChildren(String),
    #[error("Invalid watch: {0}")]
    InvalidWatch(String),
    #[error("Communication error: {0}")]
    CommunicationError(String),
    #[error("GDB process terminated unexpectedly")]
    ProcessTerminated,
}

pub type Result<T> = std::result::Result<T, GdbError>;
