//! Annotation engine types and data structures
//!
//! This module defines the sink phases, annotation records, view kinds and the
//! structured rows produced from gdb's CLI replies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination of plain text coming from gdb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkPhase {
    /// User-visible transcript
    User,
    /// Input/output of the program being debugged
    Inferior,
    /// Tracked command sent, its reply has not started yet
    PreCapture,
    /// Reply of the tracked command goes to the capture buffer
    Capture,
    /// Reply finished, waiting for the top-level prompt
    PostCapture,
}

impl fmt::Display for SinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SinkPhase::User => "user",
            SinkPhase::Inferior => "inferior",
            SinkPhase::PreCapture => "pre-capture",
            SinkPhase::Capture => "capture",
            SinkPhase::PostCapture => "post-capture",
        };
        write!(f, "{}", s)
    }
}

/// Annotation tags understood by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationTag {
    PrePrompt,
    Prompt,
    Commands,
    OverloadChoice,
    Query,
    NQuery,
    PromptForContinue,
    PostPrompt,
    Source,
    Starting,
    Signal,
    Breakpoint,
    Watchpoint,
    Exited,
    Signalled,
    FrameBegin,
    Stopped,
    ErrorBegin,
    Error,
    /// Any tag outside the closed set; dispatching it does nothing
    Other(String),
}

impl AnnotationTag {
    /// Map a tag token to its variant
    pub fn from_name(name: &str) -> Self {
        match name {
            "pre-prompt" => AnnotationTag::PrePrompt,
            "prompt" => AnnotationTag::Prompt,
            "commands" => AnnotationTag::Commands,
            "overload-choice" => AnnotationTag::OverloadChoice,
            "query" => AnnotationTag::Query,
            "nquery" => AnnotationTag::NQuery,
            "prompt-for-continue" => AnnotationTag::PromptForContinue,
            "post-prompt" => AnnotationTag::PostPrompt,
            "source" => AnnotationTag::Source,
            "starting" => AnnotationTag::Starting,
            "signal" => AnnotationTag::Signal,
            "breakpoint" => AnnotationTag::Breakpoint,
            "watchpoint" => AnnotationTag::Watchpoint,
            "exited" => AnnotationTag::Exited,
            "signalled" => AnnotationTag::Signalled,
            "frame-begin" => AnnotationTag::FrameBegin,
            "stopped" => AnnotationTag::Stopped,
            "error-begin" => AnnotationTag::ErrorBegin,
            "error" => AnnotationTag::Error,
            other => AnnotationTag::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnnotationTag::PrePrompt => "pre-prompt",
            AnnotationTag::Prompt => "prompt",
            AnnotationTag::Commands => "commands",
            AnnotationTag::OverloadChoice => "overload-choice",
            AnnotationTag::Query => "query",
            AnnotationTag::NQuery => "nquery",
            AnnotationTag::PromptForContinue => "prompt-for-continue",
            AnnotationTag::PostPrompt => "post-prompt",
            AnnotationTag::Source => "source",
            AnnotationTag::Starting => "starting",
            AnnotationTag::Signal => "signal",
            AnnotationTag::Breakpoint => "breakpoint",
            AnnotationTag::Watchpoint => "watchpoint",
            AnnotationTag::Exited => "exited",
            AnnotationTag::Signalled => "signalled",
            AnnotationTag::FrameBegin => "frame-begin",
            AnnotationTag::Stopped => "stopped",
            AnnotationTag::ErrorBegin => "error-begin",
            AnnotationTag::Error => "error",
            AnnotationTag::Other(name) => name,
        }
    }
}

impl fmt::Display for AnnotationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A complete annotation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub tag: AnnotationTag,
    pub argument: Option<String>,
}

impl Annotation {
    pub fn new(tag: AnnotationTag, argument: Option<String>) -> Self {
        Self { tag, argument }
    }
}

/// One piece of scanned output: plain text or a recognised annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Annotation(Annotation),
}

/// Where the debuggee is currently stopped, from the `source` annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPosition {
    pub file: String,
    pub line: u32,
    /// Hex address including the `0x` prefix
    pub address: String,
}

impl ExecutionPosition {
    /// Numeric value of the address
    pub fn address_value(&self) -> Option<u64> {
        u64::from_str_radix(self.address.trim_start_matches("0x"), 16).ok()
    }
}

/// Cached views refreshed through the auto-refresh registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    /// Selected frame info; drives stack and disassembly
    Frame,
    Breakpoints,
    Stack,
    Locals,
    Registers,
    Memory,
    Threads,
    Disassembly,
}

impl ViewKind {
    pub const ALL: [ViewKind; 8] = [
        ViewKind::Frame,
        ViewKind::Breakpoints,
        ViewKind::Stack,
        ViewKind::Locals,
        ViewKind::Registers,
        ViewKind::Memory,
        ViewKind::Threads,
        ViewKind::Disassembly,
    ];

    /// Parse a view name as typed by a user
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "frame" => Some(ViewKind::Frame),
            "breakpoints" | "break" => Some(ViewKind::Breakpoints),
            "stack" => Some(ViewKind::Stack),
            "locals" => Some(ViewKind::Locals),
            "registers" | "regs" => Some(ViewKind::Registers),
            "memory" | "mem" => Some(ViewKind::Memory),
            "threads" => Some(ViewKind::Threads),
            "disassembly" | "asm" => Some(ViewKind::Disassembly),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Frame => "frame",
            ViewKind::Breakpoints => "breakpoints",
            ViewKind::Stack => "stack",
            ViewKind::Locals => "locals",
            ViewKind::Registers => "registers",
            ViewKind::Memory => "memory",
            ViewKind::Threads => "threads",
            ViewKind::Disassembly => "disassembly",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Breakpoint information from `info breakpoints`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub number: String,
    pub breakpoint_type: String,
    pub disposition: String,
    pub enabled: bool,
    pub address: Option<String>,
    pub what: String,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub times: u32,
}

/// Frame information from `info frame`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFrame {
    pub level: u32,
    pub pc: Option<String>,
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// One row of `info stack`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub level: u32,
    pub address: Option<String>,
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub library: Option<String>,
    pub selected: bool,
}

/// One local variable from `info locals`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Local {
    pub name: String,
    pub value: String,
    /// Aggregate value (struct, union, array)
    pub complex: bool,
}

/// One register from `info registers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub name: String,
    pub raw: String,
    pub natural: String,
    pub changed: bool,
}

/// One row of `info threads`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: String,
    pub current: bool,
    pub details: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// One instruction from `disassemble`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyLine {
    pub address: String,
    pub location: Option<String>,
    pub instruction: String,
    pub current: bool,
}

/// One row of an `x` memory dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRow {
    pub address: String,
    pub label: Option<String>,
    pub words: Vec<String>,
}

/// Main source file of the program, from `info source`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub macro_info: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_round_trip_known_tags() {
        for name in ["pre-prompt", "prompt", "nquery", "prompt-for-continue", "frame-begin", "error-begin"] {
            let tag = AnnotationTag::from_name(name);
            assert!(!matches!(tag, AnnotationTag::Other(_)), "{} should be known", name);
            assert_eq!(tag.name(), name);
        }
    }

    #[test]
    fn test_unknown_tag_is_other() {
        assert_eq!(
            AnnotationTag::from_name("frame-function-name"),
            AnnotationTag::Other("frame-function-name".to_string())
        );
    }

    #[test]
    fn test_position_address_value() {
        let position = ExecutionPosition {
            file: "main.c".to_string(),
            line: 3,
            address: "0x401136".to_string(),
        };
        assert_eq!(position.address_value(), Some(0x401136));
    }
}
