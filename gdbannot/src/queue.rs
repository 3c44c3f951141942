//! Pending command backlog
//!
//! Commands are consumed strictly in order; the only exception is follow-up
//! work issued by a completion handler, which runs ahead of unrelated queued
//! commands so a reply's dependent requests stay together.

use std::collections::VecDeque;
use std::fmt;

use crate::types::ViewKind;

/// Consumer callback receiving the private capture of a tracked command
pub type Callback = Box<dyn FnOnce(&str) + Send>;

/// What to do with the capture of a tracked command once it is finalized
pub enum Completion {
    /// Capture is dropped
    Ignore,
    /// Refresh reply of a view
    View(ViewKind),
    /// `info source` reply
    SourceInfo,
    WatchCreate { expression: String },
    WatchChildren { handle: String },
    WatchValue { handle: String, changed: bool },
    /// `-var-update` changelist
    WatchUpdate,
    Callback(Callback),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Ignore => write!(f, "Ignore"),
            Completion::View(kind) => write!(f, "View({})", kind),
            Completion::SourceInfo => write!(f, "SourceInfo"),
            Completion::WatchCreate { expression } => write!(f, "WatchCreate({})", expression),
            Completion::WatchChildren { handle } => write!(f, "WatchChildren({})", handle),
            Completion::WatchValue { handle, changed } => {
                write!(f, "WatchValue({}, changed={})", handle, changed)
            }
            Completion::WatchUpdate => write!(f, "WatchUpdate"),
            Completion::Callback(_) => write!(f, "Callback"),
        }
    }
}

/// One command waiting to be sent or in flight
#[derive(Debug)]
pub enum CommandEntry {
    /// Sent verbatim; the reply goes to the user transcript
    Raw(String),
    /// Reply is captured privately and handed to `completion`
    Tracked { command: String, completion: Completion },
}

impl CommandEntry {
    pub fn raw(text: impl Into<String>) -> Self {
        CommandEntry::Raw(text.into())
    }

    pub fn tracked(command: impl Into<String>, completion: Completion) -> Self {
        CommandEntry::Tracked {
            command: command.into(),
            completion,
        }
    }

    /// Text written to gdb
    pub fn text(&self) -> &str {
        match self {
            CommandEntry::Raw(text) => text,
            CommandEntry::Tracked { command, .. } => command,
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, CommandEntry::Tracked { .. })
    }
}

/// FIFO of pending commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<CommandEntry>,
    /// Insertion point for follow-ups of the completion being handled
    follow_up: usize,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, entry: CommandEntry) {
        self.entries.push_back(entry);
    }

    /// Start collecting follow-ups of a new completion at the head
    pub fn begin_follow_ups(&mut self) {
        self.follow_up = 0;
    }

    /// Queue ahead of older entries, after earlier follow-ups of the same completion
    pub fn push_follow_up(&mut self, entry: CommandEntry) {
        let at = self.follow_up.min(self.entries.len());
        self.entries.insert(at, entry);
        self.follow_up = at + 1;
    }

    pub fn pop_front(&mut self) -> Option<CommandEntry> {
        self.follow_up = self.follow_up.saturating_sub(1);
        self.entries.pop_front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.follow_up = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Command texts in send order
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(CommandEntry::text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_regardless_of_type() {
        let mut queue = CommandQueue::new();
        queue.push_back(CommandEntry::raw("next\n"));
        queue.push_back(CommandEntry::tracked("server info locals\n", Completion::View(ViewKind::Locals)));
        queue.push_back(CommandEntry::raw("step\n"));

        assert_eq!(queue.pop_front().unwrap().text(), "next\n");
        assert!(queue.pop_front().unwrap().is_tracked());
        assert_eq!(queue.pop_front().unwrap().text(), "step\n");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_follow_ups_keep_their_order_ahead_of_backlog() {
        let mut queue = CommandQueue::new();
        queue.push_back(CommandEntry::raw("older\n"));

        queue.begin_follow_ups();
        queue.push_follow_up(CommandEntry::raw("first\n"));
        queue.push_follow_up(CommandEntry::raw("second\n"));

        assert_eq!(queue.texts(), vec!["first\n", "second\n", "older\n"]);
    }

    #[test]
    fn test_clear() {
        let mut queue = CommandQueue::new();
        queue.push_back(CommandEntry::raw("run\n"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
