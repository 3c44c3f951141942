//! Engine notifications
//!
//! The engine reports everything it routes or learns through [`EngineHooks`].
//! Presentation code implements the trait directly, or takes the channel
//! implementation and consumes [`EngineEvent`]s on its own task.

use tokio::sync::mpsc;

use crate::types::{ExecutionPosition, SourceInfo, ViewKind};

/// Callbacks the engine makes into presentation code
pub trait EngineHooks {
    /// Text for the user-visible transcript
    fn append_user_text(&mut self, text: &str, is_error: bool);

    /// Output of the program being debugged
    fn append_debuggee_text(&mut self, text: &str);

    /// A view was refreshed; `raw` is the capture it was rebuilt from
    fn on_view_updated(&mut self, _kind: ViewKind, _raw: &str) {}

    fn on_watch_changed(&mut self) {}

    /// The engine resynchronised after a protocol violation
    fn on_resync(&mut self, _reason: &str) {}

    /// gdb is idle at its top-level prompt
    fn on_ready(&mut self) {}

    fn on_running_changed(&mut self, _running: bool) {}

    fn on_position_changed(&mut self, _position: &ExecutionPosition) {}

    fn on_source_info(&mut self, _info: &SourceInfo) {}

    /// Failure reported by gdb in reply to an engine-issued command
    fn on_message(&mut self, _message: &str) {}
}

/// Hook calls as values
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    UserText { text: String, is_error: bool },
    DebuggeeText(String),
    ViewUpdated { kind: ViewKind, raw: String },
    WatchChanged,
    Resync(String),
    Ready,
    RunningChanged(bool),
    PositionChanged(ExecutionPosition),
    SourceInfo(SourceInfo),
    Message(String),
}

impl EngineHooks for mpsc::UnboundedSender<EngineEvent> {
    fn append_user_text(&mut self, text: &str, is_error: bool) {
        let _ = self.send(EngineEvent::UserText {
            text: text.to_string(),
            is_error,
        });
    }

    fn append_debuggee_text(&mut self, text: &str) {
        let _ = self.send(EngineEvent::DebuggeeText(text.to_string()));
    }

    fn on_view_updated(&mut self, kind: ViewKind, raw: &str) {
        let _ = self.send(EngineEvent::ViewUpdated {
            kind,
            raw: raw.to_string(),
        });
    }

    fn on_watch_changed(&mut self) {
        let _ = self.send(EngineEvent::WatchChanged);
    }

    fn on_resync(&mut self, reason: &str) {
        let _ = self.send(EngineEvent::Resync(reason.to_string()));
    }

    fn on_ready(&mut self) {
        let _ = self.send(EngineEvent::Ready);
    }

    fn on_running_changed(&mut self, running: bool) {
        let _ = self.send(EngineEvent::RunningChanged(running));
    }

    fn on_position_changed(&mut self, position: &ExecutionPosition) {
        let _ = self.send(EngineEvent::PositionChanged(position.clone()));
    }

    fn on_source_info(&mut self, info: &SourceInfo) {
        let _ = self.send(EngineEvent::SourceInfo(info.clone()));
    }

    fn on_message(&mut self, message: &str) {
        let _ = self.send(EngineEvent::Message(message.to_string()));
    }
}

/// Hooks that record every event, for inspection after the fact
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<EngineEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All user transcript text, concatenated
    pub fn user_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::UserText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All debuggee output, concatenated
    pub fn debuggee_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::DebuggeeText(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Output appends with adjacent appends to the same destination merged
    pub fn merged_output(&self) -> Vec<EngineEvent> {
        let mut merged: Vec<EngineEvent> = Vec::new();

        for event in &self.events {
            match (merged.last_mut(), event) {
                (
                    Some(EngineEvent::UserText { text, is_error }),
                    EngineEvent::UserText { text: more, is_error: more_error },
                ) if *is_error == *more_error => text.push_str(more),
                (Some(EngineEvent::DebuggeeText(text)), EngineEvent::DebuggeeText(more)) => {
                    text.push_str(more)
                }
                (_, EngineEvent::UserText { .. }) | (_, EngineEvent::DebuggeeText(_)) => {
                    merged.push(event.clone())
                }
                _ => {}
            }
        }

        merged
    }

    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(*e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EngineHooks for EventLog {
    fn append_user_text(&mut self, text: &str, is_error: bool) {
        self.events.push(EngineEvent::UserText {
            text: text.to_string(),
            is_error,
        });
    }

    fn append_debuggee_text(&mut self, text: &str) {
        self.events.push(EngineEvent::DebuggeeText(text.to_string()));
    }

    fn on_view_updated(&mut self, kind: ViewKind, raw: &str) {
        self.events.push(EngineEvent::ViewUpdated {
            kind,
            raw: raw.to_string(),
        });
    }

    fn on_watch_changed(&mut self) {
        self.events.push(EngineEvent::WatchChanged);
    }

    fn on_resync(&mut self, reason: &str) {
        self.events.push(EngineEvent::Resync(reason.to_string()));
    }

    fn on_ready(&mut self) {
        self.events.push(EngineEvent::Ready);
    }

    fn on_running_changed(&mut self, running: bool) {
        self.events.push(EngineEvent::RunningChanged(running));
    }

    fn on_position_changed(&mut self, position: &ExecutionPosition) {
        self.events.push(EngineEvent::PositionChanged(position.clone()));
    }

    fn on_source_info(&mut self, info: &SourceInfo) {
        self.events.push(EngineEvent::SourceInfo(info.clone()));
    }

    fn on_message(&mut self, message: &str) {
        self.events.push(EngineEvent::Message(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_output_joins_adjacent_appends() {
        let mut log = EventLog::new();
        log.append_user_text("ab", false);
        log.append_user_text("c", false);
        log.on_ready();
        log.append_user_text("d", false);
        log.append_user_text("oops", true);
        log.append_debuggee_text("x");

        assert_eq!(
            log.merged_output(),
            vec![
                EngineEvent::UserText { text: "abcd".to_string(), is_error: false },
                EngineEvent::UserText { text: "oops".to_string(), is_error: true },
                EngineEvent::DebuggeeText("x".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_hooks_forward_events() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
        tx.append_debuggee_text("hello");
        tx.on_message("No symbol \"q\" in current context.");

        assert_eq!(rx.recv().await, Some(EngineEvent::DebuggeeText("hello".to_string())));
        assert!(matches!(rx.recv().await, Some(EngineEvent::Message(_))));
    }
}
