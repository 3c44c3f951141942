//! Annotation-stream protocol engine
//!
//! The engine sits between gdb running with `--annotate=3` and presentation
//! code. Output chunks go in through [`Engine::feed`]; the engine splits them
//! into text and annotations, routes text according to the current
//! [`SinkPhase`], advances the phase on annotations and keeps exactly one
//! command in flight. Commands to write are collected in an outbox drained
//! with [`Engine::take_outgoing`].
//!
//! The engine does no I/O and never blocks; the async driver lives in
//! [`crate::session`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::commands;
use crate::config::EngineConfig;
use crate::events::EngineHooks;
use crate::mi::{self, ResultRecord, Value};
use crate::parser::{parse_source_argument, AnnotationScanner};
use crate::queue::{CommandEntry, CommandQueue, Completion};
use crate::refresh::{PendingTriggers, RefreshRegistry, Trigger, FAN_OUT};
use crate::types::{Annotation, AnnotationTag, ExecutionPosition, Segment, SinkPhase, ViewKind};
use crate::views::{parse_source_info, ViewStore};
use crate::watch::{is_root_handle, WatchTree, WatchVar};
use crate::{GdbError, Result};

/// Failure phrases gdb prints in place of a reply
static FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(No symbol .*|.* not defined in current context.*|Cannot access memory at address .*|No frame selected\.|No stack\.)$",
    )
    .expect("valid regex")
});

/// Mutable protocol state of one gdb session
#[derive(Debug)]
pub struct EngineState {
    pub queue: CommandQueue,
    pub in_flight: Option<CommandEntry>,
    pub phase: SinkPhase,
    /// gdb is waiting for input and nothing is in flight
    pub prompting: bool,
    pub pending: PendingTriggers,
    /// Discard output until gdb is idle again
    pub flushing: bool,
    /// Text for the transcript is currently an error message
    pub error: bool,
    pub running: bool,
    /// The debuggee exists, whether running or stopped
    pub active: bool,
    pub position: Option<ExecutionPosition>,
    /// Reply of the in-flight tracked command
    pub capture: String,
    /// Expressions with a creation request in flight or queued
    pub creating: BTreeSet<String>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            queue: CommandQueue::new(),
            in_flight: None,
            phase: SinkPhase::User,
            prompting: false,
            pending: PendingTriggers::default(),
            flushing: false,
            error: false,
            running: false,
            active: false,
            position: None,
            capture: String::new(),
            creating: BTreeSet::new(),
        }
    }
}

/// Serialisable picture of the engine, for front ends and debugging
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: SinkPhase,
    pub idle: bool,
    pub running: bool,
    pub active: bool,
    pub position: Option<ExecutionPosition>,
    pub in_flight: Option<String>,
    pub queued: Vec<String>,
    pub pending: Vec<Trigger>,
    pub views: ViewStore,
    pub watch: WatchTree,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The protocol engine of one gdb session
pub struct Engine<H: EngineHooks> {
    config: EngineConfig,
    hooks: H,
    scanner: AnnotationScanner,
    state: EngineState,
    registry: RefreshRegistry,
    views: ViewStore,
    watch: WatchTree,
    watch_visible: bool,
    outgoing: Vec<String>,
}

impl<H: EngineHooks> Engine<H> {
    pub fn new(config: EngineConfig, hooks: H) -> Self {
        Engine {
            config,
            hooks,
            scanner: AnnotationScanner::new(),
            state: EngineState::default(),
            registry: RefreshRegistry::new(),
            views: ViewStore::new(),
            watch: WatchTree::new(),
            watch_visible: false,
            outgoing: Vec::new(),
        }
    }

    /// Queue the commands every session starts with
    pub fn start_session(&mut self) {
        for (command, source_info) in commands::setup_commands(&self.config) {
            let completion = if source_info {
                Completion::SourceInfo
            } else {
                Completion::Ignore
            };
            self.enqueue(CommandEntry::tracked(command, completion));
        }
    }

    /// Tear the session down, dropping everything queued or cached
    pub fn shutdown(&mut self) {
        log::debug!(
            "Engine shutdown with {} queued command(s)",
            self.state.queue.len()
        );
        self.state = EngineState::default();
        self.scanner.reset();
        self.registry.reset();
        self.views.reset();
        self.watch.clear();
        self.watch_visible = false;
        self.outgoing.clear();
    }

    // ---- input ----

    /// Process a chunk of gdb output
    pub fn feed(&mut self, chunk: &str) {
        let segments = self.scanner.scan(chunk);
        self.process(segments);
    }

    /// Process a chunk of raw gdb output, which may split UTF-8 sequences
    pub fn feed_bytes(&mut self, chunk: &[u8]) {
        let segments = self.scanner.scan_bytes(chunk);
        self.process(segments);
    }

    fn process(&mut self, segments: Vec<Segment>) {
        for segment in segments {
            match segment {
                Segment::Text(text) => self.route(&text),
                Segment::Annotation(annotation) => self.dispatch(annotation),
            }
        }
    }

    /// Append plain text to the destination of the current phase
    fn route(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.state.flushing {
            log::trace!("Flushing {} byte(s)", text.len());
            return;
        }

        match self.state.phase {
            SinkPhase::User => self.hooks.append_user_text(text, self.state.error),
            SinkPhase::Inferior => self.hooks.append_debuggee_text(text),
            SinkPhase::Capture => self.state.capture.push_str(text),
            SinkPhase::PreCapture | SinkPhase::PostCapture => {
                log::trace!("Discarding {:?} in {}", text, self.state.phase);
            }
        }
    }

    fn dispatch(&mut self, annotation: Annotation) {
        log::debug!(
            "ANNOT: {} {} (phase {})",
            annotation.tag,
            annotation.argument.as_deref().unwrap_or(""),
            self.state.phase
        );

        if self.state.flushing {
            if annotation.tag == AnnotationTag::Prompt {
                self.state.flushing = false;
                self.state.phase = SinkPhase::User;
                self.next_command();
            }
            return;
        }

        let phase = self.state.phase;
        let separate_io = self.config.separate_io;

        match &annotation.tag {
            AnnotationTag::PrePrompt => match phase {
                SinkPhase::User => {}
                SinkPhase::Capture => self.state.phase = SinkPhase::PostCapture,
                _ => self.violation(&annotation),
            },
            AnnotationTag::Prompt => match phase {
                SinkPhase::PostCapture => {
                    self.state.phase = SinkPhase::User;
                    self.finish_in_flight();
                    self.next_command();
                }
                SinkPhase::User => {
                    self.finish_in_flight();
                    self.next_command();
                }
                _ => self.violation(&annotation),
            },
            AnnotationTag::Commands
            | AnnotationTag::OverloadChoice
            | AnnotationTag::Query
            | AnnotationTag::NQuery
            | AnnotationTag::PromptForContinue => {
                // Queued commands wait for the next top-level prompt.
                self.state.prompting = true;
            }
            AnnotationTag::PostPrompt => match phase {
                SinkPhase::User => self.fan_out(),
                SinkPhase::PreCapture => self.state.phase = SinkPhase::Capture,
                _ => self.violation(&annotation),
            },
            AnnotationTag::Source => {
                match annotation.argument.as_deref().and_then(parse_source_argument) {
                    Some(position) => {
                        self.hooks.on_position_changed(&position);
                        self.state.position = Some(position);
                    }
                    None => log::warn!("Unparseable source annotation: {:?}", annotation.argument),
                }
                if phase == SinkPhase::Inferior {
                    self.state.phase = SinkPhase::User;
                }
            }
            AnnotationTag::Starting => {
                self.set_running(true);
                self.state.active = true;
                match phase {
                    SinkPhase::User if separate_io => self.state.phase = SinkPhase::Inferior,
                    SinkPhase::User => {}
                    _ => self.violation(&annotation),
                }
            }
            AnnotationTag::Signal | AnnotationTag::Breakpoint | AnnotationTag::Watchpoint => {
                self.leave_inferior(&annotation);
            }
            AnnotationTag::Exited | AnnotationTag::Signalled => {
                self.set_running(false);
                self.state.active = false;
                self.leave_inferior(&annotation);
            }
            AnnotationTag::FrameBegin => match phase {
                SinkPhase::Inferior => self.state.phase = SinkPhase::User,
                SinkPhase::User | SinkPhase::Capture => {}
                _ => self.violation(&annotation),
            },
            AnnotationTag::Stopped => {
                self.set_running(false);
                match phase {
                    SinkPhase::Inferior => self.state.phase = SinkPhase::User,
                    SinkPhase::User => {}
                    _ => self.violation(&annotation),
                }
            }
            AnnotationTag::ErrorBegin | AnnotationTag::Error => {
                self.state.error = !self.state.error;
            }
            AnnotationTag::Other(name) => log::trace!("Ignoring annotation {}", name),
        }
    }

    /// Debuggee stopped reporting: leave its I/O when it has its own destination
    fn leave_inferior(&mut self, annotation: &Annotation) {
        if !self.config.separate_io {
            return;
        }
        match self.state.phase {
            SinkPhase::Inferior => self.state.phase = SinkPhase::User,
            _ => self.violation(annotation),
        }
    }

    fn set_running(&mut self, running: bool) {
        if self.state.running != running {
            self.state.running = running;
            self.hooks.on_running_changed(running);
        }
    }

    fn violation(&mut self, annotation: &Annotation) {
        let reason = format!(
            "unexpected {} annotation in {} phase",
            annotation.tag, self.state.phase
        );
        self.resync(&reason);
    }

    /// Drop everything in flight or queued and wait for gdb to go idle
    pub fn resync(&mut self, reason: &str) {
        log::error!(
            "Protocol violation: {}; dropping {} queued command(s)",
            reason,
            self.state.queue.len()
        );

        self.state.capture.clear();
        self.state.in_flight = None;
        self.state.queue.clear();
        self.state.phase = SinkPhase::User;
        self.set_running(false);
        self.state.pending.clear();
        self.state.creating.clear();
        self.state.prompting = true;
        self.state.flushing = true;

        self.hooks.on_resync(reason);
    }

    /// Finalize the command that just got its prompt
    fn finish_in_flight(&mut self) {
        match self.state.in_flight.take() {
            Some(CommandEntry::Tracked { command, completion }) => {
                let capture = std::mem::take(&mut self.state.capture);
                log::debug!("Completed {:?} with {} byte(s)", command.trim_end(), capture.len());
                self.complete(completion, &capture);
            }
            Some(CommandEntry::Raw(_)) | None => {}
        }
    }

    /// Send the next queued command, or go idle
    fn next_command(&mut self) {
        match self.state.queue.pop_front() {
            Some(entry) => self.send(entry),
            None => {
                self.state.prompting = true;
                self.hooks.on_ready();
            }
        }
    }

    /// A user command started: refresh every demanded view not already pending
    fn fan_out(&mut self) {
        for kind in FAN_OUT {
            self.trigger(kind, false);
        }
        if self.watch_visible && !self.watch.is_empty() {
            self.request_watch_update();
        }
    }

    // ---- sending ----

    fn enqueue(&mut self, entry: CommandEntry) {
        if self.state.prompting {
            self.send(entry);
        } else {
            self.state.queue.push_back(entry);
        }
    }

    /// Queue work caused by a reply ahead of unrelated commands
    fn enqueue_follow_up(&mut self, entry: CommandEntry) {
        if self.state.prompting {
            self.send(entry);
        } else {
            self.state.queue.push_follow_up(entry);
        }
    }

    fn send(&mut self, entry: CommandEntry) {
        self.state.prompting = false;
        self.state.flushing = false;

        if entry.is_tracked() {
            self.state.capture.clear();
            self.state.phase = SinkPhase::PreCapture;
        } else {
            self.state.phase = SinkPhase::User;
        }

        log::debug!("SEND: {:?}", entry.text());
        self.outgoing.push(entry.text().to_string());
        self.state.in_flight = Some(entry);
    }

    /// Commands waiting to be written to gdb, in order
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    // ---- consumer interface ----

    /// Send a line typed by the user
    ///
    /// While the debuggee runs the line is meant for it and is written
    /// straight through.
    pub fn submit(&mut self, text: &str) {
        let line = commands::user_line(text);
        if self.state.running {
            log::debug!("SEND (bypass): {:?}", line);
            self.outgoing.push(line);
        } else {
            self.enqueue(CommandEntry::Raw(line));
        }
    }

    /// Send a command whose reply goes to `on_complete` instead of the transcript
    pub fn submit_tracked<F>(&mut self, text: &str, on_complete: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let line = commands::user_line(text);
        self.enqueue(CommandEntry::tracked(line, Completion::Callback(Box::new(on_complete))));
    }

    /// Ask for a view refresh; false when not demanded or already pending
    pub fn refresh(&mut self, kind: ViewKind) -> bool {
        self.trigger(kind, false)
    }

    fn trigger(&mut self, kind: ViewKind, follow_up: bool) -> bool {
        if !self.registry.is_demanded(kind, &self.config) {
            return false;
        }
        if self.state.pending.contains(Trigger::View(kind)) {
            log::trace!("Refresh of {} already pending", kind);
            return false;
        }
        let Some(command) = self.registry.rule(kind).command(&self.config) else {
            return false;
        };

        self.state.pending.insert(Trigger::View(kind));
        let entry = CommandEntry::tracked(command, Completion::View(kind));
        if follow_up {
            self.enqueue_follow_up(entry);
        } else {
            self.enqueue(entry);
        }
        true
    }

    /// Show or hide a view; a newly shown view is refreshed
    pub fn set_view_visible(&mut self, kind: ViewKind, visible: bool) {
        let was_visible = self.registry.is_shown(kind);
        self.registry.set_shown(kind, visible);
        if visible && !was_visible {
            self.refresh(kind);
        }
    }

    pub fn is_view_visible(&self, kind: ViewKind) -> bool {
        self.registry.is_shown(kind)
    }

    pub fn is_watch_visible(&self) -> bool {
        self.watch_visible
    }

    /// Show or hide the watch display; showing it updates the watches
    pub fn set_watch_visible(&mut self, visible: bool) {
        let was_visible = self.watch_visible;
        self.watch_visible = visible;
        if visible && !was_visible && !self.watch.is_empty() {
            self.request_watch_update();
        }
    }

    // ---- watch expressions ----

    /// Create a root watch for `expression`
    pub fn watch_create(&mut self, expression: &str) -> Result<()> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(GdbError::InvalidWatch("empty expression".into()));
        }
        if self.watch.contains_expression(expression) || self.state.creating.contains(expression) {
            return Err(GdbError::DuplicateWatch(expression.to_string()));
        }

        self.state.creating.insert(expression.to_string());
        let command = commands::var_create(&self.config, expression);
        self.enqueue(CommandEntry::tracked(
            command,
            Completion::WatchCreate {
                expression: expression.to_string(),
            },
        ));
        Ok(())
    }

    /// List the children of `handle`
    pub fn watch_expand(&mut self, handle: &str) -> Result<()> {
        let var = self
            .watch
            .get(handle)
            .ok_or_else(|| GdbError::UnknownWatch(handle.to_string()))?;
        if var.is_leaf() {
            return Err(GdbError::NoChildren(handle.to_string()));
        }
        if self.watch.children(handle).next().is_some() {
            log::debug!("Watch {} already expanded", handle);
            return Ok(());
        }

        let command = commands::var_list_children(&self.config, handle);
        self.enqueue(CommandEntry::tracked(
            command,
            Completion::WatchChildren {
                handle: handle.to_string(),
            },
        ));
        Ok(())
    }

    /// Drop the children of `handle` from the tree
    pub fn watch_collapse(&mut self, handle: &str) -> Result<()> {
        if !self.watch.contains_handle(handle) {
            return Err(GdbError::UnknownWatch(handle.to_string()));
        }
        if self.watch.remove_descendants(handle) > 0 {
            self.hooks.on_watch_changed();
        }
        Ok(())
    }

    /// Ask gdb which watches changed; false when already pending or nothing is watched
    pub fn watch_update_all(&mut self) -> bool {
        if self.watch.is_empty() {
            return false;
        }
        self.request_watch_update()
    }

    fn request_watch_update(&mut self) -> bool {
        if !self.state.pending.insert(Trigger::WatchUpdate) {
            return false;
        }
        let command = commands::var_update(&self.config);
        self.enqueue(CommandEntry::tracked(command, Completion::WatchUpdate));
        true
    }

    /// Delete a root watch together with its children
    pub fn watch_delete(&mut self, handle: &str) -> Result<()> {
        if !is_root_handle(handle) {
            return Err(GdbError::NotRootWatch(handle.to_string()));
        }
        if !self.watch.contains_handle(handle) {
            return Err(GdbError::UnknownWatch(handle.to_string()));
        }

        self.watch.remove_tree(handle);
        let command = commands::var_delete(&self.config, handle);
        self.enqueue(CommandEntry::tracked(command, Completion::Ignore));
        self.hooks.on_watch_changed();
        Ok(())
    }

    fn evaluate(&mut self, handle: String, changed: bool) {
        let command = commands::var_evaluate(&self.config, &handle);
        self.enqueue_follow_up(CommandEntry::tracked(
            command,
            Completion::WatchValue { handle, changed },
        ));
    }

    // ---- completions ----

    fn complete(&mut self, completion: Completion, capture: &str) {
        self.state.queue.begin_follow_ups();

        match completion {
            Completion::Ignore => {}
            Completion::Callback(on_complete) => on_complete(capture),
            Completion::View(kind) => {
                self.state.pending.remove(Trigger::View(kind));
                self.views.apply(kind, capture);
                self.hooks.on_view_updated(kind, capture);
                for follow in self.registry.rule(kind).follow_ups {
                    self.trigger(*follow, true);
                }
            }
            Completion::SourceInfo => {
                self.views.source = parse_source_info(capture);
                self.hooks.on_source_info(&self.views.source);
            }
            Completion::WatchCreate { expression } => {
                self.state.creating.remove(&expression);
                self.watch_created(&expression, capture);
            }
            Completion::WatchChildren { handle } => self.watch_children(&handle, capture),
            Completion::WatchValue { handle, changed } => {
                self.watch_value(&handle, changed, capture)
            }
            Completion::WatchUpdate => {
                self.state.pending.remove(Trigger::WatchUpdate);
                self.watch_changelist(capture);
            }
        }
    }

    /// Result record of a watch reply, reporting gdb's failures as messages
    fn watch_record(&mut self, capture: &str) -> Option<ResultRecord> {
        match mi::find_result_record(capture) {
            Some(record) => {
                if let Some(message) = record.error_message() {
                    self.hooks.on_message(message);
                    return None;
                }
                Some(record)
            }
            None => {
                match failure_message(capture) {
                    Some(message) => self.hooks.on_message(message),
                    None => log::warn!("No result record in watch reply: {:?}", capture),
                }
                None
            }
        }
    }

    fn watch_created(&mut self, expression: &str, capture: &str) {
        let Some(record) = self.watch_record(capture) else {
            return;
        };
        let Some(var) = WatchVar::from_create_record(expression, &record) else {
            log::warn!("Watch creation reply without a name: {:?}", capture);
            return;
        };

        let leaf = var.is_leaf().then(|| var.handle.clone());
        self.watch.insert_root(var);
        if let Some(handle) = leaf {
            self.evaluate(handle, false);
        }
        self.hooks.on_watch_changed();
    }

    fn watch_children(&mut self, handle: &str, capture: &str) {
        let Some(record) = self.watch_record(capture) else {
            return;
        };
        let children = WatchVar::children_from_record(&record);
        for leaf in self.watch.insert_children(handle, children) {
            self.evaluate(leaf, false);
        }
        self.hooks.on_watch_changed();
    }

    fn watch_value(&mut self, handle: &str, changed: bool, capture: &str) {
        let Some(record) = self.watch_record(capture) else {
            return;
        };
        match record.field("value") {
            Some(value) => {
                if self.watch.set_value(handle, value.to_string(), changed) {
                    self.hooks.on_watch_changed();
                }
            }
            None => log::warn!("Watch value reply without a value for {}", handle),
        }
    }

    fn watch_changelist(&mut self, capture: &str) {
        let Some(record) = self.watch_record(capture) else {
            return;
        };
        self.watch.clear_changed();

        let changes = record
            .results
            .get("changelist")
            .and_then(Value::as_list)
            .cloned()
            .unwrap_or_default();

        for change in changes.iter().filter_map(Value::as_tuple) {
            let Some(handle) = change.get("name").and_then(Value::as_string) else {
                continue;
            };
            if !self.watch.contains_handle(handle) {
                continue;
            }
            let in_scope = change.get("in_scope").and_then(Value::as_string);
            if in_scope == Some("false") {
                self.watch.set_in_scope(handle, false);
            } else {
                self.evaluate(handle.to_string(), true);
            }
        }
        self.hooks.on_watch_changed();
    }

    // ---- accessors ----

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn current_execution_position(&self) -> Option<&ExecutionPosition> {
        self.state.position.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn is_idle(&self) -> bool {
        self.state.prompting
    }

    pub fn is_error(&self) -> bool {
        self.state.error
    }

    pub fn is_flushing(&self) -> bool {
        self.state.flushing
    }

    pub fn phase(&self) -> SinkPhase {
        self.state.phase
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Text of the command in flight
    pub fn in_flight(&self) -> Option<&str> {
        self.state.in_flight.as_ref().map(CommandEntry::text)
    }

    pub fn queued(&self) -> Vec<&str> {
        self.state.queue.texts()
    }

    pub fn pending(&self) -> Vec<Trigger> {
        self.state.pending.iter().copied().collect()
    }

    pub fn views(&self) -> &ViewStore {
        &self.views
    }

    pub fn watch(&self) -> &WatchTree {
        &self.watch
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.state.phase,
            idle: self.state.prompting,
            running: self.state.running,
            active: self.state.active,
            position: self.state.position.clone(),
            in_flight: self.in_flight().map(str::to_string),
            queued: self.queued().into_iter().map(str::to_string).collect(),
            pending: self.pending(),
            views: self.views.clone(),
            watch: self.watch.clone(),
        }
    }
}

/// First known failure phrase in a capture
pub fn failure_message(capture: &str) -> Option<&str> {
    FAILURE
        .captures(capture)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
