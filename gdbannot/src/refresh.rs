//! Auto-refresh registry
//!
//! Every view is described by a [`ViewRule`]: when it is wanted, what to ask
//! gdb, and which views to refresh once its reply lands. Together with the
//! pending-trigger set this keeps at most one refresh per view in flight.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::commands;
use crate::config::EngineConfig;
use crate::types::ViewKind;

/// Something that may have at most one outstanding refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    View(ViewKind),
    WatchUpdate,
}

/// Inputs of a demand predicate
pub struct DemandContext<'a> {
    /// The consumer currently displays the view
    pub shown: bool,
    pub config: &'a EngineConfig,
}

/// Static description of one view
#[derive(Clone, Copy)]
pub struct ViewRule {
    pub kind: ViewKind,
    demand: fn(&DemandContext) -> bool,
    command: fn(&EngineConfig, ViewKind) -> Option<String>,
    /// Views refreshed after this one's reply has been applied
    pub follow_ups: &'static [ViewKind],
}

impl ViewRule {
    pub fn is_demanded(&self, ctx: &DemandContext) -> bool {
        (self.demand)(ctx)
    }

    pub fn command(&self, config: &EngineConfig) -> Option<String> {
        (self.command)(config, self.kind)
    }
}

fn always(_: &DemandContext) -> bool {
    true
}

fn when_shown(ctx: &DemandContext) -> bool {
    ctx.shown
}

fn when_shown_with_address(ctx: &DemandContext) -> bool {
    ctx.shown && ctx.config.memory.address.is_some()
}

const RULES: [ViewRule; 8] = [
    ViewRule {
        kind: ViewKind::Frame,
        demand: always,
        command: commands::view_command,
        follow_ups: &[ViewKind::Stack, ViewKind::Disassembly],
    },
    ViewRule {
        kind: ViewKind::Breakpoints,
        demand: always,
        command: commands::view_command,
        follow_ups: &[],
    },
    ViewRule {
        kind: ViewKind::Stack,
        demand: when_shown,
        command: commands::view_command,
        follow_ups: &[],
    },
    ViewRule {
        kind: ViewKind::Locals,
        demand: when_shown,
        command: commands::view_command,
        follow_ups: &[],
    },
    ViewRule {
        kind: ViewKind::Registers,
        demand: when_shown,
        command: commands::view_command,
        follow_ups: &[],
    },
    ViewRule {
        kind: ViewKind::Memory,
        demand: when_shown_with_address,
        command: commands::view_command,
        follow_ups: &[],
    },
    ViewRule {
        kind: ViewKind::Threads,
        demand: when_shown,
        command: commands::view_command,
        follow_ups: &[],
    },
    ViewRule {
        kind: ViewKind::Disassembly,
        demand: when_shown,
        command: commands::view_command,
        follow_ups: &[],
    },
];

/// Views refreshed directly when gdb starts a new top-level command; stack
/// and disassembly follow from the frame reply
pub const FAN_OUT: [ViewKind; 6] = [
    ViewKind::Frame,
    ViewKind::Breakpoints,
    ViewKind::Registers,
    ViewKind::Memory,
    ViewKind::Locals,
    ViewKind::Threads,
];

/// Rules plus which views the consumer currently shows
#[derive(Debug, Default)]
pub struct RefreshRegistry {
    shown: BTreeSet<ViewKind>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(&self, kind: ViewKind) -> &'static ViewRule {
        let index = ViewKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &RULES[index]
    }

    pub fn set_shown(&mut self, kind: ViewKind, shown: bool) {
        if shown {
            self.shown.insert(kind);
        } else {
            self.shown.remove(&kind);
        }
    }

    pub fn is_shown(&self, kind: ViewKind) -> bool {
        self.shown.contains(&kind)
    }

    /// Whether `kind` should be refreshed right now
    pub fn is_demanded(&self, kind: ViewKind, config: &EngineConfig) -> bool {
        let ctx = DemandContext {
            shown: self.is_shown(kind),
            config,
        };
        self.rule(kind).is_demanded(&ctx)
    }

    pub fn reset(&mut self) {
        self.shown.clear();
    }
}

/// Views and watch updates with an unanswered refresh request
#[derive(Debug, Clone, Default, Serialize)]
pub struct PendingTriggers {
    set: BTreeSet<Trigger>,
}

impl PendingTriggers {
    /// Mark `trigger` pending; false when it already was
    pub fn insert(&mut self, trigger: Trigger) -> bool {
        self.set.insert(trigger)
    }

    pub fn remove(&mut self, trigger: Trigger) -> bool {
        self.set.remove(&trigger)
    }

    pub fn contains(&self, trigger: Trigger) -> bool {
        self.set.contains(&trigger)
    }

    pub fn clear(&mut self) {
        self.set.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.set.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_are_indexed_by_kind() {
        let registry = RefreshRegistry::new();
        for kind in ViewKind::ALL {
            assert_eq!(registry.rule(kind).kind, kind);
        }
    }

    #[test]
    fn test_demand_follows_visibility() {
        let config = EngineConfig::default();
        let mut registry = RefreshRegistry::new();

        assert!(registry.is_demanded(ViewKind::Frame, &config));
        assert!(registry.is_demanded(ViewKind::Breakpoints, &config));
        assert!(!registry.is_demanded(ViewKind::Locals, &config));

        registry.set_shown(ViewKind::Locals, true);
        assert!(registry.is_demanded(ViewKind::Locals, &config));
    }

    #[test]
    fn test_memory_needs_address() {
        let mut config = EngineConfig::default();
        let mut registry = RefreshRegistry::new();
        registry.set_shown(ViewKind::Memory, true);

        assert!(!registry.is_demanded(ViewKind::Memory, &config));
        config.memory.address = Some("0x601040".to_string());
        assert!(registry.is_demanded(ViewKind::Memory, &config));
    }

    #[test]
    fn test_frame_drives_stack_and_disassembly() {
        let registry = RefreshRegistry::new();
        assert_eq!(
            registry.rule(ViewKind::Frame).follow_ups,
            &[ViewKind::Stack, ViewKind::Disassembly]
        );
    }

    #[test]
    fn test_pending_rejects_duplicates() {
        let mut pending = PendingTriggers::default();
        assert!(pending.insert(Trigger::View(ViewKind::Stack)));
        assert!(!pending.insert(Trigger::View(ViewKind::Stack)));
        assert_eq!(pending.len(), 1);
    }
}
