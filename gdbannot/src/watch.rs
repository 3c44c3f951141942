//! Watch-expression tree
//!
//! Watched expressions are gdb variable objects. gdb names children by
//! extending the parent's handle (`var1` → `var1.count` → `var1.count.lo`),
//! so ancestry is a matter of handle prefixes.

use serde::Serialize;

use crate::mi::{ResultRecord, Value};

/// Separator between a parent handle and a child suffix
pub const CHILD_SEPARATOR: char = '.';

/// One variable object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchVar {
    pub expression: String,
    pub handle: String,
    pub num_children: u32,
    pub type_name: String,
    pub value: Option<String>,
    pub changed: bool,
    pub in_scope: bool,
}

impl WatchVar {
    /// Build from the `-var-create` reply for `expression`
    pub fn from_create_record(expression: &str, record: &ResultRecord) -> Option<Self> {
        Some(WatchVar {
            expression: expression.to_string(),
            handle: record.field("name")?.to_string(),
            num_children: record.field("numchild").and_then(|n| n.parse().ok()).unwrap_or(0),
            type_name: record.field("type").unwrap_or_default().to_string(),
            value: record.field("value").map(str::to_string),
            changed: false,
            in_scope: true,
        })
    }

    /// Children listed in a `-var-list-children` reply
    pub fn children_from_record(record: &ResultRecord) -> Vec<WatchVar> {
        let Some(children) = record.results.get("children").and_then(Value::as_list) else {
            return Vec::new();
        };

        children
            .iter()
            .filter_map(Value::as_tuple)
            .filter_map(|child| {
                let field = |key: &str| child.get(key).and_then(Value::as_string);
                Some(WatchVar {
                    expression: field("exp")?.to_string(),
                    handle: field("name")?.to_string(),
                    num_children: field("numchild").and_then(|n| n.parse().ok()).unwrap_or(0),
                    type_name: field("type").unwrap_or_default().to_string(),
                    value: field("value").map(str::to_string),
                    changed: false,
                    in_scope: true,
                })
            })
            .collect()
    }

    pub fn is_root(&self) -> bool {
        is_root_handle(&self.handle)
    }

    pub fn is_leaf(&self) -> bool {
        self.num_children == 0
    }

    /// Whether this var is `ancestor` or lies below it
    pub fn is_within(&self, ancestor: &str) -> bool {
        self.handle == ancestor || self.is_below(ancestor)
    }

    /// Whether this var lies strictly below `ancestor`
    pub fn is_below(&self, ancestor: &str) -> bool {
        self.handle
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with(CHILD_SEPARATOR))
    }
}

pub fn is_root_handle(handle: &str) -> bool {
    !handle.contains(CHILD_SEPARATOR)
}

/// Forest of variable objects in display order: each child follows its
/// parent's earlier children
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchTree {
    vars: Vec<WatchVar>,
}

impl WatchTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchVar> {
        self.vars.iter()
    }

    pub fn get(&self, handle: &str) -> Option<&WatchVar> {
        self.vars.iter().find(|v| v.handle == handle)
    }

    pub fn contains_handle(&self, handle: &str) -> bool {
        self.get(handle).is_some()
    }

    /// Whether a root watch already exists for `expression`
    pub fn contains_expression(&self, expression: &str) -> bool {
        self.vars.iter().any(|v| v.is_root() && v.expression == expression)
    }

    pub fn roots(&self) -> impl Iterator<Item = &WatchVar> {
        self.vars.iter().filter(|v| v.is_root())
    }

    /// Direct children of `handle`
    pub fn children<'a>(&'a self, handle: &'a str) -> impl Iterator<Item = &'a WatchVar> + 'a {
        self.vars.iter().filter(move |v| {
            v.handle
                .strip_prefix(handle)
                .and_then(|rest| rest.strip_prefix(CHILD_SEPARATOR))
                .is_some_and(|suffix| !suffix.contains(CHILD_SEPARATOR))
        })
    }

    pub fn insert_root(&mut self, var: WatchVar) {
        self.vars.push(var);
    }

    /// Insert children under `parent`, skipping handles already present
    ///
    /// Returns the handles of inserted leaves. Nothing is inserted under a
    /// missing parent or a parent declared childless.
    pub fn insert_children(&mut self, parent: &str, children: Vec<WatchVar>) -> Vec<String> {
        let Some(parent_var) = self.get(parent) else {
            return Vec::new();
        };
        if parent_var.is_leaf() {
            return Vec::new();
        }

        let mut position = self.subtree_end(parent);
        let mut leaves = Vec::new();

        for child in children {
            if self.contains_handle(&child.handle) || !child.is_below(parent) {
                log::debug!("Skipping watch child {}", child.handle);
                continue;
            }
            if child.is_leaf() {
                leaves.push(child.handle.clone());
            }
            self.vars.insert(position, child);
            position += 1;
        }

        leaves
    }

    /// Remove every descendant of `handle`, keeping `handle` itself
    pub fn remove_descendants(&mut self, handle: &str) -> usize {
        let before = self.vars.len();
        self.vars.retain(|v| !v.is_below(handle));
        before - self.vars.len()
    }

    /// Remove `handle` and all of its descendants
    pub fn remove_tree(&mut self, handle: &str) -> usize {
        let before = self.vars.len();
        self.vars.retain(|v| !v.is_within(handle));
        before - self.vars.len()
    }

    /// Record a freshly evaluated value
    pub fn set_value(&mut self, handle: &str, value: String, changed: bool) -> bool {
        match self.vars.iter_mut().find(|v| v.handle == handle) {
            Some(var) => {
                var.value = Some(value);
                var.in_scope = true;
                if changed {
                    var.changed = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn set_in_scope(&mut self, handle: &str, in_scope: bool) {
        if let Some(var) = self.vars.iter_mut().find(|v| v.handle == handle) {
            var.in_scope = in_scope;
        }
    }

    pub fn clear_changed(&mut self) {
        for var in &mut self.vars {
            var.changed = false;
        }
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Index just past the last var within `handle`'s subtree
    fn subtree_end(&self, handle: &str) -> usize {
        self.vars
            .iter()
            .rposition(|v| v.is_within(handle))
            .map(|i| i + 1)
            .unwrap_or(self.vars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(handle: &str, expression: &str, num_children: u32) -> WatchVar {
        WatchVar {
            expression: expression.to_string(),
            handle: handle.to_string(),
            num_children,
            type_name: "int".to_string(),
            value: None,
            changed: false,
            in_scope: true,
        }
    }

    fn handles(tree: &WatchTree) -> Vec<&str> {
        tree.iter().map(|v| v.handle.as_str()).collect()
    }

    #[test]
    fn test_children_follow_parent() {
        let mut tree = WatchTree::new();
        tree.insert_root(var("var1", "s", 2));
        tree.insert_root(var("var2", "t", 0));

        let leaves = tree.insert_children("var1", vec![var("var1.a", "a", 0), var("var1.b", "b", 1)]);

        assert_eq!(leaves, vec!["var1.a".to_string()]);
        assert_eq!(handles(&tree), vec!["var1", "var1.a", "var1.b", "var2"]);
        assert_eq!(tree.children("var1").count(), 2);
    }

    #[test]
    fn test_leaf_never_gets_children() {
        let mut tree = WatchTree::new();
        tree.insert_root(var("var1", "x", 0));

        let leaves = tree.insert_children("var1", vec![var("var1.a", "a", 0)]);

        assert!(leaves.is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_existing_handles_are_skipped() {
        let mut tree = WatchTree::new();
        tree.insert_root(var("var1", "s", 1));
        tree.insert_children("var1", vec![var("var1.a", "a", 0)]);

        let leaves = tree.insert_children("var1", vec![var("var1.a", "a", 0)]);

        assert!(leaves.is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_remove_tree_matches_whole_components() {
        let mut tree = WatchTree::new();
        tree.insert_root(var("var1", "s", 1));
        tree.insert_children("var1", vec![var("var1.a", "a", 0)]);
        tree.insert_root(var("var10", "u", 0));

        assert_eq!(tree.remove_tree("var1"), 2);
        assert_eq!(handles(&tree), vec!["var10"]);
    }

    #[test]
    fn test_remove_descendants_keeps_node() {
        let mut tree = WatchTree::new();
        tree.insert_root(var("var1", "s", 1));
        tree.insert_children("var1", vec![var("var1.p", "p", 1)]);
        tree.insert_children("var1.p", vec![var("var1.p.x", "x", 0)]);

        assert_eq!(tree.remove_descendants("var1"), 2);
        assert_eq!(handles(&tree), vec!["var1"]);
    }

    #[test]
    fn test_set_value_marks_changed() {
        let mut tree = WatchTree::new();
        tree.insert_root(var("var1", "x", 0));

        assert!(tree.set_value("var1", "7".to_string(), true));
        assert!(tree.get("var1").unwrap().changed);
        tree.clear_changed();
        assert!(!tree.get("var1").unwrap().changed);
        assert!(!tree.set_value("var9", "1".to_string(), false));
    }

    #[test]
    fn test_is_root_handle() {
        assert!(is_root_handle("var3"));
        assert!(!is_root_handle("var3.field"));
    }
}
