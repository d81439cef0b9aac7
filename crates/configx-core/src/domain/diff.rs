//! Leaf-level differences between two trees.
//!
//! Entries come out in key-path traversal order: depth-first over the old
//! tree's insertion order, with keys that only exist in the new tree visited
//! after the old tree's keys at the same level, in the new tree's order.

use std::fmt;

use crate::domain::node::{Branch, ConfigNode, Value};
use crate::domain::path::KeyPath;

/// One changed leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub path: KeyPath,
    /// Value in the old tree, `None` if the leaf did not exist there.
    pub old: Option<Value>,
    /// Value in the new tree, `None` if the leaf does not exist there.
    pub new: Option<Value>,
}

/// Classification of a [`DiffEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed,
    Modified,
}

impl DiffEntry {
    pub fn change(&self) -> Change {
        match (&self.old, &self.new) {
            (None, _) => Change::Added,
            (_, None) => Change::Removed,
            _ => Change::Modified,
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.old, &self.new) {
            (None, Some(new)) => write!(f, "+ {} = {new}", self.path),
            (Some(old), None) => write!(f, "- {} = {old}", self.path),
            (Some(old), Some(new)) => write!(f, "~ {} = {old} -> {new}", self.path),
            (None, None) => write!(f, "  {}", self.path),
        }
    }
}

pub(crate) fn diff_branches(
    old: &Branch,
    new: &Branch,
    prefix: &mut Vec<String>,
    out: &mut Vec<DiffEntry>,
) {
    for (name, old_node) in old.iter() {
        prefix.push(name.to_string());
        match new.get(name) {
            Some(new_node) => diff_nodes(old_node, new_node, prefix, out),
            None => emit_all(old_node, prefix, out, Side::Old),
        }
        prefix.pop();
    }

    for (name, new_node) in new.iter() {
        if old.contains(name) {
            continue;
        }
        prefix.push(name.to_string());
        emit_all(new_node, prefix, out, Side::New);
        prefix.pop();
    }
}

fn diff_nodes(old: &ConfigNode, new: &ConfigNode, prefix: &mut Vec<String>, out: &mut Vec<DiffEntry>) {
    match (old, new) {
        (ConfigNode::Leaf(a), ConfigNode::Leaf(b)) => {
            if !a.same_as(b) {
                out.push(DiffEntry {
                    path: KeyPath::from_trusted(prefix.clone()),
                    old: Some(a.clone()),
                    new: Some(b.clone()),
                });
            }
        }
        (ConfigNode::Branch(a), ConfigNode::Branch(b)) => diff_branches(a, b, prefix, out),
        (ConfigNode::Leaf(_), ConfigNode::Branch(_)) | (ConfigNode::Branch(_), ConfigNode::Leaf(_)) => {
            emit_all(old, prefix, out, Side::Old);
            emit_all(new, prefix, out, Side::New);
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Old,
    New,
}

/// Emits every leaf under `node` as removed (`Side::Old`) or added (`Side::New`).
fn emit_all(node: &ConfigNode, prefix: &mut Vec<String>, out: &mut Vec<DiffEntry>, side: Side) {
    match node {
        ConfigNode::Leaf(v) => {
            let path = KeyPath::from_trusted(prefix.clone());
            let (old, new) = match side {
                Side::Old => (Some(v.clone()), None),
                Side::New => (None, Some(v.clone())),
            };
            out.push(DiffEntry { path, old, new });
        }
        ConfigNode::Branch(b) => {
            for (name, child) in b.iter() {
                prefix.push(name.to_string());
                emit_all(child, prefix, out, side);
                prefix.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tree::ConfigTree;

    #[test]
    fn test_diff_against_empty_tree_lists_leaves_in_insertion_order() {
        // Arrange
        let mut t = ConfigTree::new("t");
        t.insert("server.port", 8080).unwrap();
        t.insert("server.host", "local").unwrap();
        let empty = ConfigTree::new("empty");

        // Act
        let entries = t.diff(&empty);

        // Assert
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path.to_string(), "server.port");
        assert_eq!(entries[0].old, Some(Value::Int(8080)));
        assert_eq!(entries[0].new, None);
        assert_eq!(entries[0].change(), Change::Removed);
        assert_eq!(entries[1].path.to_string(), "server.host");
    }

    #[test]
    fn test_diff_from_empty_tree_reports_additions() {
        let mut t = ConfigTree::new("t");
        t.insert("a", 1).unwrap();

        let entries = ConfigTree::new("empty").diff(&t);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change(), Change::Added);
        assert_eq!(entries[0].to_string(), "+ a = 1");
    }

    #[test]
    fn test_diff_with_self_is_empty() {
        let mut t = ConfigTree::new("t");
        t.insert("a.b", 1).unwrap();
        t.insert("a.c", f64::NAN).unwrap();
        t.insert("d", "x").unwrap();

        assert!(t.diff(&t).is_empty());
    }

    #[test]
    fn test_diff_modified_and_new_keys_order() {
        // Arrange
        let mut old = ConfigTree::new("old");
        old.insert("a.x", 1).unwrap();
        old.insert("b", true).unwrap();
        let mut new = ConfigTree::new("new");
        new.insert("b", false).unwrap();
        new.insert("a.y", 2).unwrap();
        new.insert("a.x", 1).unwrap();

        // Act
        let rendered: Vec<String> = old.diff(&new).iter().map(ToString::to_string).collect();

        // Assert: old's order first (a, then b), additions after existing keys
        assert_eq!(rendered, ["+ a.y = 2", "~ b = true -> false"]);
    }

    #[test]
    fn test_diff_leaf_to_branch_is_removal_then_additions() {
        let mut old = ConfigTree::new("old");
        old.insert("a", 1).unwrap();
        let mut new = ConfigTree::new("new");
        new.insert("a.b", 2).unwrap();
        new.insert("a.c", 3).unwrap();

        let entries = old.diff(&new);

        let changes: Vec<Change> = entries.iter().map(DiffEntry::change).collect();
        assert_eq!(changes, [Change::Removed, Change::Added, Change::Added]);
        assert_eq!(entries[1].path.to_string(), "a.b");
    }
}
