//! The configuration tree entity.
//!
//! A [`ConfigTree`] owns its root [`Branch`] exclusively; every node is owned
//! transitively through nested branches, so there is no shared or cyclic
//! state.  The tree carries a name and a revision counter that advances by
//! exactly one for every successful call that changes content.
//!
//! Mutations validate before they touch anything: a call that fails leaves
//! the tree exactly as it was, revision included.

use tracing::trace;

use crate::domain::diff::{diff_branches, DiffEntry};
use crate::domain::merge::{merge_branch, MergePolicy};
use crate::domain::node::{Branch, ConfigNode, Value};
use crate::domain::path::{IntoKeyPath, KeyPath};
use crate::domain::TreeError;

/// A named, revisioned configuration tree.
///
/// # Examples
///
/// ```rust
/// use configx_core::{ConfigTree, Value};
///
/// let mut tree = ConfigTree::new("app");
/// tree.insert("server.port", 8080).unwrap();
/// tree.insert("server.host", "local").unwrap();
///
/// assert_eq!(tree.get_value("server.port").unwrap(), &Value::Int(8080));
/// assert_eq!(tree.revision(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    name: String,
    root: Branch,
    revision: u64,
    /// When set, `insert` may only update existing leaves.
    strict: bool,
}

impl ConfigTree {
    /// Creates an empty tree at revision 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Branch::new(),
            revision: 0,
            strict: false,
        }
    }

    /// Creates an empty tree in strict mode.
    pub fn new_strict(name: impl Into<String>) -> Self {
        let mut tree = Self::new(name);
        tree.strict = true;
        tree
    }

    /// Reassembles a tree from stored parts, e.g. a decoded snapshot.
    pub fn from_parts(name: impl Into<String>, root: Branch, revision: u64) -> Self {
        Self {
            name: name.into(),
            root,
            revision,
            strict: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the tree.  Not a content mutation; the revision is unchanged.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn root(&self) -> &Branch {
        &self.root
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, enabled: bool) {
        self.strict = enabled;
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    /// `true` when both trees hold the same node graph, ignoring name and
    /// revision.
    pub fn same_content(&self, other: &ConfigTree) -> bool {
        self.root.same_as(&other.root)
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Returns the node at `path`.
    ///
    /// # Errors
    ///
    /// [`TreeError::NotFound`] when nothing lives at `path`, or
    /// [`TreeError::InvalidPath`] for a malformed path string.
    pub fn get(&self, path: impl IntoKeyPath) -> Result<&ConfigNode, TreeError> {
        let path = path.into_key_path()?;
        let (parents, last) = split_last(&path);

        let mut branch = &self.root;
        for segment in parents {
            match branch.get(segment) {
                Some(ConfigNode::Branch(b)) => branch = b,
                _ => return Err(TreeError::NotFound(path.clone())),
            }
        }
        branch.get(last).ok_or_else(|| TreeError::NotFound(path.clone()))
    }

    /// Returns the scalar stored at `path`.
    ///
    /// # Errors
    ///
    /// As [`ConfigTree::get`], plus [`TreeError::NotALeaf`] when `path`
    /// addresses a branch.
    pub fn get_value(&self, path: impl IntoKeyPath) -> Result<&Value, TreeError> {
        let path = path.into_key_path()?;
        match self.get(&path)? {
            ConfigNode::Leaf(v) => Ok(v),
            ConfigNode::Branch(_) => Err(TreeError::NotALeaf(path)),
        }
    }

    /// `true` if a node exists at `path`.  Malformed paths yield `false`.
    pub fn contains(&self, path: impl IntoKeyPath) -> bool {
        self.get(path).is_ok()
    }

    /// All leaves in depth-first, insertion order.
    pub fn leaves(&self) -> Vec<(KeyPath, &Value)> {
        let mut out = Vec::with_capacity(self.root.leaf_count());
        let mut prefix = Vec::new();
        collect_leaves(&self.root, &mut prefix, &mut out);
        out
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Checks that `insert(path, value)` would succeed, without changing
    /// anything.  Returns `true` when the insert would change the tree.
    ///
    /// # Errors
    ///
    /// The same errors `insert` would return.
    pub fn check_insert(&self, path: &KeyPath, value: &Value) -> Result<bool, TreeError> {
        let (parents, last) = split_last(path);

        let mut branch = &self.root;
        for (idx, segment) in parents.iter().enumerate() {
            match branch.get(segment) {
                Some(ConfigNode::Branch(b)) => branch = b,
                Some(ConfigNode::Leaf(_)) => {
                    return Err(TreeError::PathConflict {
                        path: path.clone(),
                        at: KeyPath::from_trusted(path.segments()[..=idx].to_vec()),
                    });
                }
                None if self.strict => return Err(TreeError::StrictMode(path.clone())),
                // Everything below a missing branch will be created fresh.
                None => return Ok(true),
            }
        }

        match branch.get(last) {
            Some(ConfigNode::Branch(_)) => Err(TreeError::InteriorAssignment(path.clone())),
            Some(ConfigNode::Leaf(existing)) => Ok(!existing.same_as(value)),
            None if self.strict => Err(TreeError::StrictMode(path.clone())),
            None => Ok(true),
        }
    }

    /// Sets the leaf at `path` to `value`, creating intermediate branches.
    ///
    /// Returns `true` when the tree changed.  Writing the value a leaf already
    /// holds is a no-op and leaves the revision alone.
    ///
    /// # Errors
    ///
    /// - [`TreeError::PathConflict`] if a leaf lies on the way to `path`.
    /// - [`TreeError::InteriorAssignment`] if `path` is a branch.
    /// - [`TreeError::StrictMode`] if the tree is strict and `path` is new.
    pub fn insert(
        &mut self,
        path: impl IntoKeyPath,
        value: impl Into<Value>,
    ) -> Result<bool, TreeError> {
        let path = path.into_key_path()?;
        let value = value.into();
        if !self.check_insert(&path, &value)? {
            return Ok(false);
        }

        let (parents, last) = split_last(&path);
        let mut branch = &mut self.root;
        for segment in parents {
            branch = branch
                .branch_entry(segment)
                .ok_or_else(|| TreeError::InteriorAssignment(path.clone()))?;
        }
        branch.insert(last, ConfigNode::Leaf(value));
        self.bump();
        trace!(tree = %self.name, %path, revision = self.revision, "inserted leaf");
        Ok(true)
    }

    /// Removes the node at `path` together with its subtree.
    ///
    /// Returns `false` if nothing was there.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidPath`] for a malformed path string.
    pub fn delete(&mut self, path: impl IntoKeyPath) -> Result<bool, TreeError> {
        let path = path.into_key_path()?;
        let (parents, last) = split_last(&path);

        let mut branch = &mut self.root;
        for segment in parents {
            match branch.get_mut(segment) {
                Some(ConfigNode::Branch(b)) => branch = b,
                _ => return Ok(false),
            }
        }
        if branch.remove(last).is_none() {
            return Ok(false);
        }
        self.bump();
        trace!(tree = %self.name, %path, revision = self.revision, "deleted node");
        Ok(true)
    }

    /// Merges `other` into this tree under `policy`.
    ///
    /// The merge is all-or-nothing: on conflict the tree is untouched.
    /// Returns `true` when the tree changed.
    ///
    /// # Errors
    ///
    /// [`TreeError::MergeConflict`] per the rules of [`MergePolicy`].
    pub fn merge(&mut self, other: &ConfigTree, policy: MergePolicy) -> Result<bool, TreeError> {
        self.merge_branch(&other.root, policy)
    }

    /// Merges a bare branch into the root.  See [`ConfigTree::merge`].
    ///
    /// # Errors
    ///
    /// [`TreeError::MergeConflict`] per the rules of [`MergePolicy`].
    pub fn merge_branch(&mut self, incoming: &Branch, policy: MergePolicy) -> Result<bool, TreeError> {
        let mut staged = self.root.clone();
        let mut prefix = Vec::new();
        let changed = merge_branch(&mut staged, incoming, policy, &mut prefix)?;
        if changed {
            self.root = staged;
            self.bump();
            trace!(tree = %self.name, ?policy, revision = self.revision, "merged tree");
        }
        Ok(changed)
    }

    /// Validates a merge without applying it.  Returns `true` when the merge
    /// would change the tree.
    ///
    /// # Errors
    ///
    /// The same errors [`ConfigTree::merge`] would return.
    pub fn check_merge(&self, incoming: &Branch, policy: MergePolicy) -> Result<bool, TreeError> {
        let mut staged = self.root.clone();
        let mut prefix = Vec::new();
        merge_branch(&mut staged, incoming, policy, &mut prefix)
    }

    /// Replaces the whole node graph and sets the revision verbatim.
    ///
    /// Used when restoring a snapshot; the revision is not bumped.
    pub fn replace_content(&mut self, root: Branch, revision: u64) {
        self.root = root;
        self.revision = revision;
    }

    /// Leaf-level differences from `self` (old) to `other` (new).
    pub fn diff(&self, other: &ConfigTree) -> Vec<DiffEntry> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        diff_branches(&self.root, &other.root, &mut prefix, &mut out);
        out
    }

    /// Marks freshly built content as the starting point of the history.
    pub(crate) fn reset_revision(&mut self) {
        self.revision = 0;
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

fn split_last(path: &KeyPath) -> (&[String], &str) {
    let segments = path.segments();
    let (last, parents) = segments
        .split_last()
        .map(|(l, p)| (l.as_str(), p))
        .unwrap_or(("", &[]));
    (parents, last)
}

fn collect_leaves<'a>(
    branch: &'a Branch,
    prefix: &mut Vec<String>,
    out: &mut Vec<(KeyPath, &'a Value)>,
) {
    for (name, node) in branch.iter() {
        prefix.push(name.to_string());
        match node {
            ConfigNode::Leaf(v) => out.push((KeyPath::from_trusted(prefix.clone()), v)),
            ConfigNode::Branch(b) => collect_leaves(b, prefix, out),
        }
        prefix.pop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
