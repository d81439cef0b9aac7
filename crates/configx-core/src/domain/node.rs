//! Tree nodes: typed scalar leaves and ordered branches.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed scalar stored in a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// The scalar type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    Null,
}

impl ValueKind {
    /// Upper-case type name (`"STR"`, `"INT"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Str => "STR",
            ValueKind::Int => "INT",
            ValueKind::Float => "FLOAT",
            ValueKind::Bool => "BOOL",
            ValueKind::Null => "NULL",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Returns the scalar type of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Null => ValueKind::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Value equality that compares floats by bit pattern: a NaN is the same
    /// as itself, and `0.0` differs from `-0.0`.
    pub(crate) fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A node in a configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigNode {
    /// Terminal node holding a scalar.
    Leaf(Value),
    /// Interior node holding ordered children.
    Branch(Branch),
}

impl ConfigNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, ConfigNode::Leaf(_))
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, ConfigNode::Branch(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ConfigNode::Leaf(v) => Some(v),
            ConfigNode::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&Branch> {
        match self {
            ConfigNode::Branch(b) => Some(b),
            ConfigNode::Leaf(_) => None,
        }
    }

    /// Structural equality using [`Value::same_as`] for leaves.
    pub(crate) fn same_as(&self, other: &ConfigNode) -> bool {
        match (self, other) {
            (ConfigNode::Leaf(a), ConfigNode::Leaf(b)) => a.same_as(b),
            (ConfigNode::Branch(a), ConfigNode::Branch(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl From<Value> for ConfigNode {
    fn from(v: Value) -> Self {
        ConfigNode::Leaf(v)
    }
}

impl From<Branch> for ConfigNode {
    fn from(b: Branch) -> Self {
        ConfigNode::Branch(b)
    }
}

/// An ordered mapping from segment name to child node.
///
/// Children keep their insertion order, which makes traversal, rendering and
/// snapshot encoding deterministic.  Lookups are linear; configuration
/// branches are small and ordered iteration is the dominant access pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    children: Vec<(String, ConfigNode)>,
}

impl Branch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ConfigNode> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ConfigNode> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Inserts or replaces a child.
    ///
    /// A replaced child keeps its position; a new child is appended.  Returns
    /// the previous node, if any.
    pub fn insert(&mut self, name: impl Into<String>, node: ConfigNode) -> Option<ConfigNode> {
        let name = name.into();
        match self.get_mut(&name) {
            Some(slot) => Some(std::mem::replace(slot, node)),
            None => {
                self.children.push((name, node));
                None
            }
        }
    }

    /// Removes a child, preserving the order of the remaining children.
    pub fn remove(&mut self, name: &str) -> Option<ConfigNode> {
        let idx = self.children.iter().position(|(n, _)| n == name)?;
        Some(self.children.remove(idx).1)
    }

    /// Iterates over `(name, node)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.children.iter().map(|(n, node)| (n.as_str(), node))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(n, _)| n.as_str())
    }

    /// Returns the child branch `name`, creating an empty one if absent.
    ///
    /// Returns `None` if `name` exists and is a leaf.
    pub(crate) fn branch_entry(&mut self, name: &str) -> Option<&mut Branch> {
        if !self.contains(name) {
            self.children
                .push((name.to_string(), ConfigNode::Branch(Branch::new())));
        }
        match self.get_mut(name) {
            Some(ConfigNode::Branch(b)) => Some(b),
            _ => None,
        }
    }

    /// Number of leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        self.children
            .iter()
            .map(|(_, node)| match node {
                ConfigNode::Leaf(_) => 1,
                ConfigNode::Branch(b) => b.leaf_count(),
            })
            .sum()
    }

    pub(crate) fn same_as(&self, other: &Branch) -> bool {
        self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|((na, a), (nb, b))| na == nb && a.same_as(b))
    }
}

impl<S: Into<String>> FromIterator<(S, ConfigNode)> for Branch {
    fn from_iter<T: IntoIterator<Item = (S, ConfigNode)>>(iter: T) -> Self {
        let mut branch = Branch::new();
        for (name, node) in iter {
            branch.insert(name, node);
        }
        branch
    }
}
