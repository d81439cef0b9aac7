//! Merging one tree into another.
//!
//! Branches always merge recursively.  Conflicts only arise where both sides
//! hold a node at the same path and at least one of them is a leaf:
//!
//! | existing \ incoming | Leaf (different value)          | Branch                       |
//! |---------------------|---------------------------------|------------------------------|
//! | Leaf                | policy decides                  | conflict unless `Overwrite`  |
//! | Branch              | conflict unless `Overwrite`     | recurse                      |
//!
//! Identical leaves never conflict.  Keys that only exist in the incoming tree
//! are appended after the existing keys, in the incoming tree's order.

use serde::{Deserialize, Serialize};

use crate::domain::node::{Branch, ConfigNode};
use crate::domain::path::KeyPath;
use crate::domain::TreeError;

/// Conflict resolution rule for [`ConfigTree::merge`].
///
/// [`ConfigTree::merge`]: crate::domain::tree::ConfigTree::merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergePolicy {
    /// The incoming node replaces the existing one, including leaf↔branch
    /// replacement.
    #[default]
    Overwrite,
    /// Existing leaves win over incoming leaves.
    PreferExisting,
    /// Any disagreement is a [`TreeError::MergeConflict`].
    Strict,
}

/// Merges `incoming` into `existing` in place.
///
/// `prefix` holds the segments leading to `existing` and is restored before
/// returning.  Returns `true` if `existing` changed.  On error `existing` may
/// be partially merged; callers merge into a staged copy.
pub(crate) fn merge_branch(
    existing: &mut Branch,
    incoming: &Branch,
    policy: MergePolicy,
    prefix: &mut Vec<String>,
) -> Result<bool, TreeError> {
    let mut changed = false;

    for (name, theirs) in incoming.iter() {
        prefix.push(name.to_string());

        let ours = match existing.get_mut(name) {
            Some(node) => node,
            None => {
                existing.insert(name, theirs.clone());
                changed = true;
                prefix.pop();
                continue;
            }
        };

        if ours.is_branch() != theirs.is_branch() {
            if policy != MergePolicy::Overwrite {
                return Err(TreeError::MergeConflict {
                    path: KeyPath::from_trusted(prefix.clone()),
                    reason: "a leaf and a branch meet at the same path",
                });
            }
            *ours = theirs.clone();
            changed = true;
            prefix.pop();
            continue;
        }

        match (ours, theirs) {
            (ConfigNode::Branch(our_branch), ConfigNode::Branch(their_branch)) => {
                changed |= merge_branch(our_branch, their_branch, policy, prefix)?;
            }
            (ConfigNode::Leaf(our_value), ConfigNode::Leaf(their_value)) => {
                if !our_value.same_as(their_value) {
                    match policy {
                        MergePolicy::Overwrite => {
                            *our_value = their_value.clone();
                            changed = true;
                        }
                        MergePolicy::PreferExisting => {}
                        MergePolicy::Strict => {
                            return Err(TreeError::MergeConflict {
                                path: KeyPath::from_trusted(prefix.clone()),
                                reason: "leaf values differ",
                            });
                        }
                    }
                }
            }
            // Shapes were compared above.
            _ => {}
        }

        prefix.pop();
    }

    Ok(changed)
}
