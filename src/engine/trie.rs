//! Subscription trie
//!
//! Hierarchical mapping from topic level to child node. Wildcard levels
//! are stored as ordinary child keys (`"+"`, `"#"`) and only interpreted
//! by the matcher; a `"#"` node never grows children because the tokenizer
//! rejects filters with levels after `#`.
//!
//! Nodes own their children; empty nodes are collapsed on the way back up
//! from a removal, so a node exists iff it still carries subscribers,
//! shared groups, or descendants.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use compact_str::CompactString;

use crate::protocol::SubscriptionOptions;

/// A single (client, filter) subscription record stored at the terminal
/// node of its filter.
#[derive(Debug, Clone)]
pub(crate) struct Leaf {
    pub client_id: Arc<str>,
    pub options: SubscriptionOptions,
    /// v5 subscription identifier, 0 when absent
    pub identifier: u32,
}

/// Ordered members of one `$share/<group>` bucket. The head of the queue
/// holds the next turn; dispatch rotates it to the tail.
#[derive(Debug, Default)]
pub(crate) struct SharedGroup {
    pub subs: VecDeque<Leaf>,
}

#[derive(Debug, Default)]
pub(crate) struct TrieNode {
    /// Children indexed by topic level
    pub children: AHashMap<CompactString, TrieNode>,
    /// Normal subscribers terminating at this node, in subscribe order
    pub subs: Vec<Leaf>,
    /// Shared groups terminating at this node
    pub shared: AHashMap<CompactString, SharedGroup>,
}

pub(crate) struct InsertResult {
    /// An existing leaf was updated in place instead of appended
    pub existed: bool,
    /// Normal-subscriber count at the terminal node after the operation,
    /// None for shared inserts
    pub normal_count: Option<usize>,
}

#[derive(Default)]
pub(crate) struct RemoveResult {
    pub removed: Option<Leaf>,
    /// Normal-subscriber count at the terminal node after the removal,
    /// None when nothing was removed or the leaf was shared
    pub normal_count: Option<usize>,
}

impl TrieNode {
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty() && self.shared.is_empty() && self.children.is_empty()
    }

    /// Walk (creating missing levels) to the terminal node of `levels` and
    /// insert or update the leaf there, in `subs` or in the named shared
    /// group.
    pub fn insert(&mut self, levels: &[&str], group: Option<&str>, leaf: Leaf) -> InsertResult {
        let mut node = self;
        for level in levels {
            node = node
                .children
                .entry(CompactString::new(level))
                .or_default();
        }

        match group {
            None => {
                if let Some(existing) = node
                    .subs
                    .iter_mut()
                    .find(|l| l.client_id == leaf.client_id)
                {
                    existing.options = leaf.options;
                    existing.identifier = leaf.identifier;
                    InsertResult {
                        existed: true,
                        normal_count: Some(node.subs.len()),
                    }
                } else {
                    node.subs.push(leaf);
                    InsertResult {
                        existed: false,
                        normal_count: Some(node.subs.len()),
                    }
                }
            }
            Some(name) => {
                let group = node.shared.entry(CompactString::new(name)).or_default();
                if let Some(existing) = group
                    .subs
                    .iter_mut()
                    .find(|l| l.client_id == leaf.client_id)
                {
                    existing.options = leaf.options;
                    existing.identifier = leaf.identifier;
                    InsertResult {
                        existed: true,
                        normal_count: None,
                    }
                } else {
                    group.subs.push_back(leaf);
                    InsertResult {
                        existed: false,
                        normal_count: None,
                    }
                }
            }
        }
    }

    /// Remove the leaf of `client_id` at the terminal node of `levels`
    /// (from `subs` or the named shared group), collapsing nodes that the
    /// removal emptied on the way back up. The root itself is never
    /// removed.
    pub fn remove(&mut self, levels: &[&str], group: Option<&str>, client_id: &str) -> RemoveResult {
        let mut result = RemoveResult::default();
        remove_at(self, levels, group, client_id, &mut result);
        result
    }

    /// Panic on any structural violation: an empty retained node or an
    /// empty shared group anywhere below (and including) this node.
    #[cfg(test)]
    pub fn assert_structure(&self) {
        for group in self.shared.values() {
            assert!(!group.subs.is_empty(), "empty shared group retained");
        }
        for (level, child) in &self.children {
            assert!(!child.is_empty(), "empty child node {:?} retained", level);
            child.assert_structure();
        }
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        1 + self.children.values().map(TrieNode::node_count).sum::<usize>()
    }

    #[cfg(test)]
    pub fn max_depth(&self) -> usize {
        self.children
            .values()
            .map(|c| 1 + c.max_depth())
            .max()
            .unwrap_or(0)
    }

    /// Visit every leaf with its path and owning group, depth-first.
    #[cfg(test)]
    pub fn for_each_leaf<'a>(
        &'a self,
        f: &mut impl FnMut(&[&'a str], Option<&'a str>, &'a Leaf),
    ) {
        let mut path = Vec::new();
        visit(self, &mut path, f);
    }
}

/// Returns true when `node` is now empty and should be unlinked by its
/// parent.
fn remove_at(
    node: &mut TrieNode,
    levels: &[&str],
    group: Option<&str>,
    client_id: &str,
    result: &mut RemoveResult,
) -> bool {
    if let Some((level, rest)) = levels.split_first() {
        if let Some(child) = node.children.get_mut(*level) {
            if remove_at(child, rest, group, client_id, result) {
                node.children.remove(*level);
            }
        }
        return node.is_empty();
    }

    match group {
        None => {
            if let Some(pos) = node.subs.iter().position(|l| &*l.client_id == client_id) {
                result.removed = Some(node.subs.remove(pos));
                result.normal_count = Some(node.subs.len());
            }
        }
        Some(name) => {
            if let Some(grp) = node.shared.get_mut(name) {
                if let Some(pos) = grp.subs.iter().position(|l| &*l.client_id == client_id) {
                    result.removed = grp.subs.remove(pos);
                }
                // a shared group never outlives its last member
                if grp.subs.is_empty() {
                    node.shared.remove(name);
                }
            }
        }
    }
    node.is_empty()
}

#[cfg(test)]
fn visit<'a>(
    node: &'a TrieNode,
    path: &mut Vec<&'a str>,
    f: &mut impl FnMut(&[&'a str], Option<&'a str>, &'a Leaf),
) {
    for leaf in &node.subs {
        f(path, None, leaf);
    }
    for (name, group) in &node.shared {
        for leaf in &group.subs {
            f(path, Some(name.as_str()), leaf);
        }
    }
    for (level, child) in &node.children {
        path.push(level.as_str());
        visit(child, path, f);
        path.pop();
    }
}
