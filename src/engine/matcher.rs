//! Publish-time subscriber matching
//!
//! Depth-first descent over the trie with literal, `+`, and terminal-`#`
//! branches, all explored independently. Wildcard children never match the
//! first level of a `$`-prefixed topic. Shared groups dispatch to exactly
//! one member per matched publish, rotating head to tail.

use smallvec::SmallVec;

use super::trie::{Leaf, SharedGroup, TrieNode};

/// Verdict for a single delivery attempt, reported by the engine's sink
/// closure back to the matcher so shared-group rotation can honor the
/// configured denial policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Enqueued downstream
    Sent,
    /// Skipped silently (no-local or ACL deny)
    Skipped,
    /// Attempted but the sink or ACL collaborator failed
    Failed,
}

pub(crate) struct MatchContext<'a, F> {
    pub deliver: &'a mut F,
    /// When true a denied shared-group head still consumes its turn
    pub rotate_on_denied: bool,
    /// Clone of every matched normal leaf, filled when the caller wants to
    /// cache the result; shared matches make the pass uncacheable
    pub snapshot: Option<&'a mut SmallVec<[Leaf; 8]>>,
    pub had_shared: bool,
}

/// Enumerate all subscribers of `levels` and hand each to the delivery
/// closure. `system` marks topics whose first level begins with `$`.
pub(crate) fn match_publish<F>(
    root: &mut TrieNode,
    levels: &[&str],
    system: bool,
    ctx: &mut MatchContext<'_, F>,
) where
    F: FnMut(&Leaf) -> Delivery,
{
    walk(root, levels, 0, system, ctx);
}

fn walk<F>(
    node: &mut TrieNode,
    levels: &[&str],
    idx: usize,
    system: bool,
    ctx: &mut MatchContext<'_, F>,
) where
    F: FnMut(&Leaf) -> Delivery,
{
    if idx == levels.len() {
        deliver_node(node, ctx);
        // a trailing # also matches zero remaining levels
        if let Some(hash) = node.children.get_mut("#") {
            if hash.children.is_empty() {
                deliver_node(hash, ctx);
            }
        }
        return;
    }

    let guard_wildcards = idx == 0 && system;

    if let Some(child) = node.children.get_mut(levels[idx]) {
        walk(child, levels, idx + 1, system, ctx);
    }

    if !guard_wildcards {
        if let Some(child) = node.children.get_mut("+") {
            walk(child, levels, idx + 1, system, ctx);
        }
        if let Some(hash) = node.children.get_mut("#") {
            if hash.children.is_empty() {
                deliver_node(hash, ctx);
            }
        }
    }
}

fn deliver_node<F>(node: &mut TrieNode, ctx: &mut MatchContext<'_, F>)
where
    F: FnMut(&Leaf) -> Delivery,
{
    for leaf in &node.subs {
        if let Some(buf) = ctx.snapshot.as_mut() {
            buf.push(leaf.clone());
        }
        (ctx.deliver)(leaf);
    }

    if !node.shared.is_empty() {
        ctx.had_shared = true;
        for group in node.shared.values_mut() {
            dispatch_shared(group, ctx.rotate_on_denied, &mut *ctx.deliver);
        }
    }
}

/// Deliver one publish to exactly one member of a shared group.
///
/// With `rotate_on_denied` the head member takes the turn no matter what
/// the verdict was. Without it, skipped members keep their place in line
/// and the turn passes to the next member; only the member that actually
/// received an attempt rotates to the tail.
fn dispatch_shared<F>(group: &mut SharedGroup, rotate_on_denied: bool, deliver: &mut F)
where
    F: FnMut(&Leaf) -> Delivery,
{
    if rotate_on_denied {
        if let Some(leaf) = group.subs.pop_front() {
            (deliver)(&leaf);
            group.subs.push_back(leaf);
        }
        return;
    }

    let mut skipped: SmallVec<[Leaf; 4]> = SmallVec::new();
    while let Some(leaf) = group.subs.pop_front() {
        match (deliver)(&leaf) {
            Delivery::Skipped => skipped.push(leaf),
            Delivery::Sent | Delivery::Failed => {
                group.subs.push_back(leaf);
                break;
            }
        }
    }
    for leaf in skipped.into_iter().rev() {
        group.subs.push_front(leaf);
    }
}
