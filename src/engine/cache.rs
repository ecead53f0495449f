//! Generation-stamped match cache
//!
//! Caches the matched normal-leaf set per publish topic. Any mutation of
//! the trie bumps the generation, which lazily invalidates every entry;
//! topics that matched a shared group are never cached because rotation
//! makes their result set change on every publish.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use smallvec::SmallVec;

use super::trie::Leaf;

struct CachedMatch {
    leaves: SmallVec<[Leaf; 8]>,
    generation: u64,
}

pub(crate) struct MatchCache {
    entries: DashMap<String, CachedMatch>,
    generation: AtomicU64,
    capacity: usize,
}

impl MatchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate by bumping the generation; stale entries are dropped
    /// lazily on lookup, with a hard clear once twice over capacity.
    pub fn invalidate(&self) {
        if !self.enabled() {
            return;
        }
        self.generation.fetch_add(1, Ordering::Release);
        if self.entries.len() > self.capacity * 2 {
            self.entries.clear();
        }
    }

    pub fn lookup(&self, topic: &str) -> Option<SmallVec<[Leaf; 8]>> {
        if !self.enabled() {
            return None;
        }
        let cached = self.entries.get(topic)?;
        if cached.generation != self.generation() {
            return None;
        }
        Some(cached.leaves.clone())
    }

    pub fn store(&self, topic: &str, leaves: SmallVec<[Leaf; 8]>, generation: u64) {
        if !self.enabled() || self.entries.len() >= self.capacity {
            return;
        }
        self.entries
            .insert(topic.to_string(), CachedMatch { leaves, generation });
    }
}
