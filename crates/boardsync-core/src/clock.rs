//! Per-board vector clocks for causal ordering
//!
//! A [`VectorClock`] maps each author (peer) to the highest sequence number
//! observed from that author on one board. Absent authors read as zero and
//! are never materialized until written.
//!
//! Merge is a pointwise maximum: commutative, associative, idempotent, and
//! monotone (no entry ever decreases). Comparison yields the classical
//! partial order over counter vectors, which is what lets the sync layer
//! skip data a peer already has while still detecting divergent histories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::PeerId;

/// Result of comparing two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Every entry is <= the other clock's, at least one strictly less
    Before,
    /// Every entry is >= the other clock's, at least one strictly greater
    After,
    /// Some entries ahead, some behind: divergent histories
    Concurrent,
    /// All entries match
    Equal,
}

/// Per-author logical sequence counters for one board
///
/// Entries are kept in a `BTreeMap` so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    clocks: BTreeMap<PeerId, u64>,
}

impl VectorClock {
    /// Create an empty clock
    pub fn new() -> Self {
        Self {
            clocks: BTreeMap::new(),
        }
    }

    /// Create a clock with the given peer materialized at zero
    ///
    /// Used when a board clock is first created for the local node, so the
    /// local author always appears in exchanged clocks.
    pub fn seeded(peer: &PeerId) -> Self {
        let mut clocks = BTreeMap::new();
        clocks.insert(peer.clone(), 0);
        Self { clocks }
    }

    /// Advance the author's counter by exactly one
    pub fn increment(&mut self, author: &PeerId) {
        *self.clocks.entry(author.clone()).or_insert(0) += 1;
    }

    /// Merge another clock into this one, taking the pointwise maximum
    ///
    /// Never decreases an entry; merging the same clock twice is a no-op.
    pub fn merge(&mut self, other: &VectorClock) {
        for (author, &value) in &other.clocks {
            let entry = self.clocks.entry(author.clone()).or_insert(0);
            if value > *entry {
                *entry = value;
            }
        }
    }

    /// Compare against another clock over the union of authors
    ///
    /// Authors missing from either side read as zero.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut has_less = false;
        let mut has_greater = false;

        for author in self.clocks.keys().chain(other.clocks.keys()) {
            let ours = self.get(author);
            let theirs = other.get(author);
            if ours < theirs {
                has_less = true;
            } else if ours > theirs {
                has_greater = true;
            }
        }

        match (has_less, has_greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Get the author's counter, zero if absent
    pub fn get(&self, author: &PeerId) -> u64 {
        self.clocks.get(author).copied().unwrap_or(0)
    }

    /// Overwrite the author's counter with an authoritative value
    ///
    /// Used when importing a sequence number carried by an admitted post.
    /// Callers that need monotonicity must check `get` first; `set` itself
    /// is a plain overwrite.
    pub fn set(&mut self, author: PeerId, value: u64) {
        self.clocks.insert(author, value);
    }

    /// Export the author -> counter mapping for wire transfer
    pub fn to_map(&self) -> BTreeMap<PeerId, u64> {
        self.clocks.clone()
    }

    /// Rebuild a clock from a wire mapping
    pub fn from_map(map: BTreeMap<PeerId, u64>) -> Self {
        Self { clocks: map }
    }

    /// Iterate over materialized (author, counter) entries
    pub fn entries(&self) -> impl Iterator<Item = (&PeerId, u64)> {
        self.clocks.iter().map(|(author, &value)| (author, value))
    }

    /// Number of materialized authors
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// True if no author has been materialized
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}
