//! Bounded selection of the K best matches
//!
//! A max-heap capped at K entries: the worst retained match sits on top and is evicted
//! when something better arrives, so memory stays O(K) for any number of candidates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::models::MatchResult;

/// Heap entry ordered by score, then start, then end.
#[derive(Debug, Clone, Copy)]
struct Ranked(MatchResult);

impl Ranked {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| self.0.start.cmp(&other.0.start))
            .then_with(|| self.0.end.cmp(&other.0.end))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key_cmp(other)
    }
}

/// Keeps the `k` lowest-scoring matches seen so far
#[derive(Debug, Clone)]
pub struct TopKSelector {
    k: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopKSelector {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a candidate; returns whether it was admitted.
    pub fn offer(&mut self, candidate: MatchResult) -> bool {
        if self.k == 0 {
            return false;
        }
        let candidate = Ranked(candidate);
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    /// Fold another selector's entries into this one.
    pub fn merge(&mut self, other: TopKSelector) {
        for ranked in other.heap {
            self.offer(ranked.0);
        }
    }

    /// Drain into ascending score order, ties by earlier start.
    pub fn into_sorted_vec(self) -> Vec<MatchResult> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|ranked| ranked.0)
            .collect()
    }
}
