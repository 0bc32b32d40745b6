//! Admission queue for pending loads.
//!
//! Loads are ordered by [`LoadPriority`] (most urgent first), then by node id
//! so that admission is deterministic for identical inputs.

use super::policy::LoadPriority;
use crate::tileset::NodeId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A pending load waiting for a concurrency slot.
#[derive(Clone, Debug)]
pub struct QueuedLoad {
    pub node_id: NodeId,
    pub priority: LoadPriority,
}

impl QueuedLoad {
    pub fn new(node_id: NodeId, priority: LoadPriority) -> Self {
        Self { node_id, priority }
    }
}

// Ordering for BinaryHeap: higher priority first, then lower node id first
impl PartialEq for QueuedLoad {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.node_id == other.node_id
    }
}

impl Eq for QueuedLoad {}

impl PartialOrd for QueuedLoad {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedLoad {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.node_id.cmp(&self.node_id),
            other_ordering => other_ordering,
        }
    }
}

/// Priority queue of pending loads.
///
/// Rebuilt for every admission round from the scheduler's pending set, so
/// priorities refreshed by the latest traversal are always honoured.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    heap: BinaryHeap<QueuedLoad>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, load: QueuedLoad) {
        self.heap.push(load);
    }

    /// Removes and returns the most urgent load.
    pub fn pop(&mut self) -> Option<QueuedLoad> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueuedLoad> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl FromIterator<QueuedLoad> for AdmissionQueue {
    fn from_iter<I: IntoIterator<Item = QueuedLoad>>(iter: I) -> Self {
        Self {
            heap: iter.into_iter().collect(),
        }
    }
}
