//! Per-variable unique table with intrusive collision chains.
//!
//! The engine keeps one [`Subtable`] per variable. All nodes in a subtable
//! decide the same variable, so only the four edges go into the hash:
//!
//! ```text
//! subtables[x0] → nodes deciding x0
//! subtables[x1] → nodes deciding x1
//! ...
//! ```
//!
//! Each subtable is an array of bucket heads. Chains run through the
//! `Node.next` field of the nodes themselves, so the table owns no entries:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ buckets: [u32; 2^bits]                      │
//! │   [0] ─────► @5 ──► @12 ──► ∅               │
//! │   [1] ─────► ∅                              │
//! │   [2] ─────► @3 ──► ∅                       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Subtables are keyed by variable rather than level, so swapping two adjacent
//! levels only touches the two subtables involved.

use log::debug;

use crate::node::{Edges, Node, NodeId};
use crate::storage::Storage;
use crate::types::Var;
use crate::utils::MyHash;

/// Default number of bucket bits (2^14 buckets per variable).
pub const DEFAULT_BUCKET_BITS: usize = 14;

#[derive(Debug, Clone)]
pub struct Subtable {
    /// The variable decided by every node in this subtable.
    pub variable: Var,

    /// Head slot of each collision chain, [`Node::NO_NEXT`] when empty.
    buckets: Vec<u32>,

    bitmask: u64,

    count: usize,
}

impl Subtable {
    pub fn new(variable: Var) -> Self {
        Self::with_bucket_bits(variable, DEFAULT_BUCKET_BITS)
    }

    pub fn with_bucket_bits(variable: Var, bits: usize) -> Self {
        let num_buckets = 1 << bits;
        Self {
            variable,
            buckets: vec![Node::NO_NEXT; num_buckets],
            bitmask: (num_buckets - 1) as u64,
            count: 0,
        }
    }

    #[inline]
    fn bucket_index(&self, edges: &Edges) -> usize {
        (MyHash::hash(edges) & self.bitmask) as usize
    }

    /// Looks up a node with exactly these edges.
    ///
    /// Nodes carrying a pending renormalization factor represent a scaled
    /// version of their edges and never match.
    pub fn find(&self, edges: &Edges, storage: &Storage) -> Option<NodeId> {
        let mut current = self.buckets[self.bucket_index(edges)];
        while current != Node::NO_NEXT {
            let node = storage.at(current);
            if node.edges == *edges && node.renorm_factor.is_one() {
                return Some(storage.id_at(current));
            }
            current = node.next;
        }
        None
    }

    /// Prepends the node to its chain, growing the table first if chains get long.
    pub fn insert(&mut self, id: NodeId, storage: &mut Storage) {
        if self.should_resize() {
            self.resize(storage);
        }
        self.link(id.index() as u32, storage);
    }

    fn link(&mut self, index: u32, storage: &mut Storage) {
        let b = self.bucket_index(&storage.at(index).edges);
        storage.at_mut(index).next = self.buckets[b];
        self.buckets[b] = index;
        self.count += 1;
    }

    /// Unlinks one particular node. Returns whether it was found.
    pub fn remove(&mut self, id: NodeId, storage: &mut Storage) -> bool {
        let target = id.index() as u32;
        let b = self.bucket_index(&storage[id].edges);
        let mut prev = Node::NO_NEXT;
        let mut current = self.buckets[b];
        while current != Node::NO_NEXT {
            let next = storage.at(current).next;
            if current == target {
                if prev == Node::NO_NEXT {
                    self.buckets[b] = next;
                } else {
                    storage.at_mut(prev).next = next;
                }
                storage.at_mut(current).next = Node::NO_NEXT;
                self.count -= 1;
                return true;
            }
            prev = current;
            current = next;
        }
        false
    }

    /// Unlinks every node with a zero reference count and returns them.
    ///
    /// The caller is responsible for freeing the returned slots.
    pub fn remove_dead(&mut self, storage: &mut Storage) -> Vec<NodeId> {
        let mut dead = Vec::new();
        for b in 0..self.buckets.len() {
            let mut prev = Node::NO_NEXT;
            let mut current = self.buckets[b];
            while current != Node::NO_NEXT {
                let node = storage.at(current);
                let next = node.next;
                if node.ref_count == 0 {
                    if prev == Node::NO_NEXT {
                        self.buckets[b] = next;
                    } else {
                        storage.at_mut(prev).next = next;
                    }
                    storage.at_mut(current).next = Node::NO_NEXT;
                    dead.push(storage.id_at(current));
                    self.count -= 1;
                } else {
                    prev = current;
                }
                current = next;
            }
        }
        dead
    }

    /// Detaches every node, leaving the subtable empty.
    pub fn drain(&mut self, storage: &mut Storage) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.count);
        for head in self.buckets.iter_mut() {
            let mut current = std::mem::replace(head, Node::NO_NEXT);
            while current != Node::NO_NEXT {
                let node = storage.at_mut(current);
                let next = node.next;
                node.next = Node::NO_NEXT;
                ids.push(storage.id_at(current));
                current = next;
            }
        }
        self.count = 0;
        ids
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates over the ids of all nodes in this subtable.
    pub fn indices<'a>(&'a self, storage: &'a Storage) -> impl Iterator<Item = NodeId> + 'a {
        self.buckets
            .iter()
            .flat_map(move |&head| ChainIter::new(head, storage))
            .map(move |index| storage.id_at(index))
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn load_factor(&self) -> f64 {
        self.count as f64 / self.buckets.len() as f64
    }

    pub fn should_resize(&self) -> bool {
        self.count > self.buckets.len() * 5
    }

    /// Doubles the bucket count and relinks all chains.
    pub fn resize(&mut self, storage: &mut Storage) {
        debug!(
            "Resizing subtable for {}: {} -> {} buckets",
            self.variable,
            self.buckets.len(),
            self.buckets.len() * 2
        );
        let indices: Vec<u32> = self
            .buckets
            .iter()
            .flat_map(|&head| ChainIter::new(head, storage))
            .collect();
        let num_buckets = self.buckets.len() * 2;
        self.buckets = vec![Node::NO_NEXT; num_buckets];
        self.bitmask = (num_buckets - 1) as u64;
        self.count = 0;
        for index in indices {
            self.link(index, storage);
        }
    }
}

/// Iterator over the slot indices of one collision chain.
struct ChainIter<'a> {
    current: u32,
    storage: &'a Storage,
}

impl<'a> ChainIter<'a> {
    fn new(head: u32, storage: &'a Storage) -> Self {
        Self { current: head, storage }
    }
}

impl Iterator for ChainIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == Node::NO_NEXT {
            return None;
        }
        let index = self.current;
        self.current = self.storage.at(index).next;
        Some(index)
    }
}
