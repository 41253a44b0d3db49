//! Node arena.
//!
//! Nodes live in one contiguous `Vec`, addressed by [`NodeId`]. Slot 0 always
//! holds the terminal. Freed slots go onto a free list and are reused by later
//! allocations; each reuse bumps the slot's generation, so an id kept across a
//! collection of its node is detected instead of silently aliasing a new node.
//!
//! ```text
//! slots: [ T | n1 | ·· | n3 | n4 | ·· ]      ·· = free, listed in `free`
//!          ^0                    ^ generation 2 (slot reused twice)
//! ```

use std::ops::{Index, IndexMut};

use crate::error::{EngineError, Result};
use crate::node::{Node, NodeId};

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    generation: u32,
    occupied: bool,
}

#[derive(Debug, Clone)]
pub struct Storage {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    /// Number of occupied slots, terminal included.
    real_size: usize,
}

impl Storage {
    /// Creates an arena holding at most `capacity` nodes (terminal included).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Node::NO_NEXT as usize);
        let slots = vec![Slot {
            node: Node::terminal(),
            generation: 0,
            occupied: true,
        }];
        Self {
            slots,
            free: Vec::new(),
            capacity,
            real_size: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots ever handed out, free ones included.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.occupied)
    }

    /// Whether `id` refers to the node currently stored in its slot.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index())
            .is_some_and(|s| s.occupied && s.generation == id.generation())
    }

    /// Current id of an occupied slot.
    pub fn id_at(&self, index: u32) -> NodeId {
        let slot = &self.slots[index as usize];
        assert!(slot.occupied, "Slot {} is not occupied", index);
        NodeId::new(index, slot.generation)
    }

    pub fn alloc(&mut self, node: Node) -> Result<NodeId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(!slot.occupied);
            slot.node = node;
            slot.occupied = true;
            self.real_size += 1;
            return Ok(NodeId::new(index, slot.generation));
        }
        if self.slots.len() >= self.capacity {
            return Err(EngineError::TableOverflow {
                table: "node",
                capacity: self.capacity,
            });
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            node,
            generation: 0,
            occupied: true,
        });
        self.real_size += 1;
        Ok(NodeId::new(index, 0))
    }

    /// Returns the slot of `id` to the free list.
    pub fn free(&mut self, id: NodeId) {
        assert!(!id.is_terminal(), "Cannot free the terminal");
        self.check(id);
        let slot = &mut self.slots[id.index()];
        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.node.next = Node::NO_NEXT;
        self.free.push(id.index() as u32);
        self.real_size -= 1;
    }

    #[inline]
    fn check(&self, id: NodeId) {
        let slot = &self.slots[id.index()];
        assert!(
            slot.occupied && slot.generation == id.generation(),
            "Stale node id {} (generation {}, slot generation {})",
            id,
            id.generation(),
            slot.generation
        );
    }

    /// Node at a raw slot index, used when walking collision chains.
    #[inline]
    pub(crate) fn at(&self, index: u32) -> &Node {
        &self.slots[index as usize].node
    }

    #[inline]
    pub(crate) fn at_mut(&mut self, index: u32) -> &mut Node {
        &mut self.slots[index as usize].node
    }
}

impl Index<NodeId> for Storage {
    type Output = Node;

    #[inline]
    fn index(&self, id: NodeId) -> &Self::Output {
        self.check(id);
        &self.slots[id.index()].node
    }
}

impl IndexMut<NodeId> for Storage {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        self.check(id);
        &mut self.slots[id.index()].node
    }
}
