//! Persistent slot arena backing the trie.
//!
//! Slots sit in the leaves of a radix tree of `Arc`ed chunks, 32 wide.
//! Cloning the arena copies one pointer. Writing a slot copies only the chunks
//! on the way down to it that are still shared with another clone, so a writer
//! racing a held snapshot pays per touched slot, not per slot held.
//!
//! Freed slots form a linked list threaded through the arena itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use hubsync_core::Blake3Hash;

use crate::node::{Node, NodeIndex};

const BITS: u32 = 5;
const WIDTH: usize = 1 << BITS;
const MASK: usize = WIDTH - 1;

/// What a freed or never-allocated slot reads as.
static VACANT: Node = Node {
    hash: Blake3Hash::ZERO,
    count: 0,
    children: BTreeMap::new(),
};

#[derive(Debug, Clone)]
enum Slot {
    Occupied(Node),
    Free { next: Option<NodeIndex> },
}

#[derive(Debug, Clone)]
enum Chunk {
    Branch(Vec<Arc<Chunk>>),
    Leaf(Vec<Slot>),
}

impl Chunk {
    fn empty_at(shift: u32) -> Self {
        if shift == 0 {
            Chunk::Leaf(Vec::with_capacity(WIDTH))
        } else {
            Chunk::Branch(Vec::with_capacity(WIDTH))
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Arena {
    root: Arc<Chunk>,
    /// Index bits consumed above the leaf level.
    shift: u32,
    /// Slots ever allocated, free ones included.
    len: usize,
    live: usize,
    free: Option<NodeIndex>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Chunk::empty_at(0)),
            shift: 0,
            len: 0,
            live: 0,
            free: None,
        }
    }

    /// Slots ever allocated, free ones included.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Slots currently holding a node.
    pub fn live(&self) -> usize {
        self.live
    }

    /// The node at `idx`. Free slots read as an empty node.
    pub fn node(&self, idx: NodeIndex) -> &Node {
        match self.slot(idx) {
            Some(Slot::Occupied(node)) => node,
            _ => &VACANT,
        }
    }

    /// Mutable access to a live node, unsharing the chunks on its path.
    pub fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut Node> {
        if idx as usize >= self.len {
            return None;
        }
        match slot_mut(&mut self.root, idx as usize, self.shift) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    /// Store `node`, reusing a freed slot when one exists.
    pub fn alloc(&mut self, node: Node) -> NodeIndex {
        self.live += 1;
        if let Some(idx) = self.free {
            if let Some(slot) = slot_mut(&mut self.root, idx as usize, self.shift) {
                let previous = std::mem::replace(slot, Slot::Occupied(node));
                self.free = match previous {
                    Slot::Free { next } => next,
                    Slot::Occupied(_) => None,
                };
                return idx;
            }
        }
        self.push(Slot::Occupied(node))
    }

    /// Return a slot to the free list. Releasing a free slot does nothing.
    pub fn release(&mut self, idx: NodeIndex) {
        if idx as usize >= self.len {
            return;
        }
        let next = self.free;
        if let Some(slot) = slot_mut(&mut self.root, idx as usize, self.shift) {
            if matches!(slot, Slot::Occupied(_)) {
                *slot = Slot::Free { next };
                self.free = Some(idx);
                self.live -= 1;
            }
        }
    }

    fn slot(&self, idx: NodeIndex) -> Option<&Slot> {
        let idx = idx as usize;
        if idx >= self.len {
            return None;
        }
        let mut chunk: &Chunk = &self.root;
        let mut shift = self.shift;
        loop {
            match chunk {
                Chunk::Branch(children) => {
                    chunk = &**children.get((idx >> shift) & MASK)?;
                    shift -= BITS;
                }
                Chunk::Leaf(slots) => return slots.get(idx & MASK),
            }
        }
    }

    fn push(&mut self, slot: Slot) -> NodeIndex {
        if self.len == WIDTH << self.shift {
            let full = std::mem::replace(&mut self.root, Arc::new(Chunk::empty_at(0)));
            self.root = Arc::new(Chunk::Branch(vec![full]));
            self.shift += BITS;
        }
        push_in(&mut self.root, self.len, self.shift, slot);
        self.len += 1;
        (self.len - 1) as NodeIndex
    }
}

fn slot_mut(chunk: &mut Arc<Chunk>, idx: usize, shift: u32) -> Option<&mut Slot> {
    match Arc::make_mut(chunk) {
        Chunk::Branch(children) => {
            slot_mut(children.get_mut((idx >> shift) & MASK)?, idx, shift - BITS)
        }
        Chunk::Leaf(slots) => slots.get_mut(idx & MASK),
    }
}

fn push_in(chunk: &mut Arc<Chunk>, idx: usize, shift: u32, slot: Slot) {
    match Arc::make_mut(chunk) {
        Chunk::Leaf(slots) => slots.push(slot),
        Chunk::Branch(children) => {
            let i = (idx >> shift) & MASK;
            if i == children.len() {
                children.push(Arc::new(Chunk::empty_at(shift - BITS)));
            }
            if let Some(child) = children.get_mut(i) {
                push_in(child, idx, shift - BITS, slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(count: u64) -> Node {
        Node {
            hash: Blake3Hash([count as u8; 32]),
            count,
            children: BTreeMap::new(),
        }
    }

    fn filled(n: u64) -> Arena {
        let mut arena = Arena::new();
        for i in 0..n {
            assert_eq!(arena.alloc(node(i)), i as NodeIndex);
        }
        arena
    }

    #[test]
    fn test_grows_past_several_levels() {
        let n = (WIDTH * WIDTH * 2 + 7) as u64;
        let arena = filled(n);
        assert_eq!(arena.len(), n as usize);
        assert_eq!(arena.shift, 2 * BITS);
        for i in [0, 31, 32, 1023, 1024, n - 1] {
            assert_eq!(arena.node(i as NodeIndex).count, i);
        }
        assert_eq!(arena.node(n as NodeIndex).count, 0);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut arena = filled(10);
        arena.release(3);
        arena.release(7);
        arena.release(7);
        assert_eq!(arena.live(), 8);
        assert_eq!(arena.node(3).count, 0);

        assert_eq!(arena.alloc(node(70)), 7);
        assert_eq!(arena.alloc(node(30)), 3);
        assert_eq!(arena.alloc(node(10)), 10);
        assert_eq!(arena.live(), 11);
        assert_eq!(arena.node(3).count, 30);
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut arena = filled(100);
        let before = arena.clone();
        arena.node_mut(5).unwrap().count = 500;
        arena.release(6);

        assert_eq!(before.node(5).count, 5);
        assert_eq!(before.node(6).count, 6);
        assert_eq!(arena.node(5).count, 500);
        assert_eq!(arena.node(6).count, 0);
    }

    #[test]
    fn test_write_after_clone_copies_only_its_path() {
        let mut arena = filled((WIDTH * WIDTH) as u64);
        let before = arena.clone();
        arena.node_mut(0).unwrap().count = 99;

        let (Chunk::Branch(old), Chunk::Branch(new)) = (&*before.root, &*arena.root) else {
            panic!("expected a branch root");
        };
        assert!(!Arc::ptr_eq(&before.root, &arena.root));
        assert!(!Arc::ptr_eq(&old[0], &new[0]));
        assert!(old[1..]
            .iter()
            .zip(&new[1..])
            .all(|(a, b)| Arc::ptr_eq(a, b)));
    }
}
