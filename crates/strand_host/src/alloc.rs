//! Generational node handle allocation
//!
//! Freed indices are recycled with a bumped generation, so a stale handle
//! never resolves to the node that replaced it. Hash codes derive from the
//! index alone and are therefore reused once a slot is recycled.

use strand_core::NodeHandle;

pub struct NodeAllocator {
    /// Generations for each slot
    generations: Vec<u32>,
    /// Free list of available indices
    free_list: Vec<u32>,
}

impl NodeAllocator {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
        }
    }

    /// Allocate a new handle, preferring the most recently freed slot
    pub fn allocate(&mut self) -> NodeHandle {
        if let Some(index) = self.free_list.pop() {
            NodeHandle::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            NodeHandle::new(index, 0)
        }
    }

    /// Free a handle, making its index available for reuse
    pub fn free(&mut self, handle: NodeHandle) -> bool {
        if !self.is_valid(handle) {
            return false;
        }
        let gen = &mut self.generations[handle.index() as usize];
        *gen = gen.wrapping_add(1);
        self.free_list.push(handle.index());
        true
    }

    /// Check if a handle is still valid
    pub fn is_valid(&self, handle: NodeHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        match self.generations.get(handle.index() as usize) {
            Some(gen) => *gen == handle.generation() && !self.free_list.contains(&handle.index()),
            None => false,
        }
    }

    /// Get the number of allocated handles
    pub fn len(&self) -> usize {
        self.generations.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity hash for the slot a handle occupies
    pub fn hash_of(handle: NodeHandle) -> u64 {
        // splitmix64 finaliser over the index
        let mut z = (handle.index() as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl Default for NodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}
