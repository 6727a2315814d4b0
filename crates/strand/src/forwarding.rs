//! Handle forwarding for replayed batches
//!
//! Undo and redo re-create nodes under new handles. Batch operations keep
//! the handles they first recorded and resolve them through this map. Every
//! live batch holds the handles it records; an entry lives only while its
//! key is held, so finished history stops costing memory.

use std::collections::HashMap;

use strand_core::NodeHandle;

#[derive(Debug, Default)]
pub(crate) struct ForwardingMap {
    /// Recorded handle to the handle it means today, always one hop
    targets: HashMap<NodeHandle, NodeHandle>,
    /// Number of live batch operations recording each handle
    holds: HashMap<NodeHandle, usize>,
}

impl ForwardingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, node: NodeHandle) -> NodeHandle {
        self.targets.get(&node).copied().unwrap_or(node)
    }

    /// Whoever meant `old` now means `new`
    pub fn forward(&mut self, old: NodeHandle, new: NodeHandle) {
        if old == new {
            return;
        }
        for target in self.targets.values_mut() {
            if *target == old {
                *target = new;
            }
        }
        if self.holds.contains_key(&old) {
            self.targets.insert(old, new);
        }
    }

    pub fn hold(&mut self, handles: &[NodeHandle]) {
        for handle in handles {
            *self.holds.entry(*handle).or_insert(0) += 1;
        }
    }

    pub fn release(&mut self, handles: &[NodeHandle]) {
        for handle in handles {
            if let Some(count) = self.holds.get_mut(handle) {
                *count -= 1;
                if *count == 0 {
                    self.holds.remove(handle);
                    self.targets.remove(handle);
                }
            }
        }
    }

    /// Every forwarded handle mapped to its current one
    pub fn snapshot(&self) -> HashMap<NodeHandle, NodeHandle> {
        self.targets.clone()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[cfg(test)]
    pub fn held(&self) -> usize {
        self.holds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32, generation: u32) -> NodeHandle {
        NodeHandle::new(index, generation)
    }

    #[test]
    fn test_unheld_handles_are_not_forwarded() {
        let mut map = ForwardingMap::new();
        map.forward(handle(0, 0), handle(1, 0));
        assert_eq!(map.len(), 0);
        assert_eq!(map.current(handle(0, 0)), handle(0, 0));
    }

    #[test]
    fn test_chains_collapse_to_one_hop() {
        let mut map = ForwardingMap::new();
        let first = handle(0, 0);
        map.hold(&[first]);

        map.forward(first, handle(0, 1));
        map.forward(handle(0, 1), handle(0, 2));
        map.forward(handle(0, 2), handle(0, 3));

        assert_eq!(map.len(), 1);
        assert_eq!(map.current(first), handle(0, 3));
    }

    #[test]
    fn test_release_prunes_entries() {
        let mut map = ForwardingMap::new();
        let first = handle(0, 0);
        map.hold(&[first]);
        map.hold(&[first]);
        map.forward(first, handle(0, 1));

        map.release(&[first]);
        assert_eq!(map.current(first), handle(0, 1));

        map.release(&[first]);
        assert_eq!(map.len(), 0);
        assert_eq!(map.held(), 0);
        assert_eq!(map.current(first), first);
    }
}
