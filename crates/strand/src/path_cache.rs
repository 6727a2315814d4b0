//! Cache of attribute name resolutions
//!
//! Keyed by node handle and the name as requested. Entries survive value
//! writes and are dropped wholesale when the node's attribute layout changes
//! or the node dies.

use std::collections::HashMap;

use strand_core::{NodeHandle, PlugHandle};

#[derive(Default)]
pub(crate) struct PathCache {
    entries: HashMap<NodeHandle, HashMap<String, PlugHandle>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeHandle, name: &str) -> Option<PlugHandle> {
        self.entries.get(&node)?.get(name).cloned()
    }

    pub fn insert(&mut self, node: NodeHandle, name: &str, plug: PlugHandle) {
        self.entries
            .entry(node)
            .or_default()
            .insert(name.to_string(), plug);
    }

    pub fn forget(&mut self, node: NodeHandle, name: &str) {
        if let Some(names) = self.entries.get_mut(&node) {
            names.remove(name);
        }
    }

    /// Drop every entry belonging to `node`
    pub fn invalidate(&mut self, node: NodeHandle) {
        if self.entries.remove(&node).is_some() {
            log::trace!("Invalidated attribute paths of {:?}", node);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }
}

/// Indexed lookups bypass the cache
pub(crate) fn is_cacheable(name: &str) -> bool {
    !name.contains('[')
}
