//! Hash-keyed table of live wrappers
//!
//! Entries are non-owning. A wrapper nobody holds any more simply fails to
//! upgrade and is pruned on the next lookup of its hash.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use strand_core::NodeHandle;

use crate::node::NodeInner;

#[derive(Default)]
pub(crate) struct IdentityTable {
    entries: HashMap<u64, Weak<NodeInner>>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live wrapper registered under `hash`, if any
    pub fn get(&mut self, hash: u64) -> Option<Arc<NodeInner>> {
        let entry = self.entries.get(&hash)?;
        match entry.upgrade() {
            Some(inner) => Some(inner),
            None => {
                self.entries.remove(&hash);
                None
            }
        }
    }

    pub fn insert(&mut self, hash: u64, inner: &Arc<NodeInner>) {
        self.entries.insert(hash, Arc::downgrade(inner));
    }

    /// Remove the entry for `hash` only if it still refers to `inner`
    ///
    /// A recycled hash may already belong to a newer wrapper.
    pub fn remove(&mut self, hash: u64, inner: *const NodeInner) -> bool {
        match self.entries.get(&hash) {
            Some(entry) if std::ptr::eq(entry.as_ptr(), inner) => {
                self.entries.remove(&hash);
                true
            }
            _ => false,
        }
    }

    /// Linear scan for the wrapper of a handle whose hash is no longer known
    pub fn by_handle(&mut self, handle: NodeHandle) -> Option<Arc<NodeInner>> {
        self.entries
            .values()
            .filter_map(Weak::upgrade)
            .find(|inner| inner.handle == handle)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
