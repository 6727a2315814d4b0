//! Destruction subscriptions

use std::collections::BTreeMap;

use strand_core::{DestroyCallback, NodeHandle, SubscriptionId};

#[derive(Default)]
pub struct Subscriptions {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, (NodeHandle, DestroyCallback)>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, node: NodeHandle, callback: DestroyCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, (node, callback));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Remove and return every callback installed on one of `nodes`
    ///
    /// Callbacks are handed back so they can run without the registry lock.
    pub fn take_for(&mut self, nodes: &[NodeHandle]) -> Vec<(NodeHandle, DestroyCallback)> {
        let ids: Vec<SubscriptionId> = self
            .entries
            .iter()
            .filter(|(_, (node, _))| nodes.contains(node))
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    /// Remove and return every callback
    pub fn take_all(&mut self) -> Vec<(NodeHandle, DestroyCallback)> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_take_for_only_matching() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut subs = Subscriptions::new();
        let a = NodeHandle::new(0, 0);
        let b = NodeHandle::new(1, 0);

        for node in [a, a, b] {
            let fired = fired.clone();
            subs.subscribe(node, Box::new(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let taken = subs.take_for(&[a]);
        assert_eq!(taken.len(), 2);
        assert_eq!(subs.len(), 1);
        for (node, callback) in taken {
            callback(node);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let mut subs = Subscriptions::new();
        let id = subs.subscribe(NodeHandle::new(0, 0), Box::new(|_| {}));
        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        assert!(subs.is_empty());
    }
}
