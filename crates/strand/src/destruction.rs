//! Destruction tracking
//!
//! Every wrapper starts alive and goes dead exactly once: when the host
//! reports the node destroyed, when it is deleted through this layer, or when
//! the scene is cleared. Dead is terminal. A restored node gets a new handle
//! and therefore a new wrapper.
//!
//! The host subscription holds only a weak reference, so a wrapper nobody
//! uses can still be dropped.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::node::NodeInner;

/// Install the host subscription that kills `inner` when its node dies
pub(crate) fn track(inner: &Arc<NodeInner>) -> Result<()> {
    let weak: Weak<NodeInner> = Arc::downgrade(inner);
    let id = inner.shared.host.subscribe_destroyed(
        inner.handle,
        Box::new(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.mark_dead();
            }
        }),
    )?;
    inner.state.lock().subscription = Some(id);
    Ok(())
}

impl NodeInner {
    /// Transition to dead, clearing every cache that refers to this node
    ///
    /// Idempotent.
    pub(crate) fn mark_dead(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }

        let (path, subscription) = {
            let mut state = self.state.lock();
            state.values.clear();
            (state.last_path.clone(), state.subscription.take())
        };

        self.shared.paths.lock().invalidate(self.handle);
        self.shared.identity.lock().remove(self.hash, self as *const NodeInner);
        if let Some(id) = subscription {
            self.shared.host.unsubscribe(id);
        }
        log::debug!("{} destroyed", path);
    }

    pub(crate) fn existence_error(&self) -> Error {
        Error::Existence {
            path: self.last_path(),
        }
    }

    /// Fail with [`Error::Existence`] unless the node is still alive
    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if !self.is_alive() {
            return Err(self.existence_error());
        }
        if !self.shared.config.is_rogue() && !self.shared.host.is_valid(self.handle) {
            self.mark_dead();
            return Err(self.existence_error());
        }
        Ok(())
    }
}
