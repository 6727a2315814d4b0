//! Registration of reversible steps on the host undo stack
//!
//! There is no private undo stack. Every step lands on the host's single
//! global stack, so host-level undo and redo drive these closures.

use crate::error::{Error, Result};
use crate::session::Session;

pub struct UndoBridge {
    session: Session,
}

impl UndoBridge {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Whether steps are recorded at all
    pub fn enabled(&self) -> bool {
        self.session.config().undo
    }

    /// Record a change the caller already made
    ///
    /// Without a redo closure there is nothing to re-apply, so redoing this
    /// step does nothing. Use [`UndoBridge::perform`] when the change should
    /// be repeatable.
    pub fn commit<U>(&self, name: &str, undo: U)
    where
        U: FnMut() -> Result<()> + Send + 'static,
    {
        self.commit_with_redo(name, undo, || Ok(()));
    }

    pub fn commit_with_redo<U, R>(&self, name: &str, mut undo: U, mut redo: R)
    where
        U: FnMut() -> Result<()> + Send + 'static,
        R: FnMut() -> Result<()> + Send + 'static,
    {
        if !self.enabled() {
            log::debug!("Undo disabled, not recording '{}'", name);
            return;
        }
        self.session.host().register_undo(
            name,
            Box::new(move || undo().map_err(Error::into_host)),
            Box::new(move || redo().map_err(Error::into_host)),
        );
        log::trace!("Recorded undo step '{}'", name);
    }

    /// Run `action` now and record it, with `undo` as its inverse
    ///
    /// Redo runs `action` again.
    pub fn perform<A, U>(&self, name: &str, mut action: A, undo: U) -> Result<()>
    where
        A: FnMut() -> Result<()> + Send + 'static,
        U: FnMut() -> Result<()> + Send + 'static,
    {
        action()?;
        self.commit_with_redo(name, undo, action);
        Ok(())
    }
}
