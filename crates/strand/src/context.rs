//! Scoped evaluation time

use crate::session::Session;

/// Sets the host's current time while alive and restores the previous time
/// when dropped, whichever way the scope is left
pub struct TimeContext {
    session: Session,
    time: f64,
    previous: f64,
}

impl TimeContext {
    pub(crate) fn enter(session: Session, time: f64) -> Self {
        let host = session.host();
        let previous = host.current_time();
        host.set_current_time(time);
        log::trace!("Entered time {} (was {})", time, previous);
        Self {
            session,
            time,
            previous,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time that is restored on exit
    pub fn previous(&self) -> f64 {
        self.previous
    }
}

impl Drop for TimeContext {
    fn drop(&mut self) {
        self.session.host().set_current_time(self.previous);
    }
}
