//! Reuse counters and optional timing

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Counters kept per session
#[derive(Debug, Default)]
pub struct Stats {
    node_init: AtomicU64,
    node_reuse: AtomicU64,
    plug_reuse: AtomicU64,
    last_timing_us: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Wrappers constructed from scratch
    pub node_init: u64,
    /// Wrappers returned from the identity table
    pub node_reuse: u64,
    /// Plugs returned from a wrapper's plug cache
    pub plug_reuse: u64,
    pub last_timing_us: u64,
}

impl Stats {
    pub(crate) fn record_init(&self) {
        self.node_init.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_node_reuse(&self) {
        self.node_reuse.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_plug_reuse(&self) {
        self.plug_reuse.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            node_init: self.node_init.load(Ordering::Relaxed),
            node_reuse: self.node_reuse.load(Ordering::Relaxed),
            plug_reuse: self.plug_reuse.load(Ordering::Relaxed),
            last_timing_us: self.last_timing_us.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.node_init.store(0, Ordering::Relaxed);
        self.node_reuse.store(0, Ordering::Relaxed);
        self.plug_reuse.store(0, Ordering::Relaxed);
        self.last_timing_us.store(0, Ordering::Relaxed);
    }
}

/// Scope guard recording how long a wrapper construction took
pub(crate) struct Timing<'a> {
    stats: &'a Stats,
    label: &'static str,
    start: Option<Instant>,
}

impl<'a> Timing<'a> {
    pub fn start(stats: &'a Stats, label: &'static str, enabled: bool) -> Self {
        Self {
            stats,
            label,
            start: enabled.then(Instant::now),
        }
    }
}

impl Drop for Timing<'_> {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            let micros = start.elapsed().as_micros() as u64;
            self.stats.last_timing_us.store(micros, Ordering::Relaxed);
            log::debug!("{} took {}us", self.label, micros);
        }
    }
}
