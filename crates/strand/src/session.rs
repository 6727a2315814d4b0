//! The process-scoped service object
//!
//! A [`Session`] owns the identity table, the attribute path cache and the
//! reuse counters for one host. Cloning is cheap; every clone shares the
//! same tables. Tests build a fresh session per case.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use strand_core::{Config, Host, NodeHandle, PlugHandle};

use crate::context::TimeContext;
use crate::dag::DagNode;
use crate::error::{Error, Result};
use crate::forwarding::ForwardingMap;
use crate::identity::IdentityTable;
use crate::modifier::{single, Modifier, ModifierOptions};
use crate::node::{Node, NodeInner, Nodes};
use crate::path_cache::{is_cacheable, PathCache};
use crate::stats::{Stats, StatsSnapshot, Timing};
use crate::undo::UndoBridge;

/// Oldest host version the access layer talks to
pub const MIN_HOST_VERSION: u32 = 2019;

pub(crate) struct Shared {
    pub host: Arc<dyn Host>,
    pub config: Config,
    pub identity: Mutex<IdentityTable>,
    pub paths: Mutex<PathCache>,
    pub stats: Stats,
    /// Handles replaced by a re-created or restored node, old to new
    pub forwarding: Mutex<ForwardingMap>,
}

impl Shared {
    pub fn timing(&self, label: &'static str) -> Timing<'_> {
        Timing::start(&self.stats, label, self.config.timings)
    }

    /// Resolve an attribute name, going through the path cache when enabled
    ///
    /// The cache lock is never held across a host call.
    pub fn find_plug(&self, node: NodeHandle, name: &str) -> Result<PlugHandle> {
        let _timing = self.timing("find_plug");
        let cacheable = self.config.plug_reuse && is_cacheable(name);

        if cacheable {
            let cached = self.paths.lock().get(node, name);
            if let Some(plug) = cached {
                if self.host.plug_valid(&plug) {
                    self.stats.record_plug_reuse();
                    log::trace!("Reusing plug {:?}.{}", node, name);
                    return Ok(plug);
                }
                self.paths.lock().forget(node, name);
            }
        }

        let plug = self.host.find_plug(node, name)?;
        if cacheable {
            self.paths.lock().insert(node, name, plug.clone());
        }
        Ok(plug)
    }

    /// The handle a batch operation recorded as `node` refers to today
    pub fn current(&self, node: NodeHandle) -> NodeHandle {
        self.forwarding.lock().current(node)
    }

    pub fn forward(&self, old: NodeHandle, new: NodeHandle) {
        if old != new {
            log::trace!("Forwarding {:?} to {:?}", old, new);
            self.forwarding.lock().forward(old, new);
        }
    }

    /// Every forwarded handle mapped to its current one
    pub fn forwarding_map(&self) -> HashMap<NodeHandle, NodeHandle> {
        self.forwarding.lock().snapshot()
    }

    /// Keep forwarding entries for `handles` while a batch records them
    pub fn hold(&self, handles: &[NodeHandle]) {
        self.forwarding.lock().hold(handles);
    }

    pub fn release(&self, handles: &[NodeHandle]) {
        self.forwarding.lock().release(handles);
    }

    /// Forget everything cached about the attribute layout of `node`
    pub fn invalidate_structure(&self, node: NodeHandle) {
        self.paths.lock().invalidate(node);
        if let Ok(hash) = self.host.hash_code(node) {
            let inner = self.identity.lock().get(hash);
            if let Some(inner) = inner.filter(|i| i.handle == node) {
                inner.clear_caches();
            }
        }
        log::debug!("Attribute layout of {:?} changed", node);
    }

    /// Mark the wrapper of an already deleted handle dead
    ///
    /// Only needed when destruction subscriptions are skipped.
    pub fn retire(&self, node: NodeHandle) {
        let inner = self.identity.lock().by_handle(node);
        if let Some(inner) = inner {
            inner.mark_dead();
        }
    }
}

/// Entry point of the access layer
#[derive(Clone)]
pub struct Session {
    pub(crate) shared: Arc<Shared>,
}

impl Session {
    /// Create a session configured from `STRAND_*` environment variables
    pub fn new(host: Arc<dyn Host>) -> Result<Self> {
        Self::with_config(host, Config::from_env())
    }

    pub fn with_config(host: Arc<dyn Host>, config: Config) -> Result<Self> {
        let config = config.effective();
        let version = host.version();
        if version < MIN_HOST_VERSION {
            if !config.ignore_version {
                return Err(Error::UnsupportedHost {
                    version,
                    minimum: MIN_HOST_VERSION,
                });
            }
            log::warn!("Host version {} is unsupported, continuing anyway", version);
        }
        if config.is_rogue() {
            log::warn!("Rogue mode enabled: destroyed nodes are no longer tracked");
        }
        log::info!(
            "Session started (host {}, node reuse {}, plug reuse {})",
            version,
            config.node_reuse,
            config.plug_reuse
        );

        Ok(Self {
            shared: Arc::new(Shared {
                host,
                config,
                identity: Mutex::new(IdentityTable::new()),
                paths: Mutex::new(PathCache::new()),
                stats: Stats::default(),
                forwarding: Mutex::new(ForwardingMap::new()),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.shared.host
    }

    /// The configuration in effect, after safe mode was applied
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.shared.stats.reset();
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Return the wrapper for `handle`, creating one if needed
    ///
    /// Within a handle's lifetime every call returns the same instance,
    /// unless node reuse is disabled.
    pub fn wrap(&self, handle: NodeHandle) -> Result<Node> {
        let shared = &self.shared;
        let _timing = shared.timing("wrap");

        if !shared.host.is_valid(handle) {
            return Err(Error::Existence {
                path: format!("{:?}", handle),
            });
        }
        let hash = shared.host.hash_code(handle)?;

        if shared.config.node_reuse {
            let existing = shared.identity.lock().get(hash);
            match existing {
                Some(inner) if inner.handle == handle && inner.is_alive() => {
                    shared.stats.record_node_reuse();
                    return Ok(Node(inner));
                }
                Some(stale) => {
                    log::debug!("Hash {:x} was recycled, dropping {:?}", hash, stale.handle);
                }
                None => {}
            }
        }

        let inner = NodeInner::create(self.shared.clone(), handle, hash)?;
        if shared.config.node_reuse {
            shared.identity.lock().insert(hash, &inner);
        }
        Ok(Node(inner))
    }

    /// Find a node by name or path
    pub fn encode(&self, path: &str) -> Result<Node> {
        let handle = self.shared.host.lookup(path).map_err(|e| {
            log::debug!("encode({}) failed: {}", path, e);
            Error::Existence {
                path: path.to_string(),
            }
        })?;
        self.wrap(handle)
    }

    /// The live wrapper registered under `hash`
    pub fn from_hash(&self, hash: u64) -> Option<Node> {
        let inner = self.shared.identity.lock().get(hash)?;
        inner.is_alive().then_some(Node(inner))
    }

    pub fn from_hex(&self, hex: &str) -> Option<Node> {
        let hash = u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()?;
        self.from_hash(hash)
    }

    /// Wrap `handle` and return its hash
    pub fn to_hash(&self, handle: NodeHandle) -> Result<u64> {
        Ok(self.wrap(handle)?.hash())
    }

    /// The host hash of `handle`, without touching the identity table
    pub fn as_hash(&self, handle: NodeHandle) -> Result<u64> {
        Ok(self.shared.host.hash_code(handle)?)
    }

    /// Forget every wrapper and cached attribute path
    ///
    /// Existing wrappers stay usable; they just stop being returned by
    /// lookups.
    pub fn clear(&self) {
        self.shared.identity.lock().clear();
        self.shared.paths.lock().clear();
        log::debug!("Cleared identity table and path cache");
    }

    /// Number of handles currently forwarded for replayed batches
    pub fn forwarding_len(&self) -> usize {
        self.shared.forwarding.lock().len()
    }

    /// Number of entries in the identity table
    pub fn identity_len(&self) -> usize {
        self.shared.identity.lock().len()
    }

    /// Number of cached attribute paths
    pub fn path_cache_len(&self) -> usize {
        self.shared.paths.lock().len()
    }

    /// Every node, optionally filtered by type
    pub fn ls(&self, type_name: Option<&str>) -> Nodes {
        Nodes::new(self.clone(), self.shared.host.ls(type_name))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Create a node as a single undoable step
    pub fn create_node(&self, type_name: &str, name: Option<&str>) -> Result<Node> {
        single(self, |m| m.create_node(type_name, name))
    }

    /// Create a hierarchy node, optionally under `parent`
    pub fn create_dag(
        &self,
        type_name: &str,
        name: Option<&str>,
        parent: Option<&DagNode>,
    ) -> Result<DagNode> {
        let node = single(self, |m| m.create_node_with(type_name, name, parent))?;
        node.as_dag().ok_or_else(|| Error::Type {
            path: node.path().unwrap_or_else(|_| type_name.to_string()),
            reason: format!("{} is not a hierarchy type", type_name),
        })
    }

    pub fn modifier(&self) -> Modifier {
        Modifier::new(self.clone(), ModifierOptions::default())
    }

    pub fn modifier_with(&self, options: ModifierOptions) -> Modifier {
        Modifier::new(self.clone(), options)
    }

    /// Run `f` inside a batch
    ///
    /// The batch commits when `f` returns `Ok`. Otherwise an atomic batch
    /// rolls back everything it applied, and the error is returned
    /// unchanged.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Modifier) -> Result<T>) -> Result<T> {
        self.transaction_with(ModifierOptions::default(), f)
    }

    pub fn transaction_with<T>(
        &self,
        options: ModifierOptions,
        f: impl FnOnce(&mut Modifier) -> Result<T>,
    ) -> Result<T> {
        let mut modifier = Modifier::new(self.clone(), options);
        match f(&mut modifier) {
            Ok(value) => {
                modifier.commit()?;
                Ok(value)
            }
            Err(e) if modifier.options().atomic => {
                modifier.rollback();
                Err(e)
            }
            Err(e) => {
                // Non-atomic batches keep what was applied
                if let Err(commit_error) = modifier.commit() {
                    log::error!("Failed to commit partial batch: {}", commit_error);
                }
                Err(e)
            }
        }
    }

    pub fn undo(&self) -> UndoBridge {
        UndoBridge::new(self.clone())
    }

    // ========================================================================
    // Time
    // ========================================================================

    pub fn current_time(&self) -> f64 {
        self.shared.host.current_time()
    }

    /// Set the evaluation time until the returned guard is dropped
    pub fn at_time(&self, time: f64) -> TimeContext {
        TimeContext::enter(self.clone(), time)
    }

    pub fn with_time<R>(&self, time: f64, f: impl FnOnce() -> R) -> R {
        let _context = self.at_time(time);
        f()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host_version", &self.shared.host.version())
            .field("config", &self.shared.config)
            .finish()
    }
}
