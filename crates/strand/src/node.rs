//! Node wrappers
//!
//! A [`Node`] is a cheap, clonable reference to one shared wrapper instance.
//! Two `Node`s compare equal when they refer to the same host handle;
//! [`Node::same_instance`] tests wrapper identity.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strand_core::{AttributeSpec, NodeHandle, NodeKind, PlugHandle, SubscriptionId, Unit, Value};

use crate::anim::AnimCurve;
use crate::dag::DagNode;
use crate::destruction;
use crate::error::{Error, Result};
use crate::modifier::single;
use crate::plug::Plug;
use crate::session::{Session, Shared};
use crate::set::ObjectSet;

/// Per-wrapper mutable state
#[derive(Default)]
pub(crate) struct NodeState {
    /// Value of the last non-cached read, per plug and unit
    pub values: HashMap<(PlugHandle, Option<Unit>), Value>,
    /// Last path the node was known by, for diagnostics after death
    pub last_path: String,
    pub subscription: Option<SubscriptionId>,
}

pub(crate) struct NodeInner {
    pub shared: Arc<Shared>,
    pub handle: NodeHandle,
    pub hash: u64,
    pub kind: NodeKind,
    pub(crate) alive: AtomicBool,
    pub state: Mutex<NodeState>,
}

impl NodeInner {
    pub fn create(shared: Arc<Shared>, handle: NodeHandle, hash: u64) -> Result<Arc<Self>> {
        let kind = shared.host.node_kind(handle)?;
        let last_path = shared
            .host
            .node_path(handle)
            .unwrap_or_else(|_| format!("{:?}", handle));

        let inner = Arc::new(Self {
            shared,
            handle,
            hash,
            kind,
            alive: AtomicBool::new(true),
            state: Mutex::new(NodeState {
                last_path,
                ..NodeState::default()
            }),
        });
        inner.shared.stats.record_init();

        if !inner.shared.config.is_rogue() {
            destruction::track(&inner)?;
        }
        Ok(inner)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn last_path(&self) -> String {
        self.state.lock().last_path.clone()
    }

    pub fn clear_caches(&self) {
        self.state.lock().values.clear();
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if let Some(id) = self.state.get_mut().subscription.take() {
            self.shared.host.unsubscribe(id);
        }
    }
}

/// Stable proxy for a host node
#[derive(Clone)]
pub struct Node(pub(crate) Arc<NodeInner>);

impl Node {
    pub(crate) fn inner(&self) -> &NodeInner {
        &self.0
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.0.shared
    }

    pub fn session(&self) -> Session {
        Session::from_shared(self.0.shared.clone())
    }

    pub fn handle(&self) -> NodeHandle {
        self.0.handle
    }

    pub fn hash(&self) -> u64 {
        self.0.hash
    }

    /// Hash as lowercase hexadecimal
    pub fn hex(&self) -> String {
        format!("{:x}", self.0.hash)
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    /// Whether both values are the very same wrapper instance
    pub fn same_instance(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True while the underlying node is alive. Never fails.
    pub fn exists(&self) -> bool {
        self.0.is_alive() && self.0.shared.host.is_valid(self.0.handle)
    }

    pub fn is_alive(&self) -> bool {
        self.exists()
    }

    pub fn destroyed(&self) -> bool {
        !self.exists()
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        self.0.ensure_alive()
    }

    // ========================================================================
    // Naming
    // ========================================================================

    pub fn name(&self) -> Result<String> {
        self.ensure_alive()?;
        Ok(self.0.shared.host.node_name(self.0.handle)?)
    }

    /// Namespace prefix of the name, empty when there is none
    pub fn namespace(&self) -> Result<String> {
        let name = self.name()?;
        Ok(name
            .rsplit_once(':')
            .map(|(namespace, _)| namespace.to_string())
            .unwrap_or_default())
    }

    /// Full path, `|a|b` for hierarchy nodes and the name otherwise
    pub fn path(&self) -> Result<String> {
        self.ensure_alive()?;
        let path = self.0.shared.host.node_path(self.0.handle)?;
        self.0.state.lock().last_path = path.clone();
        Ok(path)
    }

    /// Shortest unambiguous path; resolves back through [`Session::encode`]
    pub fn shortest_path(&self) -> Result<String> {
        self.ensure_alive()?;
        Ok(self.0.shared.host.shortest_path(self.0.handle)?)
    }

    pub fn type_name(&self) -> Result<String> {
        self.ensure_alive()?;
        Ok(self.0.shared.host.type_name(self.0.handle)?)
    }

    pub fn is_a(&self, type_name: &str) -> Result<bool> {
        Ok(self.type_name()? == type_name)
    }

    pub fn rename(&self, name: &str) -> Result<String> {
        single(&self.session(), |m| m.rename(self, name))
    }

    /// Delete the node and everything below it as one undoable step
    pub fn delete(&self) -> Result<()> {
        single(&self.session(), |m| m.delete_node(self))
    }

    pub fn lock(&self, locked: bool) -> Result<()> {
        self.ensure_alive()?;
        Ok(self.0.shared.host.set_node_locked(self.0.handle, locked)?)
    }

    pub fn is_locked(&self) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.0.shared.host.is_node_locked(self.0.handle)?)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Plug for `name`, which may be long, short, dotted or indexed
    pub fn attribute(&self, name: &str) -> Result<Plug> {
        self.ensure_alive()?;
        let handle = self.0.shared.find_plug(self.0.handle, name)?;
        Ok(Plug::new(self.clone(), handle, None))
    }

    /// Plug that reads and writes in `unit`
    pub fn attribute_as(&self, name: &str, unit: Unit) -> Result<Plug> {
        Ok(self.attribute(name)?.with_unit(unit))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attribute(name).is_ok()
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.attribute(name)?.read()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.attribute(name)?.write(value)
    }

    /// Write several attributes, stopping at the first failure
    pub fn update<'a, V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = (&'a str, V)>,
    ) -> Result<()> {
        for (name, value) in values {
            self.set(name, value)?;
        }
        Ok(())
    }

    /// Add a dynamic attribute as one undoable step
    pub fn add_attr(&self, spec: AttributeSpec) -> Result<Plug> {
        let name = spec.name.clone();
        single(&self.session(), |m| m.add_attr(self, spec))?;
        self.attribute(&name)
    }

    pub fn remove_attr(&self, name: &str) -> Result<()> {
        single(&self.session(), |m| m.delete_attr(self, name))
    }

    /// Names of every top-level attribute, static ones first
    pub fn attribute_names(&self) -> Result<Vec<String>> {
        self.ensure_alive()?;
        Ok(self.0.shared.host.attribute_names(self.0.handle)?)
    }

    /// Drop cached values and attribute paths of this node
    pub fn clear(&self) {
        self.0.clear_caches();
        self.0.shared.paths.lock().invalidate(self.0.handle);
    }

    /// Every readable attribute and its current value
    pub fn dump(&self) -> Result<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for name in self.attribute_names()? {
            match self.get(&name) {
                Ok(Value::Null) => {}
                Ok(value) => {
                    values.insert(name, value);
                }
                Err(e) => log::debug!("Skipping {} in dump: {}", name, e),
            }
        }
        Ok(values)
    }

    /// [`Node::dump`] as pretty-printed JSON
    pub fn dumps(&self) -> Result<String> {
        let values = self.dump()?;
        serde_json::to_string_pretty(&values).map_err(|e| Error::Type {
            path: self.0.last_path(),
            reason: e.to_string(),
        })
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Plug pairs `(local, remote)` connected to this node
    pub fn plug_connections(&self, source: bool, destination: bool) -> Result<Vec<(Plug, Plug)>> {
        self.ensure_alive()?;
        let session = self.session();
        let mut pairs = Vec::new();

        for (src, dst) in self.0.shared.host.connections(self.0.handle)? {
            let (local, remote) = if dst.node() == self.0.handle && source {
                (dst, src)
            } else if src.node() == self.0.handle && destination {
                (src, dst)
            } else {
                continue;
            };
            let remote_node = session.wrap(remote.node())?;
            pairs.push((
                Plug::new(self.clone(), local, None),
                Plug::new(remote_node, remote, None),
            ));
        }
        Ok(pairs)
    }

    /// Nodes upstream (`source`) and/or downstream (`destination`) of this one
    pub fn connections(&self, source: bool, destination: bool) -> Result<Nodes> {
        self.ensure_alive()?;
        let mut seen = HashSet::new();
        let handles = self
            .0
            .shared
            .host
            .connections(self.0.handle)?
            .into_iter()
            .filter_map(|(src, dst)| {
                if dst.node() == self.0.handle && source {
                    Some(src.node())
                } else if src.node() == self.0.handle && destination {
                    Some(dst.node())
                } else {
                    None
                }
            })
            .filter(|h| seen.insert(*h))
            .collect();
        Ok(Nodes::new(self.session(), handles))
    }

    /// First connected node, if any
    pub fn connection(&self, source: bool, destination: bool) -> Result<Option<Node>> {
        Ok(self.connections(source, destination)?.next())
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    pub fn as_dag(&self) -> Option<DagNode> {
        (self.0.kind == NodeKind::Dag).then(|| DagNode::from_node(self.clone()))
    }

    pub fn as_set(&self) -> Option<ObjectSet> {
        (self.0.kind == NodeKind::Set).then(|| ObjectSet::from_node(self.clone()))
    }

    pub fn as_anim_curve(&self) -> Option<AnimCurve> {
        (self.0.kind == NodeKind::AnimCurve).then(|| AnimCurve::from_node(self.clone()))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.0.handle == other.0.handle
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.handle.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.0.last_path())
            .field("handle", &self.0.handle)
            .field("alive", &self.0.is_alive())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Ok(path) => f.write_str(&path),
            Err(_) => write!(f, "{} (dead)", self.0.last_path()),
        }
    }
}

/// Lazy sequence of node wrappers
///
/// The handles are captured when the sequence is created; each is wrapped
/// on demand. Handles that died in the meantime are skipped.
pub struct Nodes {
    session: Session,
    handles: std::vec::IntoIter<NodeHandle>,
}

impl Nodes {
    pub(crate) fn new(session: Session, handles: Vec<NodeHandle>) -> Self {
        Self {
            session,
            handles: handles.into_iter(),
        }
    }
}

impl Iterator for Nodes {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        for handle in self.handles.by_ref() {
            match self.session.wrap(handle) {
                Ok(node) => return Some(node),
                Err(e) => log::debug!("Skipping {:?}: {}", handle, e),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.handles.len()))
    }
}
