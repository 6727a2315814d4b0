//! Batched, reversible scene mutations
//!
//! Every operation queued on a [`Modifier`] is applied to the host right
//! away and recorded. A failure reverts what the batch already applied, in
//! reverse order, when the batch is atomic. Committing registers the whole
//! batch as a single step on the host undo stack.
//!
//! Operations remember the handles they touched. When undo or redo
//! re-creates a node it gets a new handle, so the session keeps a
//! forwarding map that later replays resolve through.
//!
//! Queries are never answered by the batch; they always hit the host.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use strand_core::{AttributeSpec, Interpolation, Key, NodeHandle, NodeSnapshot, PlugHandle, Value};

use crate::anim::AnimCurve;
use crate::dag::DagNode;
use crate::error::{Error, ModifierError, Result};
use crate::node::Node;
use crate::plug::Plug;
use crate::session::{Session, Shared};
use crate::set::ObjectSet;

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierState {
    Building,
    Committed,
    RolledBack,
    Discarded,
}

#[derive(Debug, Clone)]
pub struct ModifierOptions {
    /// Register the committed batch on the host undo stack
    pub undoable: bool,
    /// Revert applied operations when one fails
    pub atomic: bool,
    /// Naming template for created nodes, e.g. `rig_{type}`
    ///
    /// Placeholders: `{name}`, `{type}` and `{index}`, the 1-based count of
    /// nodes this batch created so far.
    pub template: Option<String>,
    /// Undo step label
    pub name: String,
}

impl Default for ModifierOptions {
    fn default() -> Self {
        Self {
            undoable: true,
            atomic: true,
            template: None,
            name: "strand modifier".to_string(),
        }
    }
}

impl ModifierOptions {
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn undoable(mut self, undoable: bool) -> Self {
        self.undoable = undoable;
        self
    }

    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A plug an operation refers to, resolved again on every replay
#[derive(Debug, Clone)]
struct PlugRef {
    node: NodeHandle,
    path: String,
}

impl PlugRef {
    fn of(plug: &Plug) -> Result<Self> {
        plug.node().ensure_alive()?;
        let info = plug.node().shared().host.plug_info(plug.handle())?;
        Ok(Self {
            node: plug.node().handle(),
            path: info.path,
        })
    }

    fn from_handle(shared: &Shared, handle: &PlugHandle) -> Result<Self> {
        Ok(Self {
            node: handle.node(),
            path: shared.host.plug_info(handle)?.path,
        })
    }

    fn resolve(&self, shared: &Shared) -> Result<PlugHandle> {
        Ok(shared.host.find_plug(shared.current(self.node), &self.path)?)
    }
}

/// Handles of a snapshot and everything below it
fn snapshot_handles(snapshot: &NodeSnapshot, out: &mut Vec<NodeHandle>) {
    out.push(snapshot.handle);
    for child in &snapshot.children {
        snapshot_handles(child, out);
    }
}

/// Every handle a snapshot refers to, for forwarding holds
fn snapshot_references(snapshot: &NodeSnapshot, out: &mut Vec<NodeHandle>) {
    out.push(snapshot.handle);
    out.extend(snapshot.parent);
    out.extend(snapshot.connections.iter().map(|c| c.remote));
    out.extend(snapshot.memberships.iter().copied());
    out.extend(snapshot.members.iter().copied());
    for child in &snapshot.children {
        snapshot_references(child, out);
    }
}

const KEY_TOLERANCE: f64 = 1e-9;

#[derive(Debug)]
enum Op {
    CreateNode {
        type_name: String,
        name: Option<String>,
        parent: Option<NodeHandle>,
        created: Option<NodeHandle>,
    },
    DeleteNode {
        node: NodeHandle,
        snapshot: Option<NodeSnapshot>,
    },
    Rename {
        node: NodeHandle,
        name: String,
        previous: Option<String>,
    },
    Reparent {
        node: NodeHandle,
        parent: Option<NodeHandle>,
        previous: Option<Option<NodeHandle>>,
    },
    AddAttr {
        node: NodeHandle,
        spec: AttributeSpec,
    },
    DeleteAttr {
        node: NodeHandle,
        name: String,
        removed: Option<RemovedAttr>,
    },
    SetAttr {
        plug: PlugRef,
        value: Value,
        previous: Option<Value>,
    },
    ResetAttr {
        plug: PlugRef,
        previous: Option<Value>,
    },
    Connect {
        src: PlugRef,
        dst: PlugRef,
        force: bool,
        replaced: Vec<PlugRef>,
    },
    Disconnect {
        src: PlugRef,
        dst: PlugRef,
    },
    AddMember {
        set: NodeHandle,
        member: NodeHandle,
        was_member: bool,
    },
    RemoveMember {
        set: NodeHandle,
        member: NodeHandle,
    },
    SetKey {
        curve: NodeHandle,
        key: Key,
        previous: Option<Key>,
    },
}

/// What removing a dynamic attribute took with it
#[derive(Debug)]
struct RemovedAttr {
    spec: AttributeSpec,
    values: Vec<(String, Value)>,
    /// Connections as `(source, destination)`
    connections: Vec<(PlugRef, PlugRef)>,
}

impl Op {
    /// Handles this operation resolves through the forwarding map
    fn handles(&self) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        match self {
            Op::CreateNode { parent, created, .. } => {
                out.extend(*parent);
                out.extend(*created);
            }
            Op::DeleteNode { node, snapshot } => {
                out.push(*node);
                if let Some(snapshot) = snapshot {
                    snapshot_references(snapshot, &mut out);
                }
            }
            Op::Rename { node, .. } | Op::AddAttr { node, .. } => out.push(*node),
            Op::Reparent {
                node,
                parent,
                previous,
            } => {
                out.push(*node);
                out.extend(*parent);
                out.extend(previous.flatten());
            }
            Op::DeleteAttr { node, removed, .. } => {
                out.push(*node);
                if let Some(removed) = removed {
                    for (src, dst) in &removed.connections {
                        out.push(src.node);
                        out.push(dst.node);
                    }
                }
            }
            Op::SetAttr { plug, .. } | Op::ResetAttr { plug, .. } => out.push(plug.node),
            Op::Connect {
                src, dst, replaced, ..
            } => {
                out.push(src.node);
                out.push(dst.node);
                out.extend(replaced.iter().map(|p| p.node));
            }
            Op::Disconnect { src, dst } => {
                out.push(src.node);
                out.push(dst.node);
            }
            Op::AddMember { set, member, .. } | Op::RemoveMember { set, member } => {
                out.push(*set);
                out.push(*member);
            }
            Op::SetKey { curve, .. } => out.push(*curve),
        }
        out
    }

    /// Apply or revert, moving this operation's holds to what it records afterwards
    fn replay(&mut self, shared: &Shared, reverse: bool) -> Result<()> {
        let before = self.handles();
        let result = if reverse {
            self.revert(shared)
        } else {
            self.apply(shared)
        };
        shared.hold(&self.handles());
        shared.release(&before);
        result
    }

    fn describe(&self) -> String {
        match self {
            Op::CreateNode { type_name, name, .. } => match name {
                Some(name) => format!("create_node({:?}, name={:?})", type_name, name),
                None => format!("create_node({:?})", type_name),
            },
            Op::DeleteNode { node, .. } => format!("delete_node({:?})", node),
            Op::Rename { node, name, .. } => format!("rename_node({:?}, {:?})", node, name),
            Op::Reparent { node, parent, .. } => format!("reparent({:?}, {:?})", node, parent),
            Op::AddAttr { node, spec } => format!("add_attr({:?}, {:?})", node, spec.name),
            Op::DeleteAttr { node, name, .. } => format!("delete_attr({:?}, {:?})", node, name),
            Op::SetAttr { plug, value, .. } => {
                format!("set_attr({:?}.{}, {:?})", plug.node, plug.path, value)
            }
            Op::ResetAttr { plug, .. } => format!("reset_attr({:?}.{})", plug.node, plug.path),
            Op::Connect { src, dst, force, .. } => format!(
                "connect({:?}.{}, {:?}.{}, force={})",
                src.node, src.path, dst.node, dst.path, force
            ),
            Op::Disconnect { src, dst } => format!(
                "disconnect({:?}.{}, {:?}.{})",
                src.node, src.path, dst.node, dst.path
            ),
            Op::AddMember { set, member, .. } => format!("add_member({:?}, {:?})", set, member),
            Op::RemoveMember { set, member } => format!("remove_member({:?}, {:?})", set, member),
            Op::SetKey { curve, key, .. } => {
                format!("set_key({:?}, {}, {})", curve, key.time, key.value)
            }
        }
    }

    fn apply(&mut self, shared: &Shared) -> Result<()> {
        let host = &*shared.host;
        match self {
            Op::CreateNode {
                type_name,
                name,
                parent,
                created,
            } => {
                let parent = parent.map(|p| shared.current(p));
                let handle = host.create_node(type_name, name.as_deref(), parent)?;
                match created {
                    // Replay: whoever referred to the previous node now means this one
                    Some(original) => shared.forward(shared.current(*original), handle),
                    None => *created = Some(handle),
                }
                // Replays recreate the name the first run ended up with
                *name = Some(host.node_name(handle)?);
            }
            Op::DeleteNode { node, snapshot } => {
                let taken = host.delete_node(shared.current(*node))?;
                if shared.config.is_rogue() {
                    let mut handles = Vec::new();
                    snapshot_handles(&taken, &mut handles);
                    for handle in handles {
                        shared.retire(handle);
                    }
                }
                *snapshot = Some(taken);
            }
            Op::Rename {
                node,
                name,
                previous,
            } => {
                let handle = shared.current(*node);
                *previous = Some(host.node_name(handle)?);
                host.rename_node(handle, name)?;
            }
            Op::Reparent {
                node,
                parent,
                previous,
            } => {
                let handle = shared.current(*node);
                *previous = Some(host.parent(handle)?);
                host.reparent_node(handle, parent.map(|p| shared.current(p)))?;
            }
            Op::AddAttr { node, spec } => {
                let handle = shared.current(*node);
                host.add_attribute(handle, spec)?;
                shared.invalidate_structure(handle);
            }
            Op::DeleteAttr {
                node,
                name,
                removed,
            } => {
                let handle = shared.current(*node);
                let values = attribute_values(shared, handle, name);
                let connections = attribute_connections(shared, handle, name)?;
                let spec = host.remove_attribute(handle, name)?;
                shared.invalidate_structure(handle);
                *removed = Some(RemovedAttr {
                    spec,
                    values,
                    connections,
                });
            }
            Op::SetAttr {
                plug,
                value,
                previous,
            } => {
                let handle = plug.resolve(shared)?;
                *previous = Some(host.read_plug(&handle, None)?);
                host.write_plug(&handle, value)?;
            }
            Op::ResetAttr { plug, previous } => {
                let handle = plug.resolve(shared)?;
                *previous = Some(host.read_plug(&handle, None)?);
                let default = host.default_value(&handle)?;
                host.write_plug(&handle, &default)?;
            }
            Op::Connect {
                src,
                dst,
                force,
                replaced,
            } => {
                let src_handle = src.resolve(shared)?;
                let dst_handle = dst.resolve(shared)?;
                replaced.clear();
                if *force {
                    for existing in host.connected_to(&dst_handle, true, false)? {
                        replaced.push(PlugRef::from_handle(shared, &existing)?);
                        host.disconnect(&existing, &dst_handle)?;
                    }
                }
                if let Err(e) = host.connect(&src_handle, &dst_handle) {
                    for previous in replaced.drain(..) {
                        if let Err(restore) = previous
                            .resolve(shared)
                            .and_then(|p| Ok(host.connect(&p, &dst_handle)?))
                        {
                            log::error!("Failed to restore connection into {}: {}", dst.path, restore);
                        }
                    }
                    return Err(e.into());
                }
            }
            Op::Disconnect { src, dst } => {
                host.disconnect(&src.resolve(shared)?, &dst.resolve(shared)?)?;
            }
            Op::AddMember {
                set,
                member,
                was_member,
            } => {
                let set = shared.current(*set);
                let member = shared.current(*member);
                *was_member = host.set_members(set)?.contains(&member);
                host.add_set_member(set, member)?;
            }
            Op::RemoveMember { set, member } => {
                host.remove_set_member(shared.current(*set), shared.current(*member))?;
            }
            Op::SetKey {
                curve,
                key,
                previous,
            } => {
                let handle = shared.current(*curve);
                *previous = host
                    .keys(handle)?
                    .into_iter()
                    .find(|k| (k.time - key.time).abs() < KEY_TOLERANCE);
                host.set_key(handle, *key)?;
            }
        }
        Ok(())
    }

    fn revert(&mut self, shared: &Shared) -> Result<()> {
        let host = &*shared.host;
        match self {
            Op::CreateNode { created, .. } => {
                if let Some(original) = created {
                    let handle = shared.current(*original);
                    let snapshot = host.delete_node(handle)?;
                    if shared.config.is_rogue() {
                        let mut handles = Vec::new();
                        snapshot_handles(&snapshot, &mut handles);
                        for handle in handles {
                            shared.retire(handle);
                        }
                    }
                }
            }
            Op::DeleteNode { snapshot, .. } => {
                if let Some(snapshot) = snapshot {
                    let restored = host.restore_node(snapshot, &shared.forwarding_map())?;
                    for (old, new) in restored {
                        shared.forward(old, new);
                    }
                }
            }
            Op::Rename { node, previous, .. } => {
                if let Some(previous) = previous {
                    host.rename_node(shared.current(*node), previous)?;
                }
            }
            Op::Reparent { node, previous, .. } => {
                if let Some(previous) = previous {
                    host.reparent_node(shared.current(*node), previous.map(|p| shared.current(p)))?;
                }
            }
            Op::AddAttr { node, spec } => {
                let handle = shared.current(*node);
                host.remove_attribute(handle, &spec.name)?;
                shared.invalidate_structure(handle);
            }
            Op::DeleteAttr { node, removed, .. } => {
                if let Some(removed) = removed {
                    let handle = shared.current(*node);
                    host.add_attribute(handle, &removed.spec)?;
                    shared.invalidate_structure(handle);
                    for (path, value) in &removed.values {
                        let written = host
                            .find_plug(handle, path)
                            .and_then(|p| host.write_plug(&p, value));
                        if let Err(e) = written {
                            log::warn!("Could not restore {}: {}", path, e);
                        }
                    }
                    for (src, dst) in &removed.connections {
                        let connected = src
                            .resolve(shared)
                            .and_then(|s| Ok(host.connect(&s, &dst.resolve(shared)?)?));
                        if let Err(e) = connected {
                            log::warn!("Could not restore connection {} -> {}: {}", src.path, dst.path, e);
                        }
                    }
                }
            }
            Op::SetAttr { plug, previous, .. } | Op::ResetAttr { plug, previous } => {
                if let Some(previous) = previous {
                    host.write_plug(&plug.resolve(shared)?, previous)?;
                }
            }
            Op::Connect {
                src, dst, replaced, ..
            } => {
                let dst_handle = dst.resolve(shared)?;
                host.disconnect(&src.resolve(shared)?, &dst_handle)?;
                for previous in replaced.iter() {
                    host.connect(&previous.resolve(shared)?, &dst_handle)?;
                }
            }
            Op::Disconnect { src, dst } => {
                host.connect(&src.resolve(shared)?, &dst.resolve(shared)?)?;
            }
            Op::AddMember {
                set,
                member,
                was_member,
            } => {
                if !*was_member {
                    host.remove_set_member(shared.current(*set), shared.current(*member))?;
                }
            }
            Op::RemoveMember { set, member } => {
                host.add_set_member(shared.current(*set), shared.current(*member))?;
            }
            Op::SetKey {
                curve,
                key,
                previous,
            } => {
                let handle = shared.current(*curve);
                match previous {
                    Some(previous) => host.set_key(handle, *previous)?,
                    None => host.remove_key(handle, key.time)?,
                }
            }
        }
        Ok(())
    }
}

/// Values held by attribute `name`, element by element for arrays
fn attribute_values(shared: &Shared, node: NodeHandle, name: &str) -> Vec<(String, Value)> {
    let host = &*shared.host;
    let Ok(plug) = host.find_plug(node, name) else {
        return Vec::new();
    };
    let paths: Vec<String> = match host.existing_indices(&plug) {
        Ok(indices) => indices.iter().map(|i| format!("{}[{}]", name, i)).collect(),
        Err(_) => vec![name.to_string()],
    };

    paths
        .into_iter()
        .filter_map(|path| {
            let plug = host.find_plug(node, &path).ok()?;
            if !host.plug_info(&plug).ok()?.writable || !host.connected_to(&plug, true, false).ok()?.is_empty() {
                return None;
            }
            match host.read_plug(&plug, None) {
                Ok(Value::Null) | Err(_) => None,
                Ok(value) => Some((path, value)),
            }
        })
        .collect()
}

/// Connections touching attribute `name` or anything below it
fn attribute_connections(
    shared: &Shared,
    node: NodeHandle,
    name: &str,
) -> Result<Vec<(PlugRef, PlugRef)>> {
    let host = &*shared.host;
    let Ok(attr) = host.find_plug(node, name) else {
        return Ok(Vec::new());
    };
    let long_name = host.plug_info(&attr)?.long_name;
    let under = |path: &str| {
        path == long_name
            || path.starts_with(&format!("{}.", long_name))
            || path.starts_with(&format!("{}[", long_name))
    };

    let mut found = Vec::new();
    for (src, dst) in host.connections(node)? {
        let src_ref = PlugRef::from_handle(shared, &src)?;
        let dst_ref = PlugRef::from_handle(shared, &dst)?;
        let touches = (src.node() == node && under(&src_ref.path))
            || (dst.node() == node && under(&dst_ref.path));
        if touches {
            found.push((src_ref, dst_ref));
        }
    }
    Ok(found)
}

/// An ordered batch of reversible mutations
pub struct Modifier {
    session: Session,
    options: ModifierOptions,
    state: ModifierState,
    applied: Vec<Op>,
    history: Vec<String>,
    /// Next `{index}` for the naming template
    index: usize,
}

impl Modifier {
    pub(crate) fn new(session: Session, options: ModifierOptions) -> Self {
        Self {
            session,
            options,
            state: ModifierState::Building,
            applied: Vec::new(),
            history: Vec::new(),
            index: 1,
        }
    }

    pub fn state(&self) -> ModifierState {
        self.state
    }

    pub fn options(&self) -> &ModifierOptions {
        &self.options
    }

    /// Every operation attempted so far, including a failed one
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Number of applied operations
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.session.shared
    }

    fn push(&mut self, mut op: Op) -> Result<()> {
        if self.state != ModifierState::Building {
            return Err(Error::ModifierClosed(self.state));
        }

        self.history.push(op.describe());
        match op.apply(&self.session.shared) {
            Ok(()) => {
                self.session.shared.hold(&op.handles());
                self.applied.push(op);
                Ok(())
            }
            Err(cause) => {
                log::error!("Modifier step failed: {}", cause);
                let rolled_back = self.options.atomic;
                if rolled_back {
                    self.revert_applied();
                    self.state = ModifierState::RolledBack;
                }
                Err(ModifierError::new(self.history.clone(), cause, rolled_back).into())
            }
        }
    }

    fn revert_applied(&mut self) {
        let shared = self.session.shared.clone();
        while let Some(mut op) = self.applied.pop() {
            let held = op.handles();
            if let Err(e) = op.revert(&shared) {
                log::error!("Failed to revert {}: {}", op.describe(), e);
            }
            shared.release(&held);
        }
    }

    /// Name for a node created by this batch
    fn template_name(&mut self, type_name: &str, name: Option<&str>) -> Option<String> {
        let index = self.index;
        self.index += 1;

        match (&self.options.template, name) {
            (Some(template), Some(name)) if template.contains("{name}") => {
                Some(expand_template(template, name, type_name, index))
            }
            (_, Some(name)) => Some(name.to_string()),
            (Some(template), None) => Some(expand_template(template, "", type_name, index)),
            (None, None) => None,
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    pub fn create_node(&mut self, type_name: &str, name: Option<&str>) -> Result<Node> {
        self.create_node_with(type_name, name, None)
    }

    /// Create a node, under `parent` when given
    pub fn create_node_with(
        &mut self,
        type_name: &str,
        name: Option<&str>,
        parent: Option<&DagNode>,
    ) -> Result<Node> {
        if let Some(parent) = parent {
            parent.ensure_alive()?;
        }
        let name = self.template_name(type_name, name);
        self.push(Op::CreateNode {
            type_name: type_name.to_string(),
            name,
            parent: parent.map(|p| p.handle()),
            created: None,
        })?;

        let created = match self.applied.last() {
            Some(Op::CreateNode {
                created: Some(handle),
                ..
            }) => *handle,
            _ => {
                return Err(Error::NotFound {
                    path: type_name.to_string(),
                })
            }
        };
        self.session.wrap(created)
    }

    /// Delete `node` and its descendants
    ///
    /// Undo restores them from a snapshot under new handles; the old
    /// wrappers stay dead.
    pub fn delete_node(&mut self, node: &Node) -> Result<()> {
        node.ensure_alive()?;
        self.push(Op::DeleteNode {
            node: node.handle(),
            snapshot: None,
        })?;
        node.inner().mark_dead();
        Ok(())
    }

    /// Rename `node`, returning the name the host settled on
    pub fn rename(&mut self, node: &Node, name: &str) -> Result<String> {
        node.ensure_alive()?;
        self.push(Op::Rename {
            node: node.handle(),
            name: name.to_string(),
            previous: None,
        })?;
        node.name()
    }

    pub fn reparent(&mut self, node: &DagNode, parent: Option<&DagNode>) -> Result<()> {
        node.ensure_alive()?;
        if let Some(parent) = parent {
            parent.ensure_alive()?;
        }
        self.push(Op::Reparent {
            node: node.handle(),
            parent: parent.map(|p| p.handle()),
            previous: None,
        })
    }

    pub fn add_attr(&mut self, node: &Node, spec: AttributeSpec) -> Result<()> {
        node.ensure_alive()?;
        self.push(Op::AddAttr {
            node: node.handle(),
            spec,
        })
    }

    pub fn delete_attr(&mut self, node: &Node, name: &str) -> Result<()> {
        node.ensure_alive()?;
        self.push(Op::DeleteAttr {
            node: node.handle(),
            name: name.to_string(),
            removed: None,
        })
    }

    /// Write `value`, in the plug's unit if it has one
    ///
    /// Blob values such as geometry are refused.
    pub fn set_attr(&mut self, plug: &Plug, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if value.is_blob() {
            return Err(Error::Type {
                path: plug.to_string(),
                reason: "blob values cannot be set through a modifier".to_string(),
            });
        }
        let value = plug.to_native(value)?;
        self.push(Op::SetAttr {
            plug: PlugRef::of(plug)?,
            value,
            previous: None,
        })
    }

    /// Write the attribute's default value
    pub fn reset_attr(&mut self, plug: &Plug) -> Result<()> {
        self.push(Op::ResetAttr {
            plug: PlugRef::of(plug)?,
            previous: None,
        })
    }

    /// Connect `src` into `dst`, replacing an existing input when forced
    pub fn connect(&mut self, src: &Plug, dst: &Plug, force: bool) -> Result<()> {
        self.push(Op::Connect {
            src: PlugRef::of(src)?,
            dst: PlugRef::of(dst)?,
            force,
            replaced: Vec::new(),
        })
    }

    /// Break connections of `plug`, returning how many were broken
    ///
    /// `source` covers connections into `plug`, `destination` those out of
    /// it. With `other`, only connections between the two plugs count and
    /// finding none is a [`Error::Connection`].
    pub fn disconnect(
        &mut self,
        plug: &Plug,
        other: Option<&Plug>,
        source: bool,
        destination: bool,
    ) -> Result<usize> {
        plug.node().ensure_alive()?;
        let shared = self.shared().clone();
        let host = &*shared.host;

        let mut pairs = Vec::new();
        if source {
            for upstream in host.connected_to(plug.handle(), true, false)? {
                if other.map_or(true, |o| *o.handle() == upstream) {
                    pairs.push((upstream, plug.handle().clone()));
                }
            }
        }
        if destination {
            for downstream in host.connected_to(plug.handle(), false, true)? {
                if other.map_or(true, |o| *o.handle() == downstream) {
                    pairs.push((plug.handle().clone(), downstream));
                }
            }
        }

        if let (Some(other), true) = (other, pairs.is_empty()) {
            return Err(Error::Connection(format!("{} is not connected to {}", plug, other)));
        }

        let count = pairs.len();
        for (src, dst) in pairs {
            self.push(Op::Disconnect {
                src: PlugRef::from_handle(&shared, &src)?,
                dst: PlugRef::from_handle(&shared, &dst)?,
            })?;
        }
        Ok(count)
    }

    pub fn add_member(&mut self, set: &ObjectSet, member: &Node) -> Result<()> {
        set.ensure_alive()?;
        member.ensure_alive()?;
        self.push(Op::AddMember {
            set: set.handle(),
            member: member.handle(),
            was_member: false,
        })
    }

    pub fn remove_member(&mut self, set: &ObjectSet, member: &Node) -> Result<()> {
        set.ensure_alive()?;
        member.ensure_alive()?;
        self.push(Op::RemoveMember {
            set: set.handle(),
            member: member.handle(),
        })
    }

    /// Insert a key, replacing any key at the same time
    pub fn set_key(
        &mut self,
        curve: &AnimCurve,
        time: f64,
        value: f64,
        interpolation: Interpolation,
    ) -> Result<()> {
        curve.ensure_alive()?;
        self.push(Op::SetKey {
            curve: curve.handle(),
            key: Key {
                time,
                value,
                interpolation,
            },
            previous: None,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Finish the batch, registering it as one undo step
    pub fn commit(mut self) -> Result<()> {
        if self.state != ModifierState::Building {
            return Err(Error::ModifierClosed(self.state));
        }
        self.state = ModifierState::Committed;

        let ops = std::mem::take(&mut self.applied);
        if ops.is_empty() {
            return Ok(());
        }
        log::debug!("Committed '{}' ({} operations)", self.options.name, ops.len());

        let batch = Arc::new(Committed {
            shared: Arc::downgrade(&self.session.shared),
            ops: Mutex::new(ops),
        });
        if !self.options.undoable {
            return Ok(());
        }

        let undo = {
            let batch = batch.clone();
            move || batch.replay(true)
        };
        let redo = move || batch.replay(false);

        self.session
            .undo()
            .commit_with_redo(&self.options.name, undo, redo);
        Ok(())
    }

    /// Revert everything applied and discard the batch
    pub fn abandon(mut self) {
        if self.state == ModifierState::Building {
            self.revert_applied();
            self.state = ModifierState::Discarded;
        }
    }

    /// Revert everything applied, leaving the batch rolled back
    pub(crate) fn rollback(&mut self) {
        if self.state == ModifierState::Building {
            self.revert_applied();
            self.state = ModifierState::RolledBack;
        }
    }
}

impl Drop for Modifier {
    fn drop(&mut self) {
        if self.state == ModifierState::Building {
            if !self.applied.is_empty() {
                log::warn!(
                    "Modifier '{}' dropped without commit, reverting {} operations",
                    self.options.name,
                    self.applied.len()
                );
            }
            self.revert_applied();
            self.state = ModifierState::Discarded;
        }
    }
}

/// A committed batch, alive for as long as the host keeps its undo step
struct Committed {
    shared: Weak<Shared>,
    ops: Mutex<Vec<Op>>,
}

impl Committed {
    /// Undo (`reverse`) or redo the whole batch
    fn replay(&self, reverse: bool) -> Result<()> {
        let shared = self.shared.upgrade().ok_or_else(|| Error::Existence {
            path: "session".to_string(),
        })?;
        let mut ops = self.ops.lock();
        if reverse {
            for op in ops.iter_mut().rev() {
                op.replay(&shared, true)?;
            }
        } else {
            for op in ops.iter_mut() {
                op.replay(&shared, false)?;
            }
        }
        Ok(())
    }
}

impl Drop for Committed {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            for op in self.ops.get_mut().iter() {
                shared.release(&op.handles());
            }
        }
    }
}

fn expand_template(template: &str, name: &str, type_name: &str, index: usize) -> String {
    template
        .replace("{name}", name)
        .replace("{type}", type_name)
        .replace("{index}", &index.to_string())
}

/// Run a one-operation batch, surfacing the operation's own error
pub(crate) fn single<T>(session: &Session, f: impl FnOnce(&mut Modifier) -> Result<T>) -> Result<T> {
    session.transaction(f).map_err(|e| match e {
        Error::Modifier(failure) => *failure.cause,
        other => other,
    })
}
