//! Scene storage
//!
//! Plain data behind the [`MemoryHost`](crate::MemoryHost) lock. Nothing in
//! here calls back out of the host.

use std::collections::{BTreeSet, HashMap, HashSet};

use strand_core::{
    AttributeId, AttributeSpec, AttributeType, HostError, HostResult, Key, NodeHandle, NodeKind,
    NodeSnapshot, PlugHandle, PlugInfo, SnapshotConnection, Value,
};

use crate::alloc::NodeAllocator;
use crate::eval;
use crate::types::TypeRegistry;

/// Evaluation depth at which a connection cycle is assumed
const MAX_DEPTH: usize = 64;

/// A leaf value slot: attribute index plus element indices
pub type ValueKey = (u32, Vec<u32>);

pub struct AttrSlot {
    pub spec: AttributeSpec,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub dynamic: bool,
    pub output: bool,
    pub generation: u32,
    pub removed: bool,
}

impl AttrSlot {
    fn matches(&self, name: &str) -> bool {
        self.spec.name == name || self.spec.short_name.as_deref() == Some(name)
    }
}

pub struct NodeRecord {
    pub type_name: String,
    pub kind: NodeKind,
    pub name: String,
    pub parent: Option<NodeHandle>,
    pub children: Vec<NodeHandle>,
    pub locked: bool,
    pub attrs: Vec<AttrSlot>,
    free_attrs: Vec<u32>,
    /// Long and short names of every live attribute, long names win
    by_name: HashMap<String, u32>,
    pub values: HashMap<ValueKey, Value>,
    pub locked_plugs: HashSet<ValueKey>,
    pub members: Vec<NodeHandle>,
    pub keys: Vec<Key>,
}

impl NodeRecord {
    fn new(type_name: &str, kind: NodeKind, name: String) -> Self {
        Self {
            type_name: type_name.to_string(),
            kind,
            name,
            parent: None,
            children: Vec::new(),
            locked: false,
            attrs: Vec::new(),
            free_attrs: Vec::new(),
            by_name: HashMap::new(),
            values: HashMap::new(),
            locked_plugs: HashSet::new(),
            members: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn attr_id(&self, index: u32) -> AttributeId {
        AttributeId::new(index, self.attrs[index as usize].generation)
    }

    fn slot(&self, index: u32) -> &AttrSlot {
        &self.attrs[index as usize]
    }

    /// Resolve an attribute id, rejecting removed or recycled slots
    fn live_slot(&self, id: AttributeId) -> Option<u32> {
        let slot = self.attrs.get(id.index() as usize)?;
        (!slot.removed && slot.generation == id.generation()).then_some(id.index())
    }

    /// First long or short name in `spec` already used the same way
    fn collision(&self, spec: &AttributeSpec) -> Option<String> {
        let taken = self.attrs.iter().filter(|s| !s.removed).any(|s| {
            s.spec.name == spec.name
                || (spec.short_name.is_some() && s.spec.short_name == spec.short_name)
        });
        if taken {
            return Some(spec.name.clone());
        }
        spec.children().iter().find_map(|child| self.collision(child))
    }

    pub fn add_attr(&mut self, spec: &AttributeSpec, dynamic: bool, output: bool) -> HostResult<u32> {
        if let Some(taken) = self.collision(spec) {
            return Err(HostError::Duplicate(format!("{}.{}", self.name, taken)));
        }
        Ok(self.insert_attr(spec, None, dynamic, output))
    }

    fn insert_attr(&mut self, spec: &AttributeSpec, parent: Option<u32>, dynamic: bool, output: bool) -> u32 {
        let slot = AttrSlot {
            spec: spec.clone(),
            parent,
            children: Vec::new(),
            dynamic,
            output,
            generation: 0,
            removed: false,
        };
        let index = match self.free_attrs.pop() {
            Some(index) => {
                let generation = self.attrs[index as usize].generation.wrapping_add(1);
                self.attrs[index as usize] = AttrSlot { generation, ..slot };
                index
            }
            None => {
                self.attrs.push(slot);
                (self.attrs.len() - 1) as u32
            }
        };

        if let Some(short) = &spec.short_name {
            self.by_name.entry(short.clone()).or_insert(index);
        }
        self.by_name.insert(spec.name.clone(), index);

        let children: Vec<u32> = spec
            .children()
            .iter()
            .map(|child| self.insert_attr(child, Some(index), dynamic, output))
            .collect();
        self.attrs[index as usize].children = children;
        index
    }

    /// Tombstone a top-level attribute and everything below it
    fn remove_attr(&mut self, index: u32) -> AttributeSpec {
        let doomed = self.subtree(index);
        for &i in &doomed {
            self.attrs[i as usize].removed = true;
            self.free_attrs.push(i);
        }
        self.values.retain(|(a, _), _| !doomed.contains(a));
        self.locked_plugs.retain(|(a, _)| !doomed.contains(a));
        self.rebuild_names();
        self.attrs[index as usize].spec.clone()
    }

    /// Short names first so that long names overwrite them
    fn rebuild_names(&mut self) {
        self.by_name.clear();
        for (i, slot) in self.attrs.iter().enumerate().filter(|(_, s)| !s.removed) {
            if let Some(short) = &slot.spec.short_name {
                self.by_name.insert(short.clone(), i as u32);
            }
        }
        for (i, slot) in self.attrs.iter().enumerate().filter(|(_, s)| !s.removed) {
            self.by_name.insert(slot.spec.name.clone(), i as u32);
        }
    }

    fn subtree(&self, index: u32) -> Vec<u32> {
        let mut out = vec![index];
        for &child in &self.slot(index).children {
            out.extend(self.subtree(child));
        }
        out
    }

    /// Number of array attributes from the root attribute down to `index`
    fn array_depth(&self, index: u32) -> usize {
        let mut depth = 0;
        let mut current = Some(index);
        while let Some(i) = current {
            let slot = self.slot(i);
            if slot.spec.array {
                depth += 1;
            }
            current = slot.parent;
        }
        depth
    }

    /// Array attribute not narrowed to one of its elements
    fn is_whole_array(&self, index: u32, elements: &[u32]) -> bool {
        self.slot(index).spec.array && elements.len() + 1 == self.array_depth(index)
    }

    /// Attribute chain from the root attribute down to `index`
    fn chain(&self, index: u32) -> Vec<u32> {
        let mut chain = vec![index];
        let mut current = self.slot(index).parent;
        while let Some(i) = current {
            chain.push(i);
            current = self.slot(i).parent;
        }
        chain.reverse();
        chain
    }

    /// Partial plug path using long names, e.g. `items[2].weight`
    pub fn plug_path(&self, index: u32, elements: &[u32]) -> String {
        let mut remaining = elements.iter();
        self.chain(index)
            .into_iter()
            .map(|i| {
                let slot = self.slot(i);
                match (slot.spec.array, slot.spec.array.then(|| remaining.next()).flatten()) {
                    (true, Some(e)) => format!("{}[{}]", slot.spec.name, e),
                    _ => slot.spec.name.clone(),
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn is_plug_locked(&self, index: u32, elements: &[u32]) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            let depth = self.array_depth(i).min(elements.len());
            if self.locked_plugs.contains(&(i, elements[..depth].to_vec())) {
                return true;
            }
            current = self.slot(i).parent;
        }
        false
    }

    fn top_level(&self) -> impl Iterator<Item = (u32, &AttrSlot)> {
        self.attrs
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.removed && s.parent.is_none())
            .map(|(i, s)| (i as u32, s))
    }
}

fn parse_segment(segment: &str) -> Option<(&str, Option<u32>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let inner = segment.strip_suffix(']')?.get(open + 1..)?;
            Some((&segment[..open], Some(inner.trim().parse().ok()?)))
        }
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ':')
}

pub struct Scene {
    alloc: NodeAllocator,
    nodes: Vec<Option<NodeRecord>>,
    names: HashMap<String, NodeHandle>,
    /// Live nodes in creation order
    order: Vec<NodeHandle>,
    /// `(source, destination)` in the order they were made
    connections: Vec<(PlugHandle, PlugHandle)>,
    pub types: TypeRegistry,
    pub time: f64,
}

impl Scene {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            alloc: NodeAllocator::new(),
            nodes: Vec::new(),
            names: HashMap::new(),
            order: Vec::new(),
            connections: Vec::new(),
            types,
            time: 0.0,
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn is_valid(&self, node: NodeHandle) -> bool {
        self.alloc.is_valid(node)
            && matches!(self.nodes.get(node.index() as usize), Some(Some(_)))
    }

    pub fn node(&self, node: NodeHandle) -> HostResult<&NodeRecord> {
        if !self.alloc.is_valid(node) {
            return Err(HostError::InvalidHandle(format!("{:?}", node)));
        }
        self.nodes
            .get(node.index() as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| HostError::InvalidHandle(format!("{:?}", node)))
    }

    fn node_mut(&mut self, node: NodeHandle) -> HostResult<&mut NodeRecord> {
        if !self.alloc.is_valid(node) {
            return Err(HostError::InvalidHandle(format!("{:?}", node)));
        }
        self.nodes
            .get_mut(node.index() as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| HostError::InvalidHandle(format!("{:?}", node)))
    }

    pub fn ls(&self, type_name: Option<&str>) -> Vec<NodeHandle> {
        self.order
            .iter()
            .copied()
            .filter(|h| match (type_name, self.node(*h)) {
                (None, Ok(_)) => true,
                (Some(ty), Ok(record)) => record.type_name == ty,
                _ => false,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn hash_code(&self, node: NodeHandle) -> HostResult<u64> {
        self.node(node)?;
        Ok(NodeAllocator::hash_of(node))
    }

    pub fn node_path(&self, node: NodeHandle) -> HostResult<String> {
        let record = self.node(node)?;
        if record.kind != NodeKind::Dag {
            return Ok(record.name.clone());
        }
        let mut parts = vec![record.name.clone()];
        let mut current = record.parent;
        while let Some(parent) = current {
            let record = self.node(parent)?;
            parts.push(record.name.clone());
            current = record.parent;
        }
        parts.reverse();
        Ok(format!("|{}", parts.join("|")))
    }

    /// Human readable identifier for error messages
    fn describe(&self, node: NodeHandle) -> String {
        self.node_path(node).unwrap_or_else(|_| format!("{:?}", node))
    }

    fn describe_plug(&self, plug: &PlugHandle) -> String {
        match self.node(plug.node()) {
            Ok(record) => match record.live_slot(plug.attribute()) {
                Some(index) => format!("{}.{}", record.name, record.plug_path(index, plug.elements())),
                None => format!("{}.{:?}", record.name, plug.attribute()),
            },
            Err(_) => format!("{:?}", plug),
        }
    }

    pub fn lookup(&self, path: &str) -> HostResult<NodeHandle> {
        let leaf = path.rsplit('|').next().unwrap_or(path);
        let handle = *self
            .names
            .get(leaf)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        let full = self.node_path(handle)?;
        let matches = if path.starts_with('|') {
            full == path
        } else {
            full == path || full.ends_with(&format!("|{}", path))
        };
        if matches {
            Ok(handle)
        } else {
            Err(HostError::NotFound(path.to_string()))
        }
    }

    fn unique_name(&self, requested: &str, numbered: bool) -> String {
        if !numbered && !self.names.contains_key(requested) {
            return requested.to_string();
        }
        let stem = requested.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = if stem.is_empty() { requested } else { stem };
        (1u64..)
            .map(|n| format!("{}{}", stem, n))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| requested.to_string())
    }

    fn check_dag_parent(&self, node: Option<NodeHandle>, parent: NodeHandle) -> HostResult<()> {
        let record = self.node(parent)?;
        if record.kind != NodeKind::Dag {
            return Err(HostError::Unsupported(format!(
                "{} cannot have children",
                record.name
            )));
        }
        if let Some(node) = node {
            let mut current = Some(parent);
            while let Some(h) = current {
                if h == node {
                    return Err(HostError::Unsupported(format!(
                        "cannot parent {} under itself",
                        self.describe(node)
                    )));
                }
                current = self.node(h)?.parent;
            }
        }
        Ok(())
    }

    pub fn create_node(
        &mut self,
        type_name: &str,
        name: Option<&str>,
        parent: Option<NodeHandle>,
    ) -> HostResult<NodeHandle> {
        let ty = self
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| HostError::UnknownNodeType(type_name.to_string()))?;

        if let Some(name) = name {
            if !valid_name(name) {
                return Err(HostError::Unsupported(format!("invalid node name '{}'", name)));
            }
        }
        if let Some(parent) = parent {
            if ty.kind != NodeKind::Dag {
                return Err(HostError::Unsupported(format!(
                    "{} nodes cannot be parented",
                    type_name
                )));
            }
            self.check_dag_parent(None, parent)?;
        }

        let name = match name {
            Some(name) => self.unique_name(name, false),
            None => self.unique_name(type_name, true),
        };

        let mut record = NodeRecord::new(&ty.name, ty.kind, name.clone());
        for spec in &ty.attributes {
            record.add_attr(spec, false, false)?;
        }
        for spec in &ty.outputs {
            record.add_attr(spec, false, true)?;
        }
        record.parent = parent;

        let handle = self.alloc.allocate();
        let index = handle.index() as usize;
        if index >= self.nodes.len() {
            self.nodes.resize_with(index + 1, || None);
        }
        self.nodes[index] = Some(record);
        self.names.insert(name, handle);
        self.order.push(handle);

        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(handle);
        }
        Ok(handle)
    }

    pub fn rename_node(&mut self, node: NodeHandle, name: &str) -> HostResult<String> {
        let record = self.node(node)?;
        if record.locked {
            return Err(HostError::Locked(self.describe(node)));
        }
        if !valid_name(name) {
            return Err(HostError::Unsupported(format!("invalid node name '{}'", name)));
        }
        if record.name == name {
            return Ok(record.name.clone());
        }
        let old = record.name.clone();
        let name = self.unique_name(name, false);
        self.names.remove(&old);
        self.names.insert(name.clone(), node);
        self.node_mut(node)?.name = name.clone();
        Ok(name)
    }

    pub fn reparent_node(&mut self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<()> {
        let record = self.node(node)?;
        if record.kind != NodeKind::Dag {
            return Err(HostError::Unsupported(format!(
                "{} is not a hierarchy node",
                record.name
            )));
        }
        if record.locked {
            return Err(HostError::Locked(self.describe(node)));
        }
        if let Some(parent) = parent {
            self.check_dag_parent(Some(node), parent)?;
        }

        if let Some(old) = record.parent {
            self.node_mut(old)?.children.retain(|c| *c != node);
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(node);
        }
        self.node_mut(node)?.parent = parent;
        Ok(())
    }

    pub fn set_node_locked(&mut self, node: NodeHandle, locked: bool) -> HostResult<()> {
        self.node_mut(node)?.locked = locked;
        Ok(())
    }

    /// `node` and its descendants, parents before children
    pub fn subtree(&self, node: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        let mut out = vec![node];
        for &child in &self.node(node)?.children {
            out.extend(self.subtree(child)?);
        }
        Ok(out)
    }

    pub fn check_deletable(&self, nodes: &[NodeHandle]) -> HostResult<()> {
        for &node in nodes {
            if self.node(node)?.locked {
                return Err(HostError::Locked(self.describe(node)));
            }
        }
        Ok(())
    }

    /// Drop nodes, their connections and set memberships
    pub fn remove_nodes(&mut self, nodes: &[NodeHandle]) {
        self.connections
            .retain(|(src, dst)| !nodes.contains(&src.node()) && !nodes.contains(&dst.node()));

        for record in self.nodes.iter_mut().flatten() {
            record.members.retain(|m| !nodes.contains(m));
            record.children.retain(|c| !nodes.contains(c));
        }

        for &node in nodes.iter().rev() {
            if let Some(record) = self.nodes.get_mut(node.index() as usize).and_then(|s| s.take()) {
                self.names.remove(&record.name);
            }
            self.order.retain(|h| *h != node);
            self.alloc.free(node);
        }
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn snapshot(&self, node: NodeHandle) -> HostResult<NodeSnapshot> {
        let record = self.node(node)?;

        let mut values: Vec<(String, Value)> = record
            .values
            .iter()
            .map(|((index, elements), value)| (record.plug_path(*index, elements), value.clone()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));

        let mut locked_plugs: Vec<String> = record
            .locked_plugs
            .iter()
            .map(|(index, elements)| record.plug_path(*index, elements))
            .collect();
        locked_plugs.sort();

        let mut connections = Vec::new();
        for (src, dst) in &self.connections {
            let (local, remote, outgoing) = if src.node() == node {
                (src, dst, true)
            } else if dst.node() == node {
                (dst, src, false)
            } else {
                continue;
            };
            let (Some(local_index), Ok(remote_record)) =
                (record.live_slot(local.attribute()), self.node(remote.node()))
            else {
                continue;
            };
            let Some(remote_index) = remote_record.live_slot(remote.attribute()) else {
                continue;
            };
            connections.push(SnapshotConnection {
                local: record.plug_path(local_index, local.elements()),
                remote: remote.node(),
                remote_plug: remote_record.plug_path(remote_index, remote.elements()),
                outgoing,
            });
        }

        let memberships = self
            .order
            .iter()
            .copied()
            .filter(|h| {
                self.node(*h)
                    .map(|r| r.kind == NodeKind::Set && r.members.contains(&node))
                    .unwrap_or(false)
            })
            .collect();

        Ok(NodeSnapshot {
            handle: node,
            type_name: record.type_name.clone(),
            name: record.name.clone(),
            parent: record.parent,
            locked: record.locked,
            dynamic: record
                .top_level()
                .filter(|(_, s)| s.dynamic)
                .map(|(_, s)| s.spec.clone())
                .collect(),
            values,
            locked_plugs,
            connections,
            memberships,
            members: record.members.clone(),
            keys: record.keys.clone(),
            children: record
                .children
                .iter()
                .map(|c| self.snapshot(*c))
                .collect::<HostResult<Vec<_>>>()?,
        })
    }

    pub fn restore(
        &mut self,
        snapshot: &NodeSnapshot,
        remap: &HashMap<NodeHandle, NodeHandle>,
    ) -> HostResult<Vec<(NodeHandle, NodeHandle)>> {
        let parent = snapshot
            .parent
            .map(|p| remap.get(&p).copied().unwrap_or(p))
            .filter(|p| self.is_valid(*p));

        let mut created = Vec::new();
        self.restore_tree(snapshot, parent, &mut created)?;

        let mut map = remap.clone();
        map.extend(created.iter().copied());
        self.restore_links(snapshot, &map);
        Ok(created)
    }

    fn restore_tree(
        &mut self,
        snapshot: &NodeSnapshot,
        parent: Option<NodeHandle>,
        created: &mut Vec<(NodeHandle, NodeHandle)>,
    ) -> HostResult<NodeHandle> {
        let node = self.create_node(&snapshot.type_name, Some(&snapshot.name), parent)?;
        created.push((snapshot.handle, node));

        let record = self.node_mut(node)?;
        for spec in &snapshot.dynamic {
            record.add_attr(spec, true, false)?;
        }
        for (path, value) in &snapshot.values {
            match self.resolve(node, path) {
                Ok(plug) => {
                    let record = self.node_mut(node)?;
                    record
                        .values
                        .insert((plug.attribute().index(), plug.elements().to_vec()), value.clone());
                }
                Err(e) => log::warn!("Dropping value of {} on restore: {}", path, e),
            }
        }
        for path in &snapshot.locked_plugs {
            if let Ok(plug) = self.resolve(node, path) {
                let record = self.node_mut(node)?;
                record
                    .locked_plugs
                    .insert((plug.attribute().index(), plug.elements().to_vec()));
            }
        }
        self.node_mut(node)?.keys = snapshot.keys.clone();

        for child in &snapshot.children {
            self.restore_tree(child, Some(node), created)?;
        }
        self.node_mut(node)?.locked = snapshot.locked;
        Ok(node)
    }

    fn restore_links(&mut self, snapshot: &NodeSnapshot, map: &HashMap<NodeHandle, NodeHandle>) {
        let Some(&node) = map.get(&snapshot.handle) else {
            return;
        };
        let mapped = |h: NodeHandle| map.get(&h).copied().unwrap_or(h);

        for conn in &snapshot.connections {
            let remote = mapped(conn.remote);
            let (Ok(local), Ok(remote)) = (
                self.resolve(node, &conn.local),
                self.resolve(remote, &conn.remote_plug),
            ) else {
                log::debug!("Skipping connection {} on restore", conn.local);
                continue;
            };
            let (src, dst) = if conn.outgoing { (local, remote) } else { (remote, local) };
            if self.source_of(&dst).is_none() {
                self.connections.push((src, dst));
            }
        }

        for set in snapshot.memberships.iter().copied().map(mapped) {
            if let Ok(record) = self.node_mut(set) {
                if !record.members.contains(&node) {
                    record.members.push(node);
                }
            }
        }

        let members: Vec<NodeHandle> = snapshot
            .members
            .iter()
            .copied()
            .map(mapped)
            .filter(|m| self.is_valid(*m))
            .collect();
        if let Ok(record) = self.node_mut(node) {
            for member in members {
                if !record.members.contains(&member) {
                    record.members.push(member);
                }
            }
        }

        for child in &snapshot.children {
            self.restore_links(child, map);
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn resolve(&self, node: NodeHandle, path: &str) -> HostResult<PlugHandle> {
        let record = self.node(node)?;
        let not_found = || HostError::NotFound(format!("{}.{}", record.name, path));

        let mut current: Option<u32> = None;
        let mut elements = Vec::new();

        for segment in path.split('.') {
            let (name, index) = parse_segment(segment).ok_or_else(not_found)?;
            let attr = match current {
                None => {
                    let attr = *record.by_name.get(name).ok_or_else(not_found)?;
                    if let Some(parent) = record.slot(attr).parent {
                        if record.array_depth(parent) > 0 {
                            return Err(HostError::Unsupported(format!(
                                "{}.{} needs an element index",
                                record.name, path
                            )));
                        }
                    }
                    attr
                }
                Some(parent) => {
                    if elements.len() < record.array_depth(parent) {
                        return Err(HostError::Unsupported(format!(
                            "{}.{} needs an element index",
                            record.name, path
                        )));
                    }
                    let children = &record.slot(parent).children;
                    children
                        .iter()
                        .copied()
                        .find(|c| record.slot(*c).spec.name == name)
                        .or_else(|| children.iter().copied().find(|c| record.slot(*c).matches(name)))
                        .ok_or_else(not_found)?
                }
            };

            if let Some(index) = index {
                if !record.slot(attr).spec.array {
                    return Err(HostError::TypeMismatch {
                        path: format!("{}.{}", record.name, path),
                        expected: "array".to_string(),
                        got: record.slot(attr).spec.ty.name().to_string(),
                    });
                }
                elements.push(index);
            }
            current = Some(attr);
        }

        let attr = current.ok_or_else(not_found)?;
        Ok(PlugHandle::with_elements(node, record.attr_id(attr), elements))
    }

    pub fn plug_valid(&self, plug: &PlugHandle) -> bool {
        match self.node(plug.node()) {
            Ok(record) => match record.live_slot(plug.attribute()) {
                Some(index) => plug.elements().len() + 1 >= record.array_depth(index),
                None => false,
            },
            Err(_) => false,
        }
    }

    /// The record and attribute index a plug refers to
    fn check(&self, plug: &PlugHandle) -> HostResult<(&NodeRecord, u32)> {
        let record = self.node(plug.node())?;
        let index = record
            .live_slot(plug.attribute())
            .ok_or_else(|| HostError::StaleAttribute(format!("{:?}", plug)))?;
        Ok((record, index))
    }

    pub fn plug_info(&self, plug: &PlugHandle) -> HostResult<PlugInfo> {
        let (record, index) = self.check(plug)?;
        let slot = record.slot(index);
        let spec = &slot.spec;
        Ok(PlugInfo {
            name: spec.short_name.clone().unwrap_or_else(|| spec.name.clone()),
            long_name: spec.name.clone(),
            path: record.plug_path(index, plug.elements()),
            type_name: spec.ty.name().to_string(),
            unit: spec.unit_kind(),
            is_array: record.is_whole_array(index, plug.elements()),
            is_compound: !slot.children.is_empty(),
            child_count: slot.children.len(),
            locked: record.is_plug_locked(index, plug.elements()),
            keyable: spec.keyable,
            writable: !slot.output && spec.ty != AttributeType::Message,
        })
    }

    pub fn plug_child(&self, plug: &PlugHandle, child: usize) -> HostResult<PlugHandle> {
        let (record, index) = self.check(plug)?;
        if record.is_whole_array(index, plug.elements()) {
            return Err(HostError::Unsupported(format!(
                "{} needs an element index",
                self.describe_plug(plug)
            )));
        }
        let attr = *record.slot(index).children.get(child).ok_or_else(|| {
            HostError::NotFound(format!("{}[child {}]", self.describe_plug(plug), child))
        })?;
        Ok(PlugHandle::with_elements(
            plug.node(),
            record.attr_id(attr),
            plug.elements().to_vec(),
        ))
    }

    pub fn attribute_names(&self, node: NodeHandle) -> HostResult<Vec<String>> {
        let record = self.node(node)?;
        let mut names: Vec<(bool, String)> = record
            .top_level()
            .map(|(_, s)| (s.dynamic, s.spec.name.clone()))
            .collect();
        names.sort_by_key(|(dynamic, _)| *dynamic);
        Ok(names.into_iter().map(|(_, n)| n).collect())
    }

    pub fn add_attribute(&mut self, node: NodeHandle, spec: &AttributeSpec) -> HostResult<()> {
        if !valid_name(&spec.name) {
            return Err(HostError::Unsupported(format!("invalid attribute name '{}'", spec.name)));
        }
        let record = self.node_mut(node)?;
        if record.locked {
            return Err(HostError::Locked(record.name.clone()));
        }
        record.add_attr(spec, true, false)?;
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeHandle, name: &str) -> HostResult<AttributeSpec> {
        let record = self.node(node)?;
        let index = *record
            .by_name
            .get(name)
            .ok_or_else(|| HostError::NotFound(format!("{}.{}", record.name, name)))?;
        let slot = record.slot(index);
        if !slot.dynamic || slot.parent.is_some() {
            return Err(HostError::Unsupported(format!(
                "{}.{} is not a removable attribute",
                record.name, name
            )));
        }
        if record.locked {
            return Err(HostError::Locked(record.name.clone()));
        }

        let doomed = record.subtree(index);
        self.connections.retain(|(src, dst)| {
            ![src, dst]
                .iter()
                .any(|p| p.node() == node && doomed.contains(&p.attribute().index()))
        });
        Ok(self.node_mut(node)?.remove_attr(index))
    }

    pub fn set_plug_locked(&mut self, plug: &PlugHandle, locked: bool) -> HostResult<()> {
        let (_, index) = self.check(plug)?;
        let key = (index, plug.elements().to_vec());
        let record = self.node_mut(plug.node())?;
        if locked {
            record.locked_plugs.insert(key);
        } else {
            record.locked_plugs.remove(&key);
        }
        Ok(())
    }

    pub fn default_value(&self, plug: &PlugHandle) -> HostResult<Value> {
        let (record, index) = self.check(plug)?;
        if record.is_whole_array(index, plug.elements()) {
            return Ok(Value::Array(Vec::new()));
        }
        Ok(record.slot(index).spec.default_value())
    }

    pub fn existing_indices(&self, plug: &PlugHandle) -> HostResult<Vec<u32>> {
        let (record, index) = self.check(plug)?;
        if !record.is_whole_array(index, plug.elements()) {
            return Err(HostError::TypeMismatch {
                path: self.describe_plug(plug),
                expected: "array".to_string(),
                got: record.slot(index).spec.ty.name().to_string(),
            });
        }

        let subtree = record.subtree(index);
        let prefix = plug.elements();
        let depth = prefix.len();
        let mut found = BTreeSet::new();

        let mut consider = |attr: u32, elements: &[u32]| {
            if subtree.contains(&attr) && elements.len() > depth && elements[..depth] == *prefix {
                found.insert(elements[depth]);
            }
        };

        for (attr, elements) in record.values.keys() {
            consider(*attr, elements);
        }
        for (src, dst) in &self.connections {
            for p in [src, dst] {
                if p.node() == plug.node() {
                    consider(p.attribute().index(), p.elements());
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    pub fn read(&self, plug: &PlugHandle, time: Option<f64>) -> HostResult<Value> {
        self.read_depth(plug, time.unwrap_or(self.time), 0)
    }

    fn read_depth(&self, plug: &PlugHandle, time: f64, depth: usize) -> HostResult<Value> {
        if depth > MAX_DEPTH {
            return Err(HostError::Unsupported(format!(
                "evaluation cycle through {}",
                self.describe_plug(plug)
            )));
        }
        let (record, index) = self.check(plug)?;

        if let Some(value) = self.read_incoming(record, plug, index, time, depth)? {
            return Ok(value);
        }

        let slot = record.slot(index);
        if record.is_whole_array(index, plug.elements()) {
            return self
                .existing_indices(plug)?
                .into_iter()
                .map(|i| self.read_depth(&plug.element(i), time, depth + 1))
                .collect::<HostResult<Vec<_>>>()
                .map(Value::Array);
        }
        if !slot.children.is_empty() {
            return slot
                .children
                .iter()
                .map(|c| {
                    let child = PlugHandle::with_elements(
                        plug.node(),
                        record.attr_id(*c),
                        plug.elements().to_vec(),
                    );
                    self.read_depth(&child, time, depth + 1)
                })
                .collect::<HostResult<Vec<_>>>()
                .map(Value::Array);
        }
        if slot.output {
            return self.compute(plug.node(), record, time, depth);
        }

        Ok(record
            .values
            .get(&(index, plug.elements().to_vec()))
            .cloned()
            .unwrap_or_else(|| slot.spec.default_value()))
    }

    /// Value arriving through a connection to this plug or a compound parent
    fn read_incoming(
        &self,
        record: &NodeRecord,
        plug: &PlugHandle,
        index: u32,
        time: f64,
        depth: usize,
    ) -> HostResult<Option<Value>> {
        let mut positions = Vec::new();
        let mut attr = index;
        loop {
            let key = PlugHandle::with_elements(plug.node(), record.attr_id(attr), plug.elements().to_vec());
            if let Some(src) = self.source_of(&key) {
                let mut value = self.read_depth(&src, time, depth + 1)?;
                for pos in positions.iter().rev() {
                    value = value
                        .as_array()
                        .and_then(|items| items.get(*pos))
                        .cloned()
                        .unwrap_or(Value::Null);
                }
                return Ok(Some(value));
            }

            let slot = record.slot(attr);
            let Some(parent) = slot.parent else {
                return Ok(None);
            };
            if slot.spec.array {
                return Ok(None);
            }
            let pos = record
                .slot(parent)
                .children
                .iter()
                .position(|c| *c == attr)
                .unwrap_or(0);
            positions.push(pos);
            attr = parent;
        }
    }

    fn compute(&self, node: NodeHandle, record: &NodeRecord, time: f64, depth: usize) -> HostResult<Value> {
        if record.kind == NodeKind::AnimCurve {
            return Ok(Value::Float(eval::evaluate(&record.keys, time)));
        }

        let input = |name: &str| -> HostResult<f64> {
            let index = *record
                .by_name
                .get(name)
                .ok_or_else(|| HostError::NotFound(format!("{}.{}", record.name, name)))?;
            let plug = PlugHandle::new(node, record.attr_id(index));
            Ok(self.read_depth(&plug, time, depth + 1)?.as_float().unwrap_or(0.0))
        };

        match record.type_name.as_str() {
            "multDoubleLinear" => Ok(Value::Float(input("input1")? * input("input2")?)),
            "addDoubleLinear" => Ok(Value::Float(input("input1")? + input("input2")?)),
            _ => Ok(Value::Null),
        }
    }

    pub fn write(&mut self, plug: &PlugHandle, value: &Value) -> HostResult<()> {
        let mut writes = Vec::new();
        self.plan_write(plug, value, &mut writes)?;
        let record = self.node_mut(plug.node())?;
        for (key, value) in writes {
            record.values.insert(key, value);
        }
        Ok(())
    }

    /// Collect leaf writes without touching the scene
    fn plan_write(
        &self,
        plug: &PlugHandle,
        value: &Value,
        out: &mut Vec<(ValueKey, Value)>,
    ) -> HostResult<()> {
        let (record, index) = self.check(plug)?;
        let slot = record.slot(index);
        let path = || self.describe_plug(plug);

        if slot.output || slot.spec.ty == AttributeType::Message {
            return Err(HostError::Unsupported(format!("{} is not writable", path())));
        }
        if record.is_plug_locked(index, plug.elements()) {
            return Err(HostError::Locked(path()));
        }
        if self.source_of(plug).is_some() {
            return Err(HostError::Locked(format!("{} has an incoming connection", path())));
        }

        let mismatch = || HostError::TypeMismatch {
            path: path(),
            expected: slot.spec.ty.name().to_string(),
            got: value.type_name().to_string(),
        };

        if record.is_whole_array(index, plug.elements()) {
            let items = value.as_array().ok_or_else(mismatch)?;
            for (i, item) in items.iter().enumerate() {
                self.plan_write(&plug.element(i as u32), item, out)?;
            }
            return Ok(());
        }
        if !slot.children.is_empty() {
            let items = value.as_array().ok_or_else(mismatch)?;
            if items.len() != slot.children.len() {
                return Err(mismatch());
            }
            for (child, item) in slot.children.iter().zip(items) {
                let child = PlugHandle::with_elements(
                    plug.node(),
                    record.attr_id(*child),
                    plug.elements().to_vec(),
                );
                self.plan_write(&child, item, out)?;
            }
            return Ok(());
        }

        let coerced = slot.spec.coerce(value).ok_or_else(mismatch)?;
        out.push(((index, plug.elements().to_vec()), coerced));
        Ok(())
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub fn source_of(&self, plug: &PlugHandle) -> Option<PlugHandle> {
        self.connections
            .iter()
            .find(|(_, dst)| dst == plug)
            .map(|(src, _)| src.clone())
    }

    pub fn connect(&mut self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()> {
        self.check(src)?;
        let (record, index) = self.check(dst)?;
        if src == dst {
            return Err(HostError::Connection(format!(
                "cannot connect {} to itself",
                self.describe_plug(src)
            )));
        }
        if record.slot(index).output {
            return Err(HostError::Connection(format!(
                "{} is computed and cannot be a destination",
                self.describe_plug(dst)
            )));
        }
        if record.is_plug_locked(index, dst.elements()) {
            return Err(HostError::Locked(self.describe_plug(dst)));
        }
        if let Some(existing) = self.source_of(dst) {
            return Err(HostError::Connection(format!(
                "{} is already connected from {}",
                self.describe_plug(dst),
                self.describe_plug(&existing)
            )));
        }
        self.connections.push((src.clone(), dst.clone()));
        Ok(())
    }

    pub fn disconnect(&mut self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()> {
        let before = self.connections.len();
        self.connections.retain(|(s, d)| !(s == src && d == dst));
        if self.connections.len() == before {
            return Err(HostError::Connection(format!(
                "{} is not connected to {}",
                self.describe_plug(src),
                self.describe_plug(dst)
            )));
        }
        Ok(())
    }

    pub fn connected_to(&self, plug: &PlugHandle, sources: bool, destinations: bool) -> HostResult<Vec<PlugHandle>> {
        self.check(plug)?;
        Ok(self
            .connections
            .iter()
            .filter_map(|(src, dst)| {
                if sources && dst == plug {
                    Some(src.clone())
                } else if destinations && src == plug {
                    Some(dst.clone())
                } else {
                    None
                }
            })
            .collect())
    }

    pub fn connections(&self, node: NodeHandle) -> HostResult<Vec<(PlugHandle, PlugHandle)>> {
        self.node(node)?;
        Ok(self
            .connections
            .iter()
            .filter(|(src, dst)| src.node() == node || dst.node() == node)
            .cloned()
            .collect())
    }

    // ========================================================================
    // Sets and animation
    // ========================================================================

    fn expect_kind(&self, node: NodeHandle, kind: NodeKind) -> HostResult<()> {
        let record = self.node(node)?;
        if record.kind != kind {
            return Err(HostError::Unsupported(format!(
                "{} is a {}, not a {:?} node",
                record.name, record.type_name, kind
            )));
        }
        Ok(())
    }

    pub fn set_members(&self, set: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        self.expect_kind(set, NodeKind::Set)?;
        Ok(self.node(set)?.members.clone())
    }

    pub fn add_set_member(&mut self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.expect_kind(set, NodeKind::Set)?;
        self.node(member)?;
        if set == member {
            return Err(HostError::Unsupported(format!(
                "{} cannot contain itself",
                self.describe(set)
            )));
        }
        let record = self.node_mut(set)?;
        if !record.members.contains(&member) {
            record.members.push(member);
        }
        Ok(())
    }

    pub fn remove_set_member(&mut self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.expect_kind(set, NodeKind::Set)?;
        let description = self.describe(member);
        let record = self.node_mut(set)?;
        let before = record.members.len();
        record.members.retain(|m| *m != member);
        if record.members.len() == before {
            return Err(HostError::NotFound(format!(
                "{} is not a member of {}",
                description, record.name
            )));
        }
        Ok(())
    }

    pub fn set_key(&mut self, curve: NodeHandle, key: Key) -> HostResult<()> {
        self.expect_kind(curve, NodeKind::AnimCurve)?;
        eval::insert_key(&mut self.node_mut(curve)?.keys, key);
        Ok(())
    }

    pub fn remove_key(&mut self, curve: NodeHandle, time: f64) -> HostResult<()> {
        self.expect_kind(curve, NodeKind::AnimCurve)?;
        let record = self.node_mut(curve)?;
        let before = record.keys.len();
        record.keys.retain(|k| (k.time - time).abs() >= 1e-9);
        if record.keys.len() == before {
            return Err(HostError::NotFound(format!("{} has no key at {}", record.name, time)));
        }
        Ok(())
    }

    pub fn keys(&self, curve: NodeHandle) -> HostResult<Vec<Key>> {
        self.expect_kind(curve, NodeKind::AnimCurve)?;
        Ok(self.node(curve)?.keys.clone())
    }
}
