//! # strand_host - In-Memory Scene Engine
//!
//! A reference implementation of [`strand_core::Host`]:
//! - Generational node handles with index-derived, recyclable hash codes
//! - Static and dynamic attributes, arrays and compounds
//! - Connections feeding evaluation, computed outputs and animation curves
//! - Destruction subscriptions fired before a node's handle is released
//! - A single global undo stack
//!
//! Scene state sits behind one lock. Callbacks and undo closures always run
//! with that lock released so they may call back into the host.

pub mod alloc;
pub mod callbacks;
pub mod eval;
pub mod scene;
pub mod types;
pub mod undo;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use strand_core::{
    AttributeSpec, DestroyCallback, Host, HostError, HostResult, Key, NodeHandle, NodeKind,
    NodeSnapshot, PlugHandle, PlugInfo, SubscriptionId, UndoFn, Value,
};

use crate::callbacks::Subscriptions;
use crate::scene::Scene;
use crate::undo::{UndoStack, UndoStep};

pub use crate::types::{NodeType, TypeRegistry};

/// Version reported by default
pub const HOST_VERSION: u32 = 2024;

pub struct MemoryHost {
    scene: Mutex<Scene>,
    subscriptions: Mutex<Subscriptions>,
    undo: Mutex<UndoStack>,
    /// Set while an undo or redo closure runs
    replaying: AtomicBool,
    version: u32,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::with_version(HOST_VERSION)
    }

    pub fn with_version(version: u32) -> Self {
        Self {
            scene: Mutex::new(Scene::new(TypeRegistry::builtin())),
            subscriptions: Mutex::new(Subscriptions::new()),
            undo: Mutex::new(UndoStack::new()),
            replaying: AtomicBool::new(false),
            version,
        }
    }

    /// Make a new node type creatable
    pub fn register_type(&self, ty: NodeType) {
        log::debug!("Registered node type {}", ty.name);
        self.scene.lock().types.register(ty);
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.scene.lock().len()
    }

    /// Number of installed destruction subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn fire_destroyed(&self, nodes: &[NodeHandle]) {
        let callbacks = self.subscriptions.lock().take_for(nodes);
        for (node, callback) in callbacks {
            callback(node);
        }
    }

    /// Destroy every node and flush the undo stack
    pub fn new_scene(&self) {
        let doomed = self.scene.lock().ls(None);
        let callbacks = self.subscriptions.lock().take_all();
        for (node, callback) in callbacks {
            callback(node);
        }

        {
            let mut scene = self.scene.lock();
            scene.remove_nodes(&doomed);
            scene.time = 0.0;
        }
        self.undo.lock().clear();
        log::info!("New scene: {} nodes destroyed", doomed.len());
    }

    // ========================================================================
    // Undo
    // ========================================================================

    /// Revert the most recent step, returning false when there is none
    pub fn undo(&self) -> HostResult<bool> {
        let Some(mut step) = self.undo.lock().pop_undo() else {
            return Ok(false);
        };
        log::debug!("Undo: {}", step.name);

        self.replaying.store(true, Ordering::SeqCst);
        let result = (step.undo)();
        self.replaying.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.undo.lock().push_to_redo(step);
                Ok(true)
            }
            Err(e) => {
                log::error!("Undo of '{}' failed: {}", step.name, e);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone step
    pub fn redo(&self) -> HostResult<bool> {
        let Some(mut step) = self.undo.lock().pop_redo() else {
            return Ok(false);
        };
        log::debug!("Redo: {}", step.name);

        self.replaying.store(true, Ordering::SeqCst);
        let result = (step.redo)();
        self.replaying.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.undo.lock().push_to_undo(step);
                Ok(true)
            }
            Err(e) => {
                log::error!("Redo of '{}' failed: {}", step.name, e);
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.lock().can_redo()
    }

    pub fn undo_count(&self) -> usize {
        self.undo.lock().undo_count()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo.lock().undo_description().map(str::to_string)
    }

    pub fn flush_undo(&self) {
        self.undo.lock().clear();
    }
}

impl Host for MemoryHost {
    fn version(&self) -> u32 {
        self.version
    }

    fn is_valid(&self, node: NodeHandle) -> bool {
        self.scene.lock().is_valid(node)
    }

    fn hash_code(&self, node: NodeHandle) -> HostResult<u64> {
        self.scene.lock().hash_code(node)
    }

    fn node_kind(&self, node: NodeHandle) -> HostResult<NodeKind> {
        Ok(self.scene.lock().node(node)?.kind)
    }

    fn type_name(&self, node: NodeHandle) -> HostResult<String> {
        Ok(self.scene.lock().node(node)?.type_name.clone())
    }

    fn node_name(&self, node: NodeHandle) -> HostResult<String> {
        Ok(self.scene.lock().node(node)?.name.clone())
    }

    fn node_path(&self, node: NodeHandle) -> HostResult<String> {
        self.scene.lock().node_path(node)
    }

    fn shortest_path(&self, node: NodeHandle) -> HostResult<String> {
        // Names are unique scene-wide
        self.node_name(node)
    }

    fn lookup(&self, path: &str) -> HostResult<NodeHandle> {
        self.scene.lock().lookup(path)
    }

    fn ls(&self, type_name: Option<&str>) -> Vec<NodeHandle> {
        self.scene.lock().ls(type_name)
    }

    fn is_node_locked(&self, node: NodeHandle) -> HostResult<bool> {
        Ok(self.scene.lock().node(node)?.locked)
    }

    fn set_node_locked(&self, node: NodeHandle, locked: bool) -> HostResult<()> {
        self.scene.lock().set_node_locked(node, locked)
    }

    fn find_plug(&self, node: NodeHandle, path: &str) -> HostResult<PlugHandle> {
        self.scene.lock().resolve(node, path)
    }

    fn plug_valid(&self, plug: &PlugHandle) -> bool {
        self.scene.lock().plug_valid(plug)
    }

    fn plug_info(&self, plug: &PlugHandle) -> HostResult<PlugInfo> {
        self.scene.lock().plug_info(plug)
    }

    fn plug_child(&self, plug: &PlugHandle, index: usize) -> HostResult<PlugHandle> {
        self.scene.lock().plug_child(plug, index)
    }

    fn existing_indices(&self, plug: &PlugHandle) -> HostResult<Vec<u32>> {
        self.scene.lock().existing_indices(plug)
    }

    fn attribute_names(&self, node: NodeHandle) -> HostResult<Vec<String>> {
        self.scene.lock().attribute_names(node)
    }

    fn read_plug(&self, plug: &PlugHandle, time: Option<f64>) -> HostResult<Value> {
        self.scene.lock().read(plug, time)
    }

    fn default_value(&self, plug: &PlugHandle) -> HostResult<Value> {
        self.scene.lock().default_value(plug)
    }

    fn write_plug(&self, plug: &PlugHandle, value: &Value) -> HostResult<()> {
        self.scene.lock().write(plug, value)
    }

    fn set_plug_locked(&self, plug: &PlugHandle, locked: bool) -> HostResult<()> {
        self.scene.lock().set_plug_locked(plug, locked)
    }

    fn add_attribute(&self, node: NodeHandle, spec: &AttributeSpec) -> HostResult<()> {
        self.scene.lock().add_attribute(node, spec)
    }

    fn remove_attribute(&self, node: NodeHandle, name: &str) -> HostResult<AttributeSpec> {
        self.scene.lock().remove_attribute(node, name)
    }

    fn connect(&self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()> {
        self.scene.lock().connect(src, dst)
    }

    fn disconnect(&self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()> {
        self.scene.lock().disconnect(src, dst)
    }

    fn connected_to(
        &self,
        plug: &PlugHandle,
        sources: bool,
        destinations: bool,
    ) -> HostResult<Vec<PlugHandle>> {
        self.scene.lock().connected_to(plug, sources, destinations)
    }

    fn connections(&self, node: NodeHandle) -> HostResult<Vec<(PlugHandle, PlugHandle)>> {
        self.scene.lock().connections(node)
    }

    fn create_node(
        &self,
        type_name: &str,
        name: Option<&str>,
        parent: Option<NodeHandle>,
    ) -> HostResult<NodeHandle> {
        let node = self.scene.lock().create_node(type_name, name, parent)?;
        log::trace!("Created {} {:?}", type_name, node);
        Ok(node)
    }

    fn delete_node(&self, node: NodeHandle) -> HostResult<NodeSnapshot> {
        let (snapshot, doomed) = {
            let scene = self.scene.lock();
            let doomed = scene.subtree(node)?;
            scene.check_deletable(&doomed)?;
            (scene.snapshot(node)?, doomed)
        };

        // Subscribers still see live nodes
        self.fire_destroyed(&doomed);

        self.scene.lock().remove_nodes(&doomed);
        log::trace!("Deleted {} ({} nodes)", snapshot.name, doomed.len());
        Ok(snapshot)
    }

    fn restore_node(
        &self,
        snapshot: &NodeSnapshot,
        remap: &HashMap<NodeHandle, NodeHandle>,
    ) -> HostResult<Vec<(NodeHandle, NodeHandle)>> {
        self.scene.lock().restore(snapshot, remap)
    }

    fn rename_node(&self, node: NodeHandle, name: &str) -> HostResult<String> {
        self.scene.lock().rename_node(node, name)
    }

    fn reparent_node(&self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<()> {
        self.scene.lock().reparent_node(node, parent)
    }

    fn parent(&self, node: NodeHandle) -> HostResult<Option<NodeHandle>> {
        Ok(self.scene.lock().node(node)?.parent)
    }

    fn children(&self, node: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        Ok(self.scene.lock().node(node)?.children.clone())
    }

    fn set_members(&self, set: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        self.scene.lock().set_members(set)
    }

    fn add_set_member(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.scene.lock().add_set_member(set, member)
    }

    fn remove_set_member(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()> {
        self.scene.lock().remove_set_member(set, member)
    }

    fn set_key(&self, curve: NodeHandle, key: Key) -> HostResult<()> {
        self.scene.lock().set_key(curve, key)
    }

    fn remove_key(&self, curve: NodeHandle, time: f64) -> HostResult<()> {
        self.scene.lock().remove_key(curve, time)
    }

    fn keys(&self, curve: NodeHandle) -> HostResult<Vec<Key>> {
        self.scene.lock().keys(curve)
    }

    fn subscribe_destroyed(
        &self,
        node: NodeHandle,
        callback: DestroyCallback,
    ) -> HostResult<SubscriptionId> {
        if !self.is_valid(node) {
            return Err(HostError::InvalidHandle(format!("{:?}", node)));
        }
        Ok(self.subscriptions.lock().subscribe(node, callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.lock().unsubscribe(id);
    }

    fn current_time(&self) -> f64 {
        self.scene.lock().time
    }

    fn set_current_time(&self, time: f64) {
        self.scene.lock().time = time;
    }

    fn register_undo(&self, name: &str, undo: UndoFn, redo: UndoFn) {
        if self.replaying.load(Ordering::SeqCst) {
            log::debug!("Ignoring undo registration '{}' during replay", name);
            return;
        }
        self.undo.lock().push(UndoStep {
            name: name.to_string(),
            undo,
            redo,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_version() {
        assert_eq!(MemoryHost::new().version(), HOST_VERSION);
        assert_eq!(MemoryHost::with_version(2017).version(), 2017);
    }

    #[test]
    fn test_register_type() {
        let host = MemoryHost::new();
        assert!(host.create_node("rigNode", None, None).is_err());
        host.register_type(
            NodeType::new("rigNode", NodeKind::Plain).with_attribute(AttributeSpec::double("gain")),
        );
        let node = host.create_node("rigNode", None, None).unwrap();
        assert!(host.find_plug(node, "gain").is_ok());
    }
}
