//! The host boundary
//!
//! A [`Host`] is the live scene engine being wrapped. It owns every node,
//! attribute, connection and undo step; the access layer only ever holds
//! opaque handles into it. Implementations must be safe to share behind an
//! `Arc`, but callers drive them from one cooperative thread.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeSpec;
use crate::error::HostResult;
use crate::handle::{NodeHandle, PlugHandle, SubscriptionId};
use crate::unit::UnitKind;
use crate::value::Value;

/// Capability shape of a node, fixed by its type at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Dependency node without hierarchy
    Plain,
    /// Hierarchy-capable node with a parent and children
    Dag,
    /// Set-like node with members
    Set,
    /// Animation curve evaluated over time
    AnimCurve,
}

/// Interpolation between consecutive animation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    Smooth,
}

/// A single animation key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub time: f64,
    pub value: f64,
    pub interpolation: Interpolation,
}

/// Static description of a resolved plug
#[derive(Debug, Clone, PartialEq)]
pub struct PlugInfo {
    /// Short attribute name, e.g. `tx`
    pub name: String,
    /// Long attribute name, e.g. `translateX`
    pub long_name: String,
    /// Partial path on the node including element indices, e.g. `items[2].weight`
    pub path: String,
    pub type_name: String,
    pub unit: Option<UnitKind>,
    /// Array attribute not narrowed to one element
    pub is_array: bool,
    pub is_compound: bool,
    pub child_count: usize,
    pub locked: bool,
    pub keyable: bool,
    /// False for message attributes and computed outputs
    pub writable: bool,
}

/// One connection captured when a node was deleted
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotConnection {
    /// Plug path on the deleted node
    pub local: String,
    pub remote: NodeHandle,
    pub remote_plug: String,
    /// True when the deleted node was the source
    pub outgoing: bool,
}

/// Everything needed to recreate a deleted node and its descendants
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub handle: NodeHandle,
    pub type_name: String,
    pub name: String,
    pub parent: Option<NodeHandle>,
    pub locked: bool,
    pub dynamic: Vec<AttributeSpec>,
    /// Non-default values by plug path
    pub values: Vec<(String, Value)>,
    pub locked_plugs: Vec<String>,
    pub connections: Vec<SnapshotConnection>,
    /// Sets this node belonged to
    pub memberships: Vec<NodeHandle>,
    /// Members, when the node is a set
    pub members: Vec<NodeHandle>,
    /// Keys, when the node is an animation curve
    pub keys: Vec<Key>,
    pub children: Vec<NodeSnapshot>,
}

/// Invoked once, with the dying node, right before its handle is released
pub type DestroyCallback = Box<dyn Fn(NodeHandle) + Send + Sync>;

/// One half of an undo step
pub type UndoFn = Box<dyn FnMut() -> HostResult<()> + Send>;

/// A live scene-graph engine
pub trait Host: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Host version, compared against the minimum supported one
    fn version(&self) -> u32;

    /// Whether `node` still refers to a live node
    fn is_valid(&self, node: NodeHandle) -> bool;

    /// Identity hash of a live node
    ///
    /// Stable for the node's lifetime. May be reused once it is destroyed.
    fn hash_code(&self, node: NodeHandle) -> HostResult<u64>;

    fn node_kind(&self, node: NodeHandle) -> HostResult<NodeKind>;

    fn type_name(&self, node: NodeHandle) -> HostResult<String>;

    fn node_name(&self, node: NodeHandle) -> HostResult<String>;

    /// Full path, `|parent|child` for hierarchy nodes and the bare name otherwise
    fn node_path(&self, node: NodeHandle) -> HostResult<String>;

    /// Shortest path that still uniquely identifies the node
    fn shortest_path(&self, node: NodeHandle) -> HostResult<String>;

    /// Resolve a name or path to a live node
    fn lookup(&self, path: &str) -> HostResult<NodeHandle>;

    /// Every live node, optionally filtered by type, in creation order
    fn ls(&self, type_name: Option<&str>) -> Vec<NodeHandle>;

    fn is_node_locked(&self, node: NodeHandle) -> HostResult<bool>;

    fn set_node_locked(&self, node: NodeHandle, locked: bool) -> HostResult<()>;

    // ========================================================================
    // Plugs
    // ========================================================================

    /// Resolve `name`, `name[index]`, `name.child` or `name[index].child`
    fn find_plug(&self, node: NodeHandle, path: &str) -> HostResult<PlugHandle>;

    /// Cheap liveness check for a previously resolved plug
    fn plug_valid(&self, plug: &PlugHandle) -> bool;

    fn plug_info(&self, plug: &PlugHandle) -> HostResult<PlugInfo>;

    /// Child `index` of a compound plug
    fn plug_child(&self, plug: &PlugHandle, index: usize) -> HostResult<PlugHandle>;

    /// Logical indices of an array plug that hold a value or a connection
    fn existing_indices(&self, plug: &PlugHandle) -> HostResult<Vec<u32>>;

    /// Top-level attribute long names, static first, then dynamic
    fn attribute_names(&self, node: NodeHandle) -> HostResult<Vec<String>>;

    /// Evaluate a plug, at `time` if given, otherwise at the current time
    fn read_plug(&self, plug: &PlugHandle, time: Option<f64>) -> HostResult<Value>;

    fn default_value(&self, plug: &PlugHandle) -> HostResult<Value>;

    fn write_plug(&self, plug: &PlugHandle, value: &Value) -> HostResult<()>;

    fn set_plug_locked(&self, plug: &PlugHandle, locked: bool) -> HostResult<()>;

    fn add_attribute(&self, node: NodeHandle, spec: &AttributeSpec) -> HostResult<()>;

    /// Remove a dynamic attribute, returning its spec
    fn remove_attribute(&self, node: NodeHandle, name: &str) -> HostResult<AttributeSpec>;

    // ========================================================================
    // Connections
    // ========================================================================

    /// Fails if `dst` already has an incoming connection
    fn connect(&self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()>;

    fn disconnect(&self, src: &PlugHandle, dst: &PlugHandle) -> HostResult<()>;

    /// Plugs connected to `plug` as its sources and/or destinations
    fn connected_to(
        &self,
        plug: &PlugHandle,
        sources: bool,
        destinations: bool,
    ) -> HostResult<Vec<PlugHandle>>;

    /// Every `(source, destination)` pair touching `node`
    fn connections(&self, node: NodeHandle) -> HostResult<Vec<(PlugHandle, PlugHandle)>>;

    // ========================================================================
    // Lifecycle and hierarchy
    // ========================================================================

    fn create_node(
        &self,
        type_name: &str,
        name: Option<&str>,
        parent: Option<NodeHandle>,
    ) -> HostResult<NodeHandle>;

    /// Delete a node and its descendants, firing destruction callbacks
    fn delete_node(&self, node: NodeHandle) -> HostResult<NodeSnapshot>;

    /// Recreate a deleted node tree, mapping stale handles through `remap`
    ///
    /// Returns `(old, new)` for every node recreated.
    fn restore_node(
        &self,
        snapshot: &NodeSnapshot,
        remap: &HashMap<NodeHandle, NodeHandle>,
    ) -> HostResult<Vec<(NodeHandle, NodeHandle)>>;

    /// Rename, returning the name actually given
    fn rename_node(&self, node: NodeHandle, name: &str) -> HostResult<String>;

    fn reparent_node(&self, node: NodeHandle, parent: Option<NodeHandle>) -> HostResult<()>;

    fn parent(&self, node: NodeHandle) -> HostResult<Option<NodeHandle>>;

    fn children(&self, node: NodeHandle) -> HostResult<Vec<NodeHandle>>;

    // ========================================================================
    // Sets and animation
    // ========================================================================

    fn set_members(&self, set: NodeHandle) -> HostResult<Vec<NodeHandle>>;

    fn add_set_member(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()>;

    fn remove_set_member(&self, set: NodeHandle, member: NodeHandle) -> HostResult<()>;

    /// Insert a key, replacing any key at the same time
    fn set_key(&self, curve: NodeHandle, key: Key) -> HostResult<()>;

    fn remove_key(&self, curve: NodeHandle, time: f64) -> HostResult<()>;

    /// Keys sorted by time
    fn keys(&self, curve: NodeHandle) -> HostResult<Vec<Key>>;

    // ========================================================================
    // Notifications, time and undo
    // ========================================================================

    fn subscribe_destroyed(
        &self,
        node: NodeHandle,
        callback: DestroyCallback,
    ) -> HostResult<SubscriptionId>;

    /// Cancel a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);

    fn current_time(&self) -> f64;

    fn set_current_time(&self, time: f64);

    /// Push one step onto the host's global undo stack
    fn register_undo(&self, name: &str, undo: UndoFn, redo: UndoFn);
}
