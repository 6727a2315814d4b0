//! Hierarchy nodes

use std::ops::Deref;

use strand_core::{NodeHandle, NodeKind};

use crate::error::Result;
use crate::modifier::single;
use crate::node::{Node, Nodes};

/// A node that can have a parent and children
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DagNode(Node);

impl Deref for DagNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl From<DagNode> for Node {
    fn from(dag: DagNode) -> Node {
        dag.0
    }
}

/// Lazy sequence of hierarchy nodes
pub struct DagNodes(Nodes);

impl Iterator for DagNodes {
    type Item = DagNode;

    fn next(&mut self) -> Option<DagNode> {
        self.0.by_ref().find_map(|node| node.as_dag())
    }
}

impl DagNode {
    pub(crate) fn from_node(node: Node) -> Self {
        Self(node)
    }

    pub fn as_node(&self) -> &Node {
        &self.0
    }

    /// Keep the handles whose node type matches `type_name`
    fn of_type(&self, handles: Vec<NodeHandle>, type_name: Option<&str>) -> Vec<NodeHandle> {
        let host = &self.shared().host;
        match type_name {
            None => handles,
            Some(wanted) => handles
                .into_iter()
                .filter(|h| host.type_name(*h).map_or(false, |t| t == wanted))
                .collect(),
        }
    }

    fn sequence(&self, handles: Vec<NodeHandle>) -> DagNodes {
        DagNodes(Nodes::new(self.session(), handles))
    }

    /// Direct parent, `None` at the top or when it is not of `type_name`
    pub fn parent(&self, type_name: Option<&str>) -> Result<Option<DagNode>> {
        self.ensure_alive()?;
        let parent = self.shared().host.parent(self.handle())?;
        let Some(parent) = parent else {
            return Ok(None);
        };
        if self.of_type(vec![parent], type_name).is_empty() {
            return Ok(None);
        }
        Ok(self.session().wrap(parent)?.as_dag())
    }

    pub fn children(&self, type_name: Option<&str>) -> Result<DagNodes> {
        self.ensure_alive()?;
        let children = self.shared().host.children(self.handle())?;
        Ok(self.sequence(self.of_type(children, type_name)))
    }

    pub fn child(&self, type_name: Option<&str>) -> Result<Option<DagNode>> {
        Ok(self.children(type_name)?.next())
    }

    /// Nodes sharing this node's parent, top-level nodes for a root
    pub fn siblings(&self, type_name: Option<&str>) -> Result<DagNodes> {
        self.ensure_alive()?;
        let host = &self.shared().host;
        let peers = match host.parent(self.handle())? {
            Some(parent) => host.children(parent)?,
            None => host
                .ls(None)
                .into_iter()
                .filter(|h| {
                    host.node_kind(*h).map_or(false, |k| k == NodeKind::Dag)
                        && host.parent(*h).map_or(false, |p| p.is_none())
                })
                .collect(),
        };
        let peers = peers.into_iter().filter(|h| *h != self.handle()).collect();
        Ok(self.sequence(self.of_type(peers, type_name)))
    }

    /// Every node below this one, depth first
    pub fn descendents(&self, type_name: Option<&str>) -> Result<DagNodes> {
        self.ensure_alive()?;
        let host = &self.shared().host;
        let mut found = Vec::new();
        let mut stack: Vec<NodeHandle> = host.children(self.handle())?.into_iter().rev().collect();
        while let Some(handle) = stack.pop() {
            found.push(handle);
            stack.extend(host.children(handle)?.into_iter().rev());
        }
        Ok(self.sequence(self.of_type(found, type_name)))
    }

    /// Topmost ancestor, or this node when it has no parent
    pub fn root(&self) -> Result<DagNode> {
        let mut current = self.clone();
        while let Some(parent) = current.parent(None)? {
            current = parent;
        }
        Ok(current)
    }

    /// Number of ancestors
    pub fn level(&self) -> Result<usize> {
        self.ensure_alive()?;
        let host = &self.shared().host;
        let mut level = 0;
        let mut current = host.parent(self.handle())?;
        while let Some(parent) = current {
            level += 1;
            current = host.parent(parent)?;
        }
        Ok(level)
    }

    /// Move `child` under this node as one undoable step
    pub fn add_child(&self, child: &DagNode) -> Result<()> {
        single(&self.session(), |m| m.reparent(child, Some(self)))
    }

    /// Move this node under `parent`, or to the top when `None`
    pub fn reparent(&self, parent: Option<&DagNode>) -> Result<()> {
        single(&self.session(), |m| m.reparent(self, parent))
    }

    pub fn hide(&self) -> Result<()> {
        self.set("visibility", false)
    }

    pub fn show(&self) -> Result<()> {
        self.set("visibility", true)
    }

    pub fn is_visible(&self) -> Result<bool> {
        Ok(self.get("visibility")?.as_bool().unwrap_or(false))
    }
}
