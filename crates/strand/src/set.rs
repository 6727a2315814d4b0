//! Set nodes

use std::collections::HashSet;
use std::ops::Deref;

use strand_core::{NodeHandle, NodeKind};

use crate::error::Result;
use crate::modifier::single;
use crate::node::{Node, Nodes};

/// A node holding an unordered collection of other nodes
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ObjectSet(Node);

impl Deref for ObjectSet {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl From<ObjectSet> for Node {
    fn from(set: ObjectSet) -> Node {
        set.0
    }
}

impl ObjectSet {
    pub(crate) fn from_node(node: Node) -> Self {
        Self(node)
    }

    pub fn as_node(&self) -> &Node {
        &self.0
    }

    fn member_handles(&self, type_name: Option<&str>) -> Result<Vec<NodeHandle>> {
        self.ensure_alive()?;
        let host = &self.shared().host;
        let members = host.set_members(self.handle())?;
        Ok(match type_name {
            None => members,
            Some(wanted) => members
                .into_iter()
                .filter(|h| host.type_name(*h).map_or(false, |t| t == wanted))
                .collect(),
        })
    }

    pub fn members(&self, type_name: Option<&str>) -> Result<Nodes> {
        Ok(Nodes::new(self.session(), self.member_handles(type_name)?))
    }

    pub fn member(&self, type_name: Option<&str>) -> Result<Option<Node>> {
        Ok(self.members(type_name)?.next())
    }

    pub fn contains(&self, node: &Node) -> Result<bool> {
        Ok(self.member_handles(None)?.contains(&node.handle()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.member_handles(None)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn add(&self, node: &Node) -> Result<()> {
        single(&self.session(), |m| m.add_member(self, node))
    }

    pub fn remove(&self, node: &Node) -> Result<()> {
        single(&self.session(), |m| m.remove_member(self, node))
    }

    /// Add several nodes as one undoable step
    pub fn update<'a>(&self, nodes: impl IntoIterator<Item = &'a Node>) -> Result<()> {
        self.session().transaction(|m| {
            for node in nodes {
                m.add_member(self, node)?;
            }
            Ok(())
        })
    }

    /// Remove every member as one undoable step
    pub fn clear(&self) -> Result<()> {
        let members: Vec<Node> = self.members(None)?.collect();
        self.session().transaction(|m| {
            for member in &members {
                m.remove_member(self, member)?;
            }
            Ok(())
        })
    }

    /// Members of this set and of every set nested in it
    ///
    /// Nested sets themselves are not included; each node appears once.
    pub fn flatten(&self, type_name: Option<&str>) -> Result<Vec<Node>> {
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        self.flatten_into(type_name, &mut visited, &mut seen, &mut found)?;
        Ok(found)
    }

    fn flatten_into(
        &self,
        type_name: Option<&str>,
        visited: &mut HashSet<NodeHandle>,
        seen: &mut HashSet<NodeHandle>,
        found: &mut Vec<Node>,
    ) -> Result<()> {
        if !visited.insert(self.handle()) {
            return Ok(());
        }
        for member in self.members(None)? {
            if member.kind() == NodeKind::Set {
                if let Some(nested) = member.as_set() {
                    nested.flatten_into(type_name, visited, seen, found)?;
                }
                continue;
            }
            let matches = match type_name {
                Some(wanted) => member.type_name()? == wanted,
                None => true,
            };
            if matches && seen.insert(member.handle()) {
                found.push(member);
            }
        }
        Ok(())
    }
}
