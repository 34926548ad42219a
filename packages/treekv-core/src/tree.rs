use crate::ids::NodeId;
use crate::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single record in the tree.
///
/// Children are kept in insertion order; that order is the public iteration
/// order for `child_names`, snapshot emission, and matcher enumeration, so
/// replicas agree on it by construction. `child_list_count` is derived from
/// the container and only materialized in projections and snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    payload: Option<Vec<u8>>,
    payload_version: u64,
    child_list_version: u64,
    children: Vec<(NodeId, Node)>,
}

impl Default for Node {
    fn default() -> Self {
        Node::new()
    }
}

impl Node {
    /// Fresh node: no payload, no children, both counters at 1.
    pub fn new() -> Self {
        Node {
            payload: None,
            payload_version: 1,
            child_list_version: 1,
            children: Vec::new(),
        }
    }

    /// Fresh node carrying its initial payload at `payload_version = 1`.
    /// Used when a put materializes a leaf; updates go through
    /// [`Node::set_payload`] instead.
    pub fn with_payload(payload: Option<Vec<u8>>) -> Self {
        Node {
            payload,
            ..Node::new()
        }
    }

    pub(crate) fn from_snapshot_parts(
        payload: Option<Vec<u8>>,
        payload_version: u64,
        child_list_version: u64,
        children: Vec<(NodeId, Node)>,
    ) -> Self {
        Node {
            payload,
            payload_version,
            child_list_version,
            children,
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn payload_version(&self) -> u64 {
        self.payload_version
    }

    pub fn child_list_version(&self) -> u64 {
        self.child_list_version
    }

    pub fn child_count(&self) -> u64 {
        self.children.len() as u64
    }

    pub fn children(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.children.iter().map(|(id, node)| (id, node))
    }

    pub fn child_names(&self) -> Vec<NodeId> {
        self.children.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn child(&self, id: &NodeId) -> Option<&Node> {
        self.children
            .iter()
            .find(|(child_id, _)| child_id == id)
            .map(|(_, node)| node)
    }

    pub fn child_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.children
            .iter_mut()
            .find(|(child_id, _)| child_id == id)
            .map(|(_, node)| node)
    }

    /// Set or clear the payload, bumping `payload_version`.
    pub fn set_payload(&mut self, payload: Option<Vec<u8>>) {
        self.payload = payload;
        self.payload_version += 1;
    }

    /// Attach `node` under `id`. A brand-new child changes the child set and
    /// bumps `child_list_version`; replacing an existing child does not.
    pub fn insert_child(&mut self, id: NodeId, node: Node) {
        if let Some(slot) = self.child_mut(&id) {
            *slot = node;
            return;
        }
        self.children.push((id, node));
        self.child_list_version += 1;
    }

    /// Attach a child while materializing a fresh subtree. The node under
    /// construction has never been observed, so its `child_list_version`
    /// stays at its initial value.
    pub(crate) fn adopt_child(&mut self, id: NodeId, node: Node) {
        self.children.push((id, node));
    }

    /// Detach and return the child under `id`, bumping `child_list_version`
    /// when the child existed.
    pub fn remove_child(&mut self, id: &NodeId) -> Option<Node> {
        let position = self.children.iter().position(|(child_id, _)| child_id == id)?;
        let (_, node) = self.children.remove(position);
        self.child_list_version += 1;
        Some(node)
    }

    /// Follow `path` down from this node.
    pub fn walk(&self, path: &Path) -> Option<&Node> {
        let mut node = self;
        for id in path.components() {
            node = node.child(id)?;
        }
        Some(node)
    }

    pub fn walk_mut(&mut self, path: &Path) -> Option<&mut Node> {
        let mut node = self;
        for id in path.components() {
            node = node.child_mut(id)?;
        }
        Some(node)
    }

    /// Pre-order enumeration of `base` and every descendant path below it.
    pub fn collect_subtree_paths(&self, base: &Path, out: &mut Vec<Path>) {
        out.push(base.clone());
        for (id, child) in self.children() {
            child.collect_subtree_paths(&base.child(id.clone()), out);
        }
    }

    /// Projection returned by the matcher and in command replies.
    pub fn props(&self, include_child_names: bool) -> NodeProps {
        NodeProps {
            payload_version: Some(self.payload_version),
            child_list_version: Some(self.child_list_version),
            child_list_count: Some(self.child_count()),
            data: self.payload.clone(),
            child_names: include_child_names.then(|| self.child_names()),
        }
    }
}

/// The subset of node fields exposed in result maps. All fields are optional
/// so the empty projection (a node that did not previously exist) is
/// representable; `data` is present iff the node carries a data payload and
/// `child_names` iff the caller asked for them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeProps {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub payload_version: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub child_list_version: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub child_list_count: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub data: Option<Vec<u8>>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub child_names: Option<Vec<NodeId>>,
}

impl NodeProps {
    /// The projection of a node that did not exist before the command.
    pub fn absent() -> Self {
        NodeProps::default()
    }

    pub fn is_absent(&self) -> bool {
        *self == NodeProps::default()
    }
}
