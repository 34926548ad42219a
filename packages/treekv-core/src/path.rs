use std::fmt;

use crate::error::{Error, Result};
use crate::ids::NodeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One step of an unresolved path: a literal id or a relative anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PathComponent {
    Id(NodeId),
    This,
    Parent,
    Root,
}

/// Absolute location of a node: the id sequence from the root (exclusive) to
/// the node (inclusive). The empty path is the root itself. Paths order
/// lexicographically over their id sequences, which is the processing order
/// for deletes and cascade candidates.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Path(Vec<NodeId>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn new(ids: Vec<NodeId>) -> Self {
        Path(ids)
    }

    pub fn components(&self) -> &[NodeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&NodeId> {
        self.0.last()
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, id: NodeId) -> Path {
        let mut ids = self.0.clone();
        ids.push(id);
        Path(ids)
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Resolve a component sequence against `base`, left to right: `This` is
    /// a no-op, `Parent` drops the last element, `Root` resets to the empty
    /// path, a literal appends. Stepping above the root is `InvalidPath`.
    pub fn resolve(components: &[PathComponent], base: &Path) -> Result<Path> {
        let mut current = base.0.clone();
        for component in components {
            match component {
                PathComponent::Id(id) => current.push(id.clone()),
                PathComponent::This => {}
                PathComponent::Parent => {
                    if current.pop().is_none() {
                        return Err(Error::InvalidPath(
                            "parent anchor resolves above the root".to_owned(),
                        ));
                    }
                }
                PathComponent::Root => current.clear(),
            }
        }
        Ok(Path(current))
    }

    /// "/"-joined stringification, used by `if_path_matches` regexes.
    pub fn display_string(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|id| id.display_string().into_owned()).collect();
        parts.join("/")
    }
}

impl From<Vec<NodeId>> for Path {
    fn from(ids: Vec<NodeId>) -> Self {
        Path(ids)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for id in &self.0 {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}
