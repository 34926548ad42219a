use std::borrow::Cow;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a single tree node.
///
/// Either a symbolic atom or an opaque binary blob. Two ids are equal iff
/// they are the same kind with the same content. The derived ordering (atoms
/// before binaries, then content) is the deterministic processing order used
/// throughout the crate. The root node has no identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeId {
    Atom(String),
    Binary(Vec<u8>),
}

impl NodeId {
    pub fn atom(name: impl Into<String>) -> Self {
        NodeId::Atom(name.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        NodeId::Binary(bytes.into())
    }

    /// Stringified form used by the regex predicates. Binary ids decode
    /// lossily as UTF-8.
    pub fn display_string(&self) -> Cow<'_, str> {
        match self {
            NodeId::Atom(name) => Cow::Borrowed(name),
            NodeId::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        NodeId::Atom(name.to_owned())
    }
}
