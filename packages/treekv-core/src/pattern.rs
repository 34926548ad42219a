use regex::Regex;

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::path::{Path, PathComponent};
use crate::tree::Node;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Regex-or-wildcard operand for the name and path predicates. The regex is
/// carried as its source string so conditions stay serializable; compilation
/// happens at evaluation sites.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NameMatch {
    Any,
    Regex(String),
}

impl NameMatch {
    pub(crate) fn matches(&self, subject: &str) -> Result<bool> {
        match self {
            NameMatch::Any => Ok(true),
            NameMatch::Regex(source) => {
                let regex = Regex::new(source).map_err(|err| {
                    Error::InvalidPattern(format!("cannot compile regex {source:?}: {err}"))
                })?;
                Ok(regex.is_match(subject))
            }
        }
    }
}

/// Operand for `DataMatches`: any data payload, or exact payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PayloadMatch {
    Any,
    Exact(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Comparison operand for the counter predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VersionCmp {
    pub op: CmpOp,
    pub value: u64,
}

impl VersionCmp {
    pub fn new(op: CmpOp, value: u64) -> Self {
        VersionCmp { op, value }
    }

    pub fn eval(&self, observed: u64) -> bool {
        match self.op {
            CmpOp::Eq => observed == self.value,
            CmpOp::Ne => observed != self.value,
            CmpOp::Lt => observed < self.value,
            CmpOp::Le => observed <= self.value,
            CmpOp::Gt => observed > self.value,
            CmpOp::Ge => observed >= self.value,
        }
    }
}

/// Structural predicate over a `(component id, node)` pair. Evaluation is an
/// exhaustive match; there is no dynamic dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Condition {
    NameIs(NodeId),
    NameMatches(NameMatch),
    DataMatches(PayloadMatch),
    ChildListCount(VersionCmp),
    ChildListVersion(VersionCmp),
    PayloadVersion(VersionCmp),
    PathMatches(NameMatch),
    All(Vec<Condition>),
    AnyOf(Vec<Condition>),
    NodeExists(bool),
}

impl Condition {
    /// Evaluate against an optional id (the root has none) and an optional
    /// node (keep-while entries evaluate against paths that may be gone).
    ///
    /// An absent node fails everything except `NodeExists(false)`, recursively
    /// through the boolean combinators. A missing id fails the name predicates
    /// except the unconditional `NameMatches(Any)`.
    pub fn eval(&self, id: Option<&NodeId>, node: Option<&Node>) -> Result<bool> {
        match self {
            Condition::NodeExists(expected) => Ok(node.is_some() == *expected),
            Condition::All(conditions) => {
                for condition in conditions {
                    if !condition.eval(id, node)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::AnyOf(conditions) => {
                for condition in conditions {
                    if condition.eval(id, node)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::NameIs(expected) => Ok(node.is_some() && id == Some(expected)),
            Condition::NameMatches(name_match) => {
                if node.is_none() {
                    return Ok(false);
                }
                match (name_match, id) {
                    (NameMatch::Any, _) => Ok(true),
                    (_, None) => Ok(false),
                    (_, Some(id)) => name_match.matches(&id.display_string()),
                }
            }
            // The segment form of `PathMatches` only exists in head position
            // inside the matcher; nested occurrences degenerate to a name
            // match on the current component.
            Condition::PathMatches(name_match) => {
                Condition::NameMatches(name_match.clone()).eval(id, node)
            }
            Condition::DataMatches(payload_match) => {
                let Some(data) = node.and_then(Node::payload) else {
                    return Ok(false);
                };
                Ok(match payload_match {
                    PayloadMatch::Any => true,
                    PayloadMatch::Exact(expected) => data == expected.as_slice(),
                })
            }
            Condition::ChildListCount(cmp) => {
                Ok(node.is_some_and(|node| cmp.eval(node.child_count())))
            }
            Condition::ChildListVersion(cmp) => {
                Ok(node.is_some_and(|node| cmp.eval(node.child_list_version())))
            }
            Condition::PayloadVersion(cmp) => {
                Ok(node.is_some_and(|node| cmp.eval(node.payload_version())))
            }
        }
    }
}

/// One step of a path pattern: a literal id, a relative anchor, or a
/// predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PatternComponent {
    Id(NodeId),
    This,
    Parent,
    Root,
    Cond(Condition),
}

/// A path pattern. Unlike a `Path` it may contain predicates, and a single
/// pattern can address many nodes at once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pattern(Vec<PatternComponent>);

impl Pattern {
    pub fn new(components: Vec<PatternComponent>) -> Self {
        Pattern(components)
    }

    /// Pattern of literal ids only.
    pub fn ids(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Pattern(ids.into_iter().map(PatternComponent::Id).collect())
    }

    pub fn from_path(path: &Path) -> Self {
        Pattern::ids(path.components().iter().cloned())
    }

    pub fn components(&self) -> &[PatternComponent] {
        &self.0
    }

    /// The normalized plain path, if the pattern carries no predicates.
    /// Predicate-bearing patterns are queries and never name a creatable
    /// location. `InvalidPath` if anchor resolution steps above the root.
    pub fn plain_path(&self) -> Result<Option<Path>> {
        let mut components = Vec::with_capacity(self.0.len());
        for component in &self.0 {
            match component {
                PatternComponent::Id(id) => components.push(PathComponent::Id(id.clone())),
                PatternComponent::This => components.push(PathComponent::This),
                PatternComponent::Parent => components.push(PathComponent::Parent),
                PatternComponent::Root => components.push(PathComponent::Root),
                PatternComponent::Cond(_) => return Ok(None),
            }
        }
        Path::resolve(&components, &Path::root()).map(Some)
    }
}

impl From<Vec<PatternComponent>> for Pattern {
    fn from(components: Vec<PatternComponent>) -> Self {
        Pattern(components)
    }
}
