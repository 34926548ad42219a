use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::path::Path;
use crate::pattern::{Condition, NameMatch, Pattern, PatternComponent};
use crate::tree::{Node, NodeProps};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ordered mapping from absolute path to projection. A `BTreeMap` makes the
/// result set and its iteration order deterministic, and hands `delete` its
/// ascending lexicographic processing order for free.
pub type ResultMap = BTreeMap<Path, NodeProps>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchOptions {
    #[cfg_attr(feature = "serde", serde(default))]
    pub include_child_names: bool,
    /// Fail the whole match unless the pattern resolves to exactly one node.
    #[cfg_attr(feature = "serde", serde(default))]
    pub expect_specific_node: bool,
    /// Resource cap: error the command instead of growing the result map
    /// past this many entries.
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_results: Option<usize>,
}

/// Evaluate `pattern` against the tree under `root`.
///
/// Anchors resolve in place during traversal; a `Parent` that would step
/// above the root fails that branch (the command layer rejects above-root
/// anchors in plain paths before they get here). Predicates enumerate
/// children in insertion order. A node is emitted at most once even when
/// several pattern expansions reach it.
pub fn find_matching(root: &Node, pattern: &Pattern, options: &MatchOptions) -> Result<ResultMap> {
    let mut out = ResultMap::new();
    step(root, root, &Path::root(), pattern.components(), options, &mut out)?;
    if options.expect_specific_node {
        if out.is_empty() {
            return Err(Error::NoMatchingNodes);
        }
        if out.len() > 1 {
            return Err(Error::ManyMatchingNodes);
        }
    }
    Ok(out)
}

fn step(
    root: &Node,
    node: &Node,
    current: &Path,
    rest: &[PatternComponent],
    options: &MatchOptions,
    out: &mut ResultMap,
) -> Result<()> {
    let Some((head, tail)) = rest.split_first() else {
        return emit(node, current, options, out);
    };
    match head {
        PatternComponent::Id(id) => match node.child(id) {
            Some(child) => step(root, child, &current.child(id.clone()), tail, options, out),
            None => Ok(()),
        },
        PatternComponent::This => step(root, node, current, tail, options, out),
        PatternComponent::Parent => {
            let Some(parent_path) = current.parent() else {
                return Ok(());
            };
            match root.walk(&parent_path) {
                Some(parent) => step(root, parent, &parent_path, tail, options, out),
                None => Ok(()),
            }
        }
        PatternComponent::Root => step(root, root, &Path::root(), tail, options, out),
        PatternComponent::Cond(Condition::PathMatches(name_match)) => {
            expand_star(root, node, current, current.len(), name_match, tail, options, out)
        }
        PatternComponent::Cond(condition) => {
            for (id, child) in node.children() {
                if condition.eval(Some(id), Some(child))? {
                    step(root, child, &current.child(id.clone()), tail, options, out)?;
                }
            }
            Ok(())
        }
    }
}

/// `PathMatches` in head position: consume one or more components. At every
/// consumed child the segment may end (the regex is applied to the joined
/// consumed components, then the tail continues from that child) or the star
/// stays in head position and descends.
fn expand_star(
    root: &Node,
    node: &Node,
    current: &Path,
    star_start: usize,
    name_match: &NameMatch,
    tail: &[PatternComponent],
    options: &MatchOptions,
    out: &mut ResultMap,
) -> Result<()> {
    for (id, child) in node.children() {
        let child_path = current.child(id.clone());
        let segment_ends = match name_match {
            NameMatch::Any => true,
            NameMatch::Regex(_) => {
                let segment = joined_segment(&child_path, star_start);
                name_match.matches(&segment)?
            }
        };
        if segment_ends {
            step(root, child, &child_path, tail, options, out)?;
        }
        expand_star(root, child, &child_path, star_start, name_match, tail, options, out)?;
    }
    Ok(())
}

fn joined_segment(path: &Path, star_start: usize) -> String {
    let parts: Vec<String> = path.components()[star_start..]
        .iter()
        .map(|id| id.display_string().into_owned())
        .collect();
    parts.join("/")
}

fn emit(node: &Node, current: &Path, options: &MatchOptions, out: &mut ResultMap) -> Result<()> {
    if out.contains_key(current) {
        return Ok(());
    }
    if let Some(max) = options.max_results {
        if out.len() >= max {
            return Err(Error::ResourceLimit(format!(
                "result map would exceed {max} entries"
            )));
        }
    }
    out.insert(current.clone(), node.props(options.include_child_names));
    Ok(())
}
