use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::commands::{Command, ErrorReply, KeepWhileClauses, Reply, TxnStep};
use crate::error::{Error, ErrorKind, Result};
use crate::keep_while::KeepWhileTable;
use crate::matcher::{find_matching, MatchOptions, ResultMap};
use crate::path::{Path, PathComponent};
use crate::pattern::{Condition, Pattern};
use crate::snapshot;
use crate::tree::{Node, NodeProps};

#[derive(Clone, Debug, Default)]
pub struct MachineConfig {
    /// Commands replayed on init, in order. Testing hook; the replication
    /// engine normally feeds commands through `apply` one at a time.
    pub seed_commands: Vec<Command>,
    /// Cap on result-map size; exceeding it fails the command with a
    /// `ResourceLimit` reply. Host configuration, not replicated state.
    pub max_results: Option<usize>,
}

/// The replicated tree state machine.
///
/// A plain value owned by the replication engine: no clocks, no randomness,
/// no I/O. `apply` is the only mutator and is invoked serially; two
/// instances fed the same command sequence produce byte-identical
/// snapshots. Read-only queries may run against a cloned instance for a
/// consistent point-in-time view.
#[derive(Clone, Debug, Default)]
pub struct TreeKv {
    root: Node,
    keep_while: KeepWhileTable,
    max_results: Option<usize>,
}

impl TreeKv {
    /// Empty state: just the root node.
    pub fn new() -> Self {
        TreeKv::default()
    }

    pub fn init(config: MachineConfig) -> Self {
        let mut machine = TreeKv::new();
        machine.max_results = config.max_results;
        for command in config.seed_commands {
            let _ = machine.apply(command);
        }
        machine
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn keep_while(&self) -> &KeepWhileTable {
        &self.keep_while
    }

    pub fn set_max_results(&mut self, cap: Option<usize>) {
        self.max_results = cap;
    }

    /// Apply one command and return its reply. Command failures are reply
    /// values; the state is left untouched by a failed command.
    pub fn apply(&mut self, command: Command) -> Reply {
        trace!(?command, "applying command");
        match command {
            Command::Put {
                pattern,
                payload,
                keep_while,
            } => reply_of(self.apply_put(&pattern, payload, keep_while)),
            Command::Delete { pattern } => reply_of(self.apply_delete(&pattern)),
            Command::Get { pattern, options } => reply_of(self.query(&pattern, &options)),
            Command::Transaction { steps } => self.apply_transaction(steps),
        }
    }

    /// Read-only pattern evaluation. Never mutates and never cascades.
    pub fn query(&self, pattern: &Pattern, options: &MatchOptions) -> Result<ResultMap> {
        let mut effective = options.clone();
        effective.max_results = match (options.max_results, self.max_results) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        find_matching(&self.root, pattern, &effective)
    }

    /// Serialize the full state (tree + keep-while table).
    pub fn snapshot(&self) -> Vec<u8> {
        snapshot::encode(self)
    }

    /// Rebuild a machine from `snapshot` output. Errors here are fatal to
    /// the instance; the replication engine decides whether to halt.
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        snapshot::decode(bytes)
    }

    pub(crate) fn parts(&self) -> (&Node, &KeepWhileTable) {
        (&self.root, &self.keep_while)
    }

    pub(crate) fn from_parts(root: Node, keep_while: KeepWhileTable) -> Self {
        TreeKv {
            root,
            keep_while,
            max_results: None,
        }
    }

    fn apply_put(
        &mut self,
        pattern: &Pattern,
        payload: Option<Vec<u8>>,
        keep_while: Option<KeepWhileClauses>,
    ) -> Result<ResultMap> {
        let plain = pattern.plain_path()?;
        let matched = self.query(pattern, &MatchOptions::default())?;

        // A predicate-bearing pattern is a query and must not fabricate
        // nodes: creation only happens for a plain path with no match.
        let targets: Vec<Path> = if matched.is_empty() {
            plain.into_iter().collect()
        } else {
            matched.keys().cloned().collect()
        };

        // Resolve keep-while clauses up front so a bad clause fails the
        // command before any edit.
        let mut resolved: Vec<(Path, BTreeMap<Path, Condition>)> = Vec::new();
        if let Some(clauses) = &keep_while {
            for target in &targets {
                let mut conditions = BTreeMap::new();
                for (raw, condition) in clauses {
                    conditions.insert(resolve_watched(raw, target)?, condition.clone());
                }
                resolved.push((target.clone(), conditions));
            }
        }

        let mut dirty: BTreeSet<Path> = BTreeSet::new();
        let mut reply = ResultMap::new();
        if matched.is_empty() {
            for target in &targets {
                self.create_path(target, payload.clone(), &mut dirty)?;
                debug!(path = %target, "created node");
                reply.insert(target.clone(), NodeProps::absent());
            }
        } else {
            for (path, prior) in matched {
                if let Some(node) = self.root.walk_mut(&path) {
                    node.set_payload(payload.clone());
                    dirty.insert(path.clone());
                }
                reply.insert(path, prior);
            }
        }

        let mut bootstrap: BTreeSet<Path> = BTreeSet::new();
        for (watcher, conditions) in resolved {
            bootstrap.insert(watcher.clone());
            self.keep_while.insert(watcher, conditions);
        }
        self.cascade(dirty, &bootstrap);
        Ok(reply)
    }

    fn apply_delete(&mut self, pattern: &Pattern) -> Result<ResultMap> {
        let matched = self.query(pattern, &MatchOptions::default())?;
        let mut dirty = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        // Ascending lexicographic order; a descendant of an already removed
        // match is simply gone by the time it comes up.
        for path in matched.keys() {
            self.delete_at(path, &mut dirty, &mut deleted);
        }
        self.keep_while.remove_deleted(&deleted);
        dirty.extend(deleted);
        self.cascade(dirty, &BTreeSet::new());
        Ok(matched)
    }

    fn apply_transaction(&mut self, steps: Vec<TxnStep>) -> Reply {
        let saved = self.clone();
        let mut results = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            let result = match step {
                TxnStep::Put {
                    pattern,
                    payload,
                    keep_while,
                } => self.apply_put(&pattern, payload, keep_while),
                TxnStep::Delete { pattern } => self.apply_delete(&pattern),
                TxnStep::Get { pattern, options } => self.query(&pattern, &options),
                TxnStep::AssertMatch { pattern, options } => {
                    self.query(&pattern, &options).and_then(|map| {
                        if map.is_empty() {
                            Err(Error::NoMatchingNodes)
                        } else {
                            Ok(map)
                        }
                    })
                }
            };
            match result {
                Ok(map) => results.push(map),
                Err(err) => {
                    *self = saved;
                    debug!(step = index, "transaction aborted, state rolled back");
                    return Reply::Error(ErrorReply {
                        kind: ErrorKind::TxnAborted,
                        detail: format!("step {index}: {err}"),
                    });
                }
            }
        }
        Reply::Steps(results)
    }

    /// Materialize a plain path: walk the existing prefix, build the missing
    /// chain bottom-up and attach it in one edit. Only the deepest
    /// pre-existing node sees its child set change; freshly built nodes keep
    /// their counters at the initial value.
    fn create_path(
        &mut self,
        path: &Path,
        payload: Option<Vec<u8>>,
        dirty: &mut BTreeSet<Path>,
    ) -> Result<()> {
        let ids = path.components();
        if ids.is_empty() {
            return Err(Error::InvalidPath("cannot create the root".to_owned()));
        }
        let mut anchor_len = 0;
        {
            let mut node = &self.root;
            for id in ids {
                match node.child(id) {
                    Some(child) => {
                        node = child;
                        anchor_len += 1;
                    }
                    None => break,
                }
            }
        }
        if anchor_len == ids.len() {
            return Err(Error::InvalidPath(format!("{path} already exists")));
        }

        let mut node = Node::with_payload(payload);
        for id in ids[anchor_len + 1..].iter().rev() {
            let mut parent = Node::new();
            parent.adopt_child(id.clone(), node);
            node = parent;
        }

        let anchor_path = Path::new(ids[..anchor_len].to_vec());
        let Some(anchor) = self.root.walk_mut(&anchor_path) else {
            return Err(Error::InvalidPath(format!("missing anchor for {path}")));
        };
        anchor.insert_child(ids[anchor_len].clone(), node);

        dirty.insert(anchor_path);
        for depth in anchor_len + 1..=ids.len() {
            dirty.insert(Path::new(ids[..depth].to_vec()));
        }
        Ok(())
    }

    /// Remove the node at `path` from its parent. A match on the root path
    /// clears the root's children in insertion order; the root object itself
    /// always survives. Every removed path (the whole subtree) lands in
    /// `deleted`; parents whose child set changed land in `dirty`.
    fn delete_at(&mut self, path: &Path, dirty: &mut BTreeSet<Path>, deleted: &mut BTreeSet<Path>) {
        if path.is_root() {
            for id in self.root.child_names() {
                if let Some(removed) = self.root.remove_child(&id) {
                    let mut paths = Vec::new();
                    removed.collect_subtree_paths(&Path::root().child(id), &mut paths);
                    deleted.extend(paths);
                }
            }
            dirty.insert(Path::root());
            return;
        }
        let Some(parent_path) = path.parent() else {
            return;
        };
        let Some(last) = path.last().cloned() else {
            return;
        };
        if let Some(parent) = self.root.walk_mut(&parent_path) {
            if let Some(removed) = parent.remove_child(&last) {
                let mut paths = Vec::new();
                removed.collect_subtree_paths(path, &mut paths);
                deleted.extend(paths);
                dirty.insert(parent_path);
                debug!(path = %path, "deleted node");
            }
        }
    }

    /// Evaluate the keep-while graph to fixpoint. Candidates are watchers
    /// with a watched path in the dirty set, processed in ascending
    /// lexicographic order; a failing watcher is deleted exactly like a
    /// `delete` of its path and its dirtied paths feed the next pass.
    /// Evaluation errors count as failure: there is no error channel here.
    fn cascade(&mut self, mut dirty: BTreeSet<Path>, bootstrap: &BTreeSet<Path>) {
        let mut first_pass = true;
        // Each deleting pass shrinks the table, so the pass count is bounded
        // by the table size; the extra pass detects the fixpoint.
        let max_passes = self.keep_while.len() + 1;
        for _ in 0..max_passes {
            let candidates = self.keep_while.watchers_of(&dirty);
            if candidates.is_empty() {
                break;
            }
            let mut removed_any = false;
            let mut next_dirty: BTreeSet<Path> = BTreeSet::new();
            for watcher in candidates {
                let Some(conditions) = self.keep_while.conditions(&watcher) else {
                    continue;
                };
                let mut failed = false;
                for (watched, condition) in conditions {
                    if first_pass && watched == &watcher && bootstrap.contains(&watcher) {
                        continue;
                    }
                    let node = self.root.walk(watched);
                    if !condition.eval(watched.last(), node).unwrap_or(false) {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    debug!(watcher = %watcher, "keep-while no longer satisfied, cascading delete");
                    let mut deleted = BTreeSet::new();
                    self.delete_at(&watcher, &mut next_dirty, &mut deleted);
                    next_dirty.extend(deleted.iter().cloned());
                    self.keep_while.remove_deleted(&deleted);
                    self.keep_while.remove_watcher(&watcher);
                    removed_any = true;
                }
            }
            if !removed_any {
                break;
            }
            dirty.extend(next_dirty);
            first_pass = false;
        }
    }
}

fn reply_of(result: Result<ResultMap>) -> Reply {
    match result {
        Ok(map) => Reply::Ok(map),
        Err(err) => Reply::Error(ErrorReply::from(&err)),
    }
}

/// Watched paths starting with a relative anchor resolve against the put
/// target; everything else resolves against the root.
fn resolve_watched(raw: &[PathComponent], target: &Path) -> Result<Path> {
    let base = match raw.first() {
        Some(PathComponent::This | PathComponent::Parent) => target.clone(),
        _ => Path::root(),
    };
    Path::resolve(raw, &base)
}
