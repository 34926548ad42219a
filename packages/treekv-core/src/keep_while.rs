use std::collections::{BTreeMap, BTreeSet};

use crate::path::Path;
use crate::pattern::Condition;

/// The keep-while relation: watcher path → (watched path → predicate).
///
/// A watcher exists only while every watched node exists and satisfies its
/// predicate. Both maps are ordered so cascade candidates come out in
/// ascending lexicographic watcher order, which the determinism contract
/// requires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeepWhileTable {
    entries: BTreeMap<Path, BTreeMap<Path, Condition>>,
}

impl KeepWhileTable {
    pub fn new() -> Self {
        KeepWhileTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register (or replace) the clause set of a watcher.
    pub fn insert(&mut self, watcher: Path, conditions: BTreeMap<Path, Condition>) {
        self.entries.insert(watcher, conditions);
    }

    pub fn conditions(&self, watcher: &Path) -> Option<&BTreeMap<Path, Condition>> {
        self.entries.get(watcher)
    }

    /// Drop the clause set keyed by `watcher`, if any.
    pub fn remove_watcher(&mut self, watcher: &Path) -> bool {
        self.entries.remove(watcher).is_some()
    }

    /// Drop every clause set keyed by a deleted path.
    pub fn remove_deleted(&mut self, deleted: &BTreeSet<Path>) {
        self.entries.retain(|watcher, _| !deleted.contains(watcher));
    }

    /// Watchers with at least one watched path in the dirty set, in
    /// ascending lexicographic order.
    pub fn watchers_of(&self, dirty: &BTreeSet<Path>) -> Vec<Path> {
        self.entries
            .iter()
            .filter(|(_, conditions)| conditions.keys().any(|watched| dirty.contains(watched)))
            .map(|(watcher, _)| watcher.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &BTreeMap<Path, Condition>)> {
        self.entries.iter()
    }
}
