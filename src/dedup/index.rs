use crate::dedup::{IdentityKey, KeySpec, Keyed};
use std::collections::HashSet;

/// The set of identity keys already held by a store
///
/// The index only ever grows: keys are inserted on acceptance and never
/// removed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct KeyIndex {
    spec: KeySpec,
    keys: HashSet<IdentityKey>,
}

impl KeyIndex {
    /// Creates an empty index
    pub fn new(spec: KeySpec) -> Self {
        Self {
            spec,
            keys: HashSet::new(),
        }
    }

    /// Builds an index from rows that were already persisted
    pub fn seed<R: Keyed>(rows: &[R], spec: KeySpec) -> Self {
        let keys = rows.iter().map(|row| spec.key_for(row)).collect();
        Self { spec, keys }
    }

    /// Records a row's key if it is new
    ///
    /// Returns `true` when the row should be appended, `false` when its key
    /// was already present.
    pub fn accept<R: Keyed + ?Sized>(&mut self, row: &R) -> bool {
        self.keys.insert(self.spec.key_for(row))
    }

    /// Checks whether a row's key is already indexed
    pub fn contains<R: Keyed + ?Sized>(&self, row: &R) -> bool {
        self.keys.contains(&self.spec.key_for(row))
    }

    pub fn spec(&self) -> &KeySpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
