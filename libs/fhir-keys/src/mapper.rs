//! Transaction-scoped identifier remapping.

use std::collections::HashMap;

use crate::{key::Key, Error, Result};

/// Append-only table from an old identifier string to its newly assigned
/// [`Key`].
///
/// One mapper is shared across all entries of a bundle, so two entries
/// referencing the same temporary id resolve to the same generated key.
/// Remapping an id to an incompatible key is rejected.
#[derive(Debug, Default, Clone)]
pub struct Mapper {
    map: HashMap<String, Key>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, old_id: &str) -> Option<&Key> {
        self.map.get(old_id)
    }

    /// Record `old_id -> key`. Re-recording an equal key is a no-op;
    /// recording a different key for a known id is a conflict.
    pub fn remap(&mut self, old_id: impl Into<String>, key: Key) -> Result<()> {
        let old_id = old_id.into();
        match self.map.get(&old_id) {
            Some(existing) if *existing != key => Err(Error::MappingConflict {
                id: old_id,
                existing: existing.to_string(),
                incoming: key.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.map.insert(old_id, key);
                Ok(())
            }
        }
    }

    /// Look up `old_id`, following chained remaps to a fixed point: a
    /// resolved key's own canonical string may have been remapped by a later
    /// internalization in the same bundle.
    pub fn resolve(&self, old_id: &str) -> Option<Key> {
        let mut current = self.map.get(old_id)?;
        // The chain cannot be longer than the table itself; anything past
        // that is a cycle and we stop at the last distinct key.
        for _ in 0..self.map.len() {
            match self.map.get(&current.relative_path()) {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        Some(current.clone())
    }

    /// Pure two-argument merge. Overlapping ids must agree on their value;
    /// the first disagreement is reported as a conflict.
    pub fn merge(a: Mapper, b: Mapper) -> Result<Mapper> {
        let mut merged = a;
        for (id, key) in b.map {
            merged.remap(id, key)?;
        }
        Ok(merged)
    }
}
