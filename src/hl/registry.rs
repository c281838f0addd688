use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::internal_prelude::*;

/// Lifecycle of a dataset within one snapshot. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetState {
    Undeclared,
    Declared,
    Validated,
}

#[derive(Clone, Debug)]
struct Entry {
    shape: Shape,
    validated: bool,
}

/// Global shapes of the datasets of one snapshot, keyed by dataset name.
///
/// The registry can be shared between threads. A declaration is checked and inserted under
/// one write guard: of two threads declaring the same name, one inserts and the other either
/// matches or gets `ShapeConflict`.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `shape` for `name` on first call. Later calls with the same shape are
    /// no-ops; a different shape fails with `ShapeConflict`.
    pub fn declare<D: Dimension>(&self, name: &str, shape: D) -> Result<Shape> {
        let requested = shape.dims();
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(name) {
            if entry.shape[..] != requested[..] {
                return Err(Error::shape_conflict(name, &entry.shape, format!("{requested:?}")));
            }
            return Ok(entry.shape.clone());
        }
        let shape = Shape::from_vec(requested)?;
        debug!(dataset = name, shape = %shape, "declared dataset");
        entries.insert(name.to_owned(), Entry { shape: shape.clone(), validated: false });
        Ok(shape)
    }

    /// Returns the registered shape or fails with `UnknownDataset`.
    pub fn lookup(&self, name: &str) -> Result<Shape> {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.shape.clone())
            .ok_or_else(|| Error::UnknownDataset(name.to_owned()))
    }

    pub fn state(&self, name: &str) -> DatasetState {
        match self.entries.read().get(name) {
            None => DatasetState::Undeclared,
            Some(Entry { validated: false, .. }) => DatasetState::Declared,
            Some(Entry { validated: true, .. }) => DatasetState::Validated,
        }
    }

    /// Moves a declared dataset to `Validated`.
    pub fn mark_validated(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(name).ok_or_else(|| Error::UnknownDataset(name.to_owned()))?;
        entry.validated = true;
        Ok(())
    }

    /// Validates `placements` against the registered shape of `name` and, on success,
    /// marks the dataset as validated.
    pub fn validate(&self, name: &str, placements: &[Placement]) -> Result<()> {
        let shape = self.lookup(name)?;
        crate::hl::tiling::validate(&shape, placements)?;
        self.mark_validated(name)
    }

    /// Declared dataset names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
