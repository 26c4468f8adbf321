//! Per-ensemble cache of slice sets, keyed by slicer identity.
//!
//! An entry is valid only while its recorded version equals the owning
//! ensemble's current version. The ensemble bumps its version on every
//! coordinate mutation, so a stale set can never be returned even if a
//! caller forgets to clear the cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::slicing::{SliceSet, SlicerId};

#[derive(Debug, Clone)]
struct CachedSliceSet {
    version: u64,
    slice_set: Arc<SliceSet>,
}

#[derive(Debug, Clone, Default)]
pub struct SliceSetCache {
    entries: HashMap<SlicerId, CachedSliceSet>,
}

impl SliceSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached set for `slicer`, if it was recorded at `version`.
    pub fn get(&self, slicer: SlicerId, version: u64) -> Option<Arc<SliceSet>> {
        self.entries
            .get(&slicer)
            .filter(|entry| entry.version == version)
            .map(|entry| Arc::clone(&entry.slice_set))
    }

    pub fn insert(&mut self, slicer: SlicerId, version: u64, slice_set: Arc<SliceSet>) {
        self.entries.insert(slicer, CachedSliceSet { version, slice_set });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
