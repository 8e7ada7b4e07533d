//! Per-reference staging of local resource descriptors.
//!
//! Descriptors produced while attaching local resources accumulate here
//! until a published top-level manifest seals them. The memory is
//! authoritative until then: it does not survive the process, and a failed
//! publish deliberately leaves it intact so the caller can retry without
//! re-uploading content.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::oci::Descriptor;

/// Thread-safe staging memory, keyed by component reference.
///
/// Concurrent writers for the same reference order by call completion;
/// callers that need a deterministic descriptor order must serialize their
/// own calls.
#[derive(Debug, Default, Clone)]
pub struct Staging {
    inner: Arc<RwLock<HashMap<String, Vec<Descriptor>>>>,
}

impl Staging {
    /// Create an empty staging memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor to the staged set of a reference.
    pub fn add(&self, reference: impl Into<String>, descriptor: Descriptor) {
        let mut map = self
            .inner
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        map.entry(reference.into()).or_default().push(descriptor);
    }

    /// A stable snapshot of the staged set of a reference.
    pub fn get(&self, reference: &str) -> Vec<Descriptor> {
        let map = self
            .inner
            .read()
            .unwrap_or_else(|poison| poison.into_inner());
        map.get(reference).cloned().unwrap_or_default()
    }

    /// Drop the staged set of a reference.
    pub fn delete(&self, reference: &str) {
        let mut map = self
            .inner
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        map.remove(reference);
    }
}
