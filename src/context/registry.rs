//! Registry of live contexts
//!
//! A [`ContextRegistry`] is shared between whatever opens contexts and the
//! contexts themselves. A context registers on open and removes itself when
//! it is closed or dropped, so [`ContextRegistry::count`] always answers how
//! many contexts are alive.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Information about a live context
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub id: Uuid,

    /// Database file path, or `:memory:`
    pub location: String,

    /// Number of entity sets the context declared
    pub set_count: usize,

    pub opened_at: Instant,
}

impl ContextEntry {
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// Tracks every open context by id
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<Uuid, ContextEntry>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, entry: ContextEntry) {
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.id, entry);
    }

    /// Remove a context. Returns `false` if it was not registered.
    pub(crate) fn unregister(&self, id: &Uuid) -> bool {
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn get(&self, id: &Uuid) -> Option<ContextEntry> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of live contexts
    pub fn count(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Ids of all live contexts
    pub fn ids(&self) -> Vec<Uuid> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}
