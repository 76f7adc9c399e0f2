//! Lifecycle hooks for entity sets
//!
//! Each set keeps one ordered list of callbacks per [`EntityEvent`]. A single
//! [`EntityEventArgs`] is created per operation and handed to every callback
//! of that operation, before and after hooks alike. Before-hooks may set
//! `cancel`; the remaining before-hooks are then skipped and the operation
//! returns without touching the store.

use std::sync::{Arc, PoisonError, RwLock};

use super::EntitySet;
use crate::entity::Entity;

/// The six hook points around single-entity mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl EntityEvent {
    pub const ALL: [EntityEvent; 6] = [
        EntityEvent::BeforeInsert,
        EntityEvent::AfterInsert,
        EntityEvent::BeforeUpdate,
        EntityEvent::AfterUpdate,
        EntityEvent::BeforeDelete,
        EntityEvent::AfterDelete,
    ];

    /// Whether hooks for this event can cancel the operation.
    pub fn is_before(self) -> bool {
        matches!(
            self,
            EntityEvent::BeforeInsert | EntityEvent::BeforeUpdate | EntityEvent::BeforeDelete
        )
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// State shared by the hooks of one operation.
pub struct EntityEventArgs<'a, T: Entity> {
    /// The entity being inserted, updated or deleted. Changes made by a
    /// before-hook are what gets written.
    pub entity: &'a mut T,

    /// Set to `true` in a before-hook to skip the operation.
    pub cancel: bool,

    set: &'a EntitySet<T>,
}

impl<'a, T: Entity> EntityEventArgs<'a, T> {
    pub(crate) fn new(entity: &'a mut T, set: &'a EntitySet<T>) -> Self {
        Self {
            entity,
            cancel: false,
            set,
        }
    }

    /// The set that raised the event.
    pub fn set(&self) -> &'a EntitySet<T> {
        self.set
    }
}

/// A registered lifecycle callback.
pub type Hook<T> = Arc<dyn for<'a> Fn(&mut EntityEventArgs<'a, T>) + Send + Sync>;

pub(crate) struct Hooks<T: Entity> {
    lists: RwLock<[Vec<Hook<T>>; 6]>,
}

impl<T: Entity> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            lists: RwLock::new(Default::default()),
        }
    }
}

impl<T: Entity> Hooks<T> {
    pub(crate) fn add(&self, event: EntityEvent, hook: Hook<T>) {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)[event.slot()]
        .push(hook);
    }

    pub(crate) fn count(&self, event: EntityEvent) -> usize {
        self.lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)[event.slot()]
        .len()
    }

    pub(crate) fn clear(&self) {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        for list in lists.iter_mut() {
            list.clear();
        }
    }

    // Hooks may register further hooks or call back into the set, so the
    // list is copied out before any of them runs.
    fn snapshot(&self, event: EntityEvent) -> Vec<Hook<T>> {
        self.lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)[event.slot()]
        .clone()
    }

    /// Run the hooks for `event` in registration order.
    ///
    /// Returns `true` if the operation was cancelled.
    pub(crate) fn fire(&self, event: EntityEvent, args: &mut EntityEventArgs<'_, T>) -> bool {
        for hook in self.snapshot(event) {
            hook(&mut *args);
            if event.is_before() && args.cancel {
                return true;
            }
        }
        event.is_before() && args.cancel
    }
}
