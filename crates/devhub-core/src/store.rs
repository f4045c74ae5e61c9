//! In-memory keyed collection of entities with change notification.
//!
//! The store is the only mutable state shared between the reconciler and the
//! view binding. All mutations go through the methods below; each successful
//! mutation publishes a [`StoreChange`] carrying a full snapshot so that
//! subscribers can re-render without polling.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use crate::entity::{Entity, EntityId, Fields};
use crate::error::{DevhubError, Result};

const CHANGE_BUS_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// StoreChange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    Inserted { id: EntityId },
    Replaced { old_id: EntityId, new_id: EntityId },
    Updated { id: EntityId },
    Removed { id: EntityId },
    Reset,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreChange {
    pub collection: String,
    /// Per-store sequence number, strictly increasing.
    pub seq: u64,
    pub event: StoreEvent,
    pub snapshot: Vec<Entity>,
}

/// Sender half of a change bus. Several stores may publish onto one bus.
pub type ChangeBus = broadcast::Sender<StoreChange>;

pub fn change_bus() -> ChangeBus {
    broadcast::channel(CHANGE_BUS_CAPACITY).0
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    entities: Vec<Entity>,
    current: Option<EntityId>,
    seq: u64,
}

impl Inner {
    fn position(&self, id: &EntityId) -> Option<usize> {
        self.entities.iter().position(|e| &e.id == id)
    }
}

/// Cheaply cloneable handle to one collection (e.g. "projects for the
/// current user"). Clones share the same underlying list.
#[derive(Debug, Clone)]
pub struct EntityStore {
    collection: Arc<str>,
    inner: Arc<RwLock<Inner>>,
    bus: ChangeBus,
}

impl EntityStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self::with_bus(collection, change_bus())
    }

    pub fn with_bus(collection: impl Into<String>, bus: ChangeBus) -> Self {
        let collection: String = collection.into();
        Self {
            collection: Arc::from(collection),
            inner: Arc::new(RwLock::new(Inner::default())),
            bus,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.bus.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish while the write guard is held so sequence numbers and
    /// snapshots reach subscribers in mutation order.
    fn publish(&self, inner: &mut Inner, event: StoreEvent) {
        inner.seq += 1;
        let change = StoreChange {
            collection: self.collection.to_string(),
            seq: inner.seq,
            event,
            snapshot: inner.entities.clone(),
        };
        // No subscribers is fine.
        let _ = self.bus.send(change);
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Append an entity. Fails without mutating if the id is already present.
    pub fn insert(&self, entity: Entity) -> Result<()> {
        let mut inner = self.write();
        if inner.position(&entity.id).is_some() {
            return Err(DevhubError::DuplicateId(entity.id.to_string()));
        }
        let id = entity.id.clone();
        inner.entities.push(entity);
        self.publish(&mut inner, StoreEvent::Inserted { id });
        Ok(())
    }

    /// Swap the entity at `old_id` for `new_entity`, preserving position.
    ///
    /// If `new_entity.id` is already held elsewhere (a refresh raced ahead of
    /// the commit), that row is overwritten in place and the entity at
    /// `old_id` is dropped, so ids stay unique.
    pub fn replace(&self, old_id: &EntityId, new_entity: Entity) -> Result<()> {
        let mut inner = self.write();
        let Some(pos) = inner.position(old_id) else {
            return Err(DevhubError::ReplaceTargetMissing(old_id.to_string()));
        };
        let new_id = new_entity.id.clone();
        match inner.position(&new_id) {
            Some(existing) if existing != pos => {
                inner.entities[existing] = new_entity;
                inner.entities.remove(pos);
            }
            _ => inner.entities[pos] = new_entity,
        }
        if inner.current.as_ref() == Some(old_id) {
            inner.current = Some(new_id.clone());
        }
        self.publish(
            &mut inner,
            StoreEvent::Replaced {
                old_id: old_id.clone(),
                new_id,
            },
        );
        Ok(())
    }

    /// Delete by id. Returns the removed entity; `None` if it was absent.
    pub fn remove(&self, id: &EntityId) -> Option<Entity> {
        let mut inner = self.write();
        let pos = inner.position(id)?;
        let removed = inner.entities.remove(pos);
        if inner.current.as_ref() == Some(id) {
            inner.current = None;
        }
        self.publish(&mut inner, StoreEvent::Removed { id: id.clone() });
        Some(removed)
    }

    /// Merge `patch` into the entity at `id`. Returns the updated entity;
    /// `None` (and no change event) if absent.
    pub fn update(&self, id: &EntityId, patch: &Fields) -> Option<Entity> {
        let mut inner = self.write();
        let pos = inner.position(id)?;
        inner.entities[pos].merge(patch);
        let updated = inner.entities[pos].clone();
        self.publish(&mut inner, StoreEvent::Updated { id: id.clone() });
        Some(updated)
    }

    /// Replace the whole collection with rows fetched from the remote store.
    ///
    /// Placeholders of creates still in flight are kept after the fetched
    /// rows. Publishes only when the resulting list differs; returns whether
    /// it did.
    pub fn set_all(&self, entities: Vec<Entity>) -> bool {
        let mut inner = self.write();

        let mut seen = HashSet::new();
        let mut next: Vec<Entity> = Vec::with_capacity(entities.len());
        for e in entities {
            if seen.insert(e.id.clone()) {
                next.push(e);
            }
        }
        for e in inner.entities.iter().filter(|e| e.is_placeholder) {
            if seen.insert(e.id.clone()) {
                next.push(e.clone());
            }
        }

        if next == inner.entities {
            return false;
        }
        inner.entities = next;
        if let Some(current) = inner.current.clone() {
            if inner.position(&current).is_none() {
                inner.current = None;
            }
        }
        self.publish(&mut inner, StoreEvent::Reset);
        true
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Mark `id` as the current entity. Returns false if it is not held.
    pub fn select(&self, id: &EntityId) -> bool {
        let mut inner = self.write();
        if inner.position(id).is_none() {
            return false;
        }
        inner.current = Some(id.clone());
        true
    }

    pub fn clear_selection(&self) {
        self.write().current = None;
    }

    pub fn current(&self) -> Option<Entity> {
        let inner = self.read();
        let id = inner.current.as_ref()?;
        inner.entities.iter().find(|e| &e.id == id).cloned()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Snapshot of the current ordered list. Does not track later mutations.
    pub fn list(&self) -> Vec<Entity> {
        self.read().entities.clone()
    }

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.read().entities.iter().find(|e| &e.id == id).cloned()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.read().position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
