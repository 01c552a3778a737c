//! Per-entity mutual exclusion.
//!
//! Locks are created on first use and dropped from the table as soon as
//! nobody holds or waits on them, so the table never outlives the entities
//! currently being worked on. [`EntityLocks::release_entity`] is the explicit
//! hook called on disconnect.

use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rustc_hash::FxHashMap as HashMap;

use crate::model::EntityId;

type EntityMutex = Arc<Mutex<()>>;

/// Table of per-entity locks.
#[derive(Debug, Default)]
pub struct EntityLocks {
	table: Mutex<HashMap<EntityId, EntityMutex>>,
}

/// Exclusive scope over one entity. Released on drop.
#[must_use = "the entity is only locked while the guard is alive"]
pub struct EntityGuard<'a> {
	locks: &'a EntityLocks,
	entity: EntityId,
	guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl EntityLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Blocks until `entity` is exclusively held by the caller.
	pub fn acquire(&self, entity: EntityId) -> EntityGuard<'_> {
		let lock = Arc::clone(self.table.lock().entry(entity).or_default());
		let guard = lock.lock_arc();
		EntityGuard {
			locks: self,
			entity,
			guard: Some(guard),
		}
	}

	/// Drops the lock for a disconnected entity if nobody is using it.
	///
	/// Returns true when no lock for `entity` remains in the table.
	pub fn release_entity(&self, entity: EntityId) -> bool {
		let mut table = self.table.lock();
		match table.get(&entity) {
			Some(lock) if Arc::strong_count(lock) == 1 => {
				table.remove(&entity);
				true
			}
			Some(_) => false,
			None => true,
		}
	}

	/// Number of locks currently in the table.
	pub fn len(&self) -> usize {
		self.table.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl EntityGuard<'_> {
	pub fn entity(&self) -> EntityId {
		self.entity
	}
}

impl Drop for EntityGuard<'_> {
	fn drop(&mut self) {
		drop(self.guard.take());
		self.locks.release_entity(self.entity);
	}
}

impl std::fmt::Debug for EntityGuard<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EntityGuard").field("entity", &self.entity).finish()
	}
}
