//! Shared per-entity state: cached records, live sessions and applied grants.
//!
//! Every map here is only mutated while the caller holds the entity's lock
//! from [`EntityStateStore::lock`]. The inner mutexes are held for single map
//! operations and never nested.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rankforge_worker::GenerationClock;
use rustc_hash::FxHashMap as HashMap;

use crate::host::{BundleId, EntityHandle};
use crate::locks::{EntityGuard, EntityLocks};
use crate::model::{EntityId, PlayerRankRecord};
use crate::permission::EffectivePermissions;

/// Where a connected entity is in its rank lifecycle.
///
/// Entities without a session are implicitly unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
	/// Waiting for the storage fetch started by a join.
	Loading,
	/// A rank has been resolved and pushed to the entity.
	Resolved,
	/// The entity's rank was removed and the default is being reassigned.
	Removed,
}

/// One connection of one entity.
#[derive(Clone)]
pub struct Session {
	pub handle: EntityHandle,
	pub generation: u64,
	pub phase: SessionPhase,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("entity", &self.handle.id())
			.field("generation", &self.generation)
			.field("phase", &self.phase)
			.finish()
	}
}

/// The grant bundle currently attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedGrants {
	pub bundle: BundleId,
	pub rank: String,
	pub effective: EffectivePermissions,
	/// Whether reconcile already re-ran the apply for this bundle.
	pub retried: bool,
	/// Rank whose bundle the host refused. The grants above stay in force.
	pub pending: Option<String>,
	/// The display label push failed and is owed one retry.
	pub label_pending: bool,
}

impl AppliedGrants {
	pub fn new(bundle: BundleId, rank: &str, effective: EffectivePermissions) -> Self {
		Self {
			bundle,
			rank: rank.to_string(),
			effective,
			retried: false,
			pending: None,
			label_pending: false,
		}
	}
}

/// Everything the engine knows about entities, with the locks guarding it.
#[derive(Debug, Default)]
pub struct EntityStateStore {
	locks: EntityLocks,
	generations: GenerationClock,
	records: Mutex<HashMap<EntityId, PlayerRankRecord>>,
	sessions: Mutex<HashMap<EntityId, Session>>,
	applied: Mutex<HashMap<EntityId, AppliedGrants>>,
}

impl EntityStateStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Enters the critical section for `entity`.
	pub fn lock(&self, entity: EntityId) -> EntityGuard<'_> {
		self.locks.acquire(entity)
	}

	pub fn locks(&self) -> &EntityLocks {
		&self.locks
	}

	/// Starts a new session for `handle`, superseding any previous one.
	///
	/// Returns the session generation a pending load must still match.
	pub fn on_join(&self, _guard: &EntityGuard<'_>, handle: EntityHandle) -> u64 {
		let generation = self.generations.next();
		let entity = handle.id();
		let previous = self.sessions.lock().insert(
			entity,
			Session {
				handle,
				generation,
				phase: SessionPhase::Loading,
			},
		);
		if let Some(previous) = previous {
			tracing::debug!(entity = %entity, superseded = previous.generation, generation, "state.session_superseded");
		}
		generation
	}

	/// Ends the session and evicts everything cached for `entity`.
	///
	/// Returns the ended session and the grants that were attached.
	pub fn on_quit(&self, _guard: &EntityGuard<'_>, entity: EntityId) -> (Option<Session>, Option<AppliedGrants>) {
		self.records.lock().remove(&entity);
		let applied = self.applied.lock().remove(&entity);
		let session = self.sessions.lock().remove(&entity);
		(session, applied)
	}

	/// Whether `generation` is still the live session of `entity`.
	pub fn is_current(&self, entity: EntityId, generation: u64) -> bool {
		self.sessions.lock().get(&entity).is_some_and(|s| s.generation == generation)
	}

	pub fn session(&self, entity: EntityId) -> Option<Session> {
		self.sessions.lock().get(&entity).cloned()
	}

	pub fn handle(&self, entity: EntityId) -> Option<EntityHandle> {
		self.sessions.lock().get(&entity).map(|s| Arc::clone(&s.handle))
	}

	pub fn phase(&self, entity: EntityId) -> Option<SessionPhase> {
		self.sessions.lock().get(&entity).map(|s| s.phase)
	}

	pub fn set_phase(&self, _guard: &EntityGuard<'_>, entity: EntityId, phase: SessionPhase) {
		if let Some(session) = self.sessions.lock().get_mut(&entity) {
			session.phase = phase;
		}
	}

	pub fn is_connected(&self, entity: EntityId) -> bool {
		self.sessions.lock().contains_key(&entity)
	}

	/// Entities with a live session.
	pub fn connected(&self) -> Vec<EntityId> {
		self.sessions.lock().keys().copied().collect()
	}

	pub fn record(&self, entity: EntityId) -> Option<PlayerRankRecord> {
		self.records.lock().get(&entity).cloned()
	}

	pub fn put_record(&self, _guard: &EntityGuard<'_>, record: PlayerRankRecord) {
		self.records.lock().insert(record.entity_id, record);
	}

	pub fn take_record(&self, _guard: &EntityGuard<'_>, entity: EntityId) -> Option<PlayerRankRecord> {
		self.records.lock().remove(&entity)
	}

	/// All cached records.
	pub fn records(&self) -> Vec<PlayerRankRecord> {
		self.records.lock().values().cloned().collect()
	}

	/// Entities whose cached record has expired at `now`.
	pub fn expired(&self, now: DateTime<Utc>) -> Vec<EntityId> {
		self.records
			.lock()
			.values()
			.filter(|r| r.is_expired(now))
			.map(|r| r.entity_id)
			.collect()
	}

	pub fn applied(&self, entity: EntityId) -> Option<AppliedGrants> {
		self.applied.lock().get(&entity).cloned()
	}

	pub fn set_applied(&self, _guard: &EntityGuard<'_>, entity: EntityId, grants: AppliedGrants) {
		self.applied.lock().insert(entity, grants);
	}

	pub fn take_applied(&self, _guard: &EntityGuard<'_>, entity: EntityId) -> Option<AppliedGrants> {
		self.applied.lock().remove(&entity)
	}

	pub fn mark_retried(&self, _guard: &EntityGuard<'_>, entity: EntityId) {
		if let Some(grants) = self.applied.lock().get_mut(&entity) {
			grants.retried = true;
		}
	}

	/// Flags the label of `entity` for a retry, or clears the flag.
	pub fn set_label_pending(&self, _guard: &EntityGuard<'_>, entity: EntityId, pending: bool) {
		if let Some(grants) = self.applied.lock().get_mut(&entity) {
			grants.label_pending = pending;
		}
	}

	/// Effective node decisions last pushed to `entity`.
	pub fn effective(&self, entity: EntityId) -> Option<EffectivePermissions> {
		self.applied.lock().get(&entity).map(|g| g.effective.clone())
	}
}
