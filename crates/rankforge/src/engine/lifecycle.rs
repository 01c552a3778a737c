//! Per-entity rank lifecycle: join, quit, set, remove and expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Origin, RankForge};
use crate::apply::ApplyReport;
use crate::error::{HostError, RankError, Result};
use crate::host::EntityHandle;
use crate::locks::EntityGuard;
use crate::model::{EntityId, PlayerRankRecord, RankDefinition};
use crate::presentation::format_label;
use crate::state::SessionPhase;
use crate::sync::SyncEvent;
use crate::time::stamp;

/// Why a join ended up on the default rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
	/// Nothing was stored for the entity.
	NoRecord,
	/// The stored assignment had run out.
	Expired,
	/// The stored rank is no longer defined.
	UnknownRank(String),
	/// The storage fetch failed.
	StorageFailed,
}

/// Result of [`RankForge::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
	Resolved {
		rank: String,
		expires: Option<DateTime<Utc>>,
		/// Set when the default rank was assigned instead of a stored one.
		fallback: Option<DefaultReason>,
	},
	/// The entity quit or rejoined while its record was loading.
	Superseded,
}

impl RankForge {
	/// Loads, resolves and applies the rank of a newly connected entity.
	///
	/// The storage fetch runs without the entity lock; its result is dropped
	/// if the session ended or was replaced in the meantime.
	pub async fn join(&self, handle: EntityHandle) -> Result<JoinOutcome> {
		let entity = handle.id();
		if entity.is_nil() {
			return Err(RankError::NilEntity);
		}
		let state = &self.inner.state;

		let generation = {
			let guard = state.lock(entity);
			state.on_join(&guard, Arc::clone(&handle))
		};
		self.trace_step(entity, "join.loading");

		let fetched = match state.record(entity) {
			Some(cached) => Ok(Some(cached)),
			None => self.inner.storage.fetch(entity).await,
		};

		let guard = state.lock(entity);
		if !state.is_current(entity, generation) {
			tracing::debug!(entity = %entity, generation, "join.superseded");
			return Ok(JoinOutcome::Superseded);
		}

		// A set that raced the fetch has already written the cache.
		let fetched = match state.record(entity) {
			Some(cached) => Ok(Some(cached)),
			None => fetched,
		};
		let now = self.inner.clock.now();
		let display_name = handle.display_name();

		let (record, fallback) = match fetched {
			Err(error) => {
				tracing::error!(entity = %entity, %error, "join.fetch_failed");
				(self.default_record(entity, &display_name), Some(DefaultReason::StorageFailed))
			}
			Ok(None) => (self.default_record(entity, &display_name), Some(DefaultReason::NoRecord)),
			Ok(Some(record)) if record.is_expired(now) => {
				tracing::info!(entity = %entity, rank = %record.rank_name, "join.expired");
				self.inner.persist.delete(entity);
				(self.default_record(entity, &display_name), Some(DefaultReason::Expired))
			}
			Ok(Some(record)) if !self.inner.registry.contains(&record.rank_name) => {
				tracing::warn!(entity = %entity, rank = %record.rank_name, "join.unknown_rank");
				let reason = DefaultReason::UnknownRank(record.rank_name);
				(self.default_record(entity, &display_name), Some(reason))
			}
			Ok(Some(record)) => (
				PlayerRankRecord {
					display_name: display_name.clone(),
					..record
				},
				None,
			),
		};

		let rank = self.rank_for_record(Some(&record));
		let outcome = JoinOutcome::Resolved {
			rank: rank.name.clone(),
			expires: record.time_expires,
			fallback,
		};
		state.put_record(&guard, record);
		self.push_rank(&guard, &handle, &rank);
		state.set_phase(&guard, entity, SessionPhase::Resolved);
		drop(guard);

		self.schedule_reconcile(entity);
		self.trace_step(entity, "join.resolved");
		Ok(outcome)
	}

	/// Forgets a disconnected entity: cache, grants, label, session and lock.
	///
	/// Returns false if the entity had no session.
	pub fn quit(&self, entity: EntityId) -> bool {
		let state = &self.inner.state;
		let guard = state.lock(entity);
		let (session, applied) = state.on_quit(&guard, entity);
		let Some(session) = session else {
			return false;
		};
		if let Some(applied) = applied
			&& let Err(error) = session.handle.detach_bundle(applied.bundle)
		{
			tracing::debug!(entity = %entity, %error, "quit.detach_failed");
			if let Err(error) = session.handle.clear_bundles() {
				tracing::debug!(entity = %entity, %error, "quit.clear_failed");
			}
		}
		if let Err(error) = session.handle.reset_display_label() {
			tracing::debug!(entity = %entity, %error, "quit.label_reset_failed");
		}
		drop(guard);
		state.locks().release_entity(entity);
		self.trace_step(entity, "quit");
		true
	}

	/// Purges every expired cached record, moving connected entities onto
	/// the default rank.
	///
	/// Returns the entities processed.
	pub fn sweep_expired(&self) -> Vec<EntityId> {
		let now = self.inner.clock.now();
		let mut processed = Vec::new();
		for entity in self.inner.state.expired(now) {
			let guard = self.inner.state.lock(entity);
			if self.expire_locked(&guard, entity) {
				processed.push(entity);
			}
		}
		if !processed.is_empty() {
			tracing::info!(count = processed.len(), "sweep.expired");
		}
		processed
	}

	/// Drops an expired record. Re-checks under the lock, since a set may
	/// have replaced the record since it was found expired.
	pub(super) fn expire_locked(&self, guard: &EntityGuard<'_>, entity: EntityId) -> bool {
		let state = &self.inner.state;
		let now = self.inner.clock.now();
		if !state.record(entity).is_some_and(|r| r.is_expired(now)) {
			return false;
		}
		if let Some(expired) = state.take_record(guard, entity) {
			tracing::info!(entity = %entity, rank = %expired.rank_name, "rank.expired");
		}
		self.inner.persist.delete(entity);
		self.assign_default(guard, entity);
		true
	}

	pub(super) fn commit_set(&self, guard: &EntityGuard<'_>, record: PlayerRankRecord, rank: &RankDefinition, origin: Origin) {
		let state = &self.inner.state;
		let entity = record.entity_id;
		state.put_record(guard, record.clone());
		if origin == Origin::Local {
			self.inner.persist.upsert(record.clone());
		}

		let live = state.handle(entity).filter(|_| state.phase(entity) != Some(SessionPhase::Loading));
		if let Some(handle) = live {
			self.push_rank(guard, &handle, rank);
			state.set_phase(guard, entity, SessionPhase::Resolved);
			self.schedule_reconcile(entity);
		}

		tracing::info!(
			entity = %entity,
			name = %record.display_name,
			rank = %rank.name,
			expires = ?record.time_expires,
			remote = origin == Origin::Remote,
			"rank.set"
		);
		if origin == Origin::Local {
			self.announce(SyncEvent::rank_set(&record));
		}
	}

	pub(super) fn commit_remove(&self, guard: &EntityGuard<'_>, entity: EntityId, origin: Origin) -> bool {
		let state = &self.inner.state;
		let Some(removed) = state.take_record(guard, entity) else {
			// Offline records are evicted after a flush but may still be stored.
			if origin == Origin::Local {
				self.inner.persist.delete(entity);
				self.announce(SyncEvent::RankRemoved {
					entity,
					display_name: String::new(),
				});
			}
			return false;
		};
		if origin == Origin::Local {
			self.inner.persist.delete(entity);
		}
		self.assign_default(guard, entity);

		tracing::info!(entity = %entity, rank = %removed.rank_name, remote = origin == Origin::Remote, "rank.removed");
		if origin == Origin::Local {
			self.announce(SyncEvent::RankRemoved {
				entity,
				display_name: removed.display_name,
			});
		}
		true
	}

	/// Puts a connected, resolved entity on the default rank. Does nothing
	/// for entities without a session or still loading.
	fn assign_default(&self, guard: &EntityGuard<'_>, entity: EntityId) {
		let state = &self.inner.state;
		let Some(session) = state.session(entity) else {
			return;
		};
		if session.phase == SessionPhase::Loading {
			return;
		}
		state.set_phase(guard, entity, SessionPhase::Removed);
		let record = self.default_record(entity, &session.handle.display_name());
		let rank = self.inner.registry.default_rank();
		state.put_record(guard, record);
		self.push_rank(guard, &session.handle, &rank);
		state.set_phase(guard, entity, SessionPhase::Resolved);
		self.schedule_reconcile(entity);
	}

	/// Applies grants and pushes the display label.
	///
	/// A refused label is flagged for the next reconcile to retry.
	pub(super) fn push_rank(&self, guard: &EntityGuard<'_>, handle: &EntityHandle, rank: &RankDefinition) -> ApplyReport {
		let entity = handle.id();
		if !handle.is_online() {
			tracing::debug!(entity = %entity, "apply.offline_handle");
		}
		let report = self.inner.applicator.apply(guard, &self.inner.state, handle, rank);

		let pushed = self.push_label(handle, rank);
		if let Err(error) = &pushed {
			tracing::warn!(entity = %entity, rank = %rank.name, %error, "presentation.push_failed");
		}
		self.inner.state.set_label_pending(guard, entity, pushed.is_err());
		report
	}

	pub(super) fn push_label(&self, handle: &EntityHandle, rank: &RankDefinition) -> std::result::Result<(), HostError> {
		let label = format_label(rank, &handle.display_name(), self.inner.config.presentation.into());
		if label.tag.is_none() && label.roster.is_none() {
			handle.reset_display_label()
		} else {
			handle.set_display_label(&label)
		}
	}

	fn default_record(&self, entity: EntityId, display_name: &str) -> PlayerRankRecord {
		PlayerRankRecord {
			entity_id: entity,
			display_name: display_name.to_string(),
			rank_name: self.inner.registry.default_rank().name.clone(),
			time_given: stamp(self.inner.clock.now()),
			time_expires: None,
		}
	}

	fn trace_step(&self, entity: EntityId, step: &'static str) {
		if self.inner.config.debug {
			tracing::info!(entity = %entity, step, "engine.step");
		} else {
			tracing::debug!(entity = %entity, step, "engine.step");
		}
	}
}
