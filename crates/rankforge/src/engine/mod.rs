//! The rank engine: one handle over the registry, per-entity state, the
//! applicator and the storage and sync collaborators.
//!
//! [`RankForge`] is cheap to clone. Every operation that changes what an
//! entity holds runs inside that entity's critical section; the only awaits
//! are storage fetches on join and rank-file reads on reload, and neither
//! happens with a lock held.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rankforge_worker::{DrainBudget, DrainReport, ShutdownToken, TaskClass, WorkerRuntime};

use crate::apply::{Applicator, ApplyReport, ReconcileOutcome};
use crate::config::{EngineConfig, StorageKind};
use crate::error::{RankError, Result};
use crate::hierarchy::{self, Actor, BYPASS_PERMISSION};
use crate::host::{OpenHost, PermissionHost};
use crate::model::{EntityId, PlayerRankRecord, RankDefinition};
use crate::registry::{RankLoadReport, RankRegistry};
use crate::state::EntityStateStore;
use crate::storage::{FileStorage, MemoryStorage, SharedStorage};
use crate::sync::{NoSync, SyncBridge, SyncEvent, SyncSubscription};
use crate::time::{Clock, SystemClock, parse_duration, stamp};

mod lifecycle;
mod persist;

pub use lifecycle::{DefaultReason, JoinOutcome};
use persist::PersistQueue;

/// Where rank definitions are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankSource {
	/// A TOML document held in memory.
	Inline(String),
	/// A TOML file, re-read on every reload.
	File(PathBuf),
}

impl RankSource {
	fn read_blocking(&self) -> std::result::Result<String, String> {
		match self {
			Self::Inline(text) => Ok(text.clone()),
			Self::File(path) => std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display())),
		}
	}
}

/// Whether a change started here or was replayed from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
	Local,
	Remote,
}

/// Configures and starts a [`RankForge`].
pub struct RankForgeBuilder {
	config: EngineConfig,
	source: RankSource,
	storage: Option<SharedStorage>,
	sync: Option<Arc<dyn SyncBridge>>,
	host: Option<Arc<dyn PermissionHost>>,
	clock: Option<Arc<dyn Clock>>,
	workers: Option<WorkerRuntime>,
}

impl RankForgeBuilder {
	pub fn config(mut self, config: EngineConfig) -> Self {
		self.config = config;
		self
	}

	/// Storage backend. Defaults to the one named by the config.
	pub fn storage(mut self, storage: SharedStorage) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn sync(mut self, sync: Arc<dyn SyncBridge>) -> Self {
		self.sync = Some(sync);
		self
	}

	pub fn host(mut self, host: Arc<dyn PermissionHost>) -> Self {
		self.host = Some(host);
		self
	}

	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	pub fn workers(mut self, workers: WorkerRuntime) -> Self {
		self.workers = Some(workers);
		self
	}

	/// Loads the ranks and starts the persistence task.
	///
	/// An unreadable rank file is reported in the load report and leaves the
	/// engine running on the synthetic default rank.
	pub fn build(self) -> (RankForge, RankLoadReport) {
		let workers = self.workers.unwrap_or_default();
		let text = self.source.read_blocking().unwrap_or_else(|error| {
			tracing::error!(%error, "engine.rank_source_unreadable");
			String::new()
		});
		let (registry, report) = RankRegistry::from_source(&text);

		let storage = self.storage.unwrap_or_else(|| match self.config.storage.kind {
			StorageKind::Memory => Arc::new(MemoryStorage::new()),
			StorageKind::File => Arc::new(FileStorage::new(self.config.storage.path.clone(), workers.clone())),
		});
		let shutdown = ShutdownToken::new();
		let persist = PersistQueue::start(Arc::clone(&storage), shutdown.child());

		tracing::info!(
			ranks = report.table.len(),
			default = %report.table.default_rank().name,
			storage = storage.name(),
			sync = self.config.sync.enabled,
			"engine.started"
		);

		let inner = Inner {
			applicator: Applicator::new(self.host.unwrap_or_else(|| Arc::new(OpenHost))),
			config: self.config,
			registry,
			source: self.source,
			state: EntityStateStore::new(),
			storage,
			sync: self.sync.unwrap_or_else(|| Arc::new(NoSync)),
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			workers,
			persist,
			shutdown,
		};
		(RankForge { inner: Arc::new(inner) }, report)
	}
}

struct Inner {
	config: EngineConfig,
	registry: RankRegistry,
	source: RankSource,
	state: EntityStateStore,
	storage: SharedStorage,
	sync: Arc<dyn SyncBridge>,
	applicator: Applicator,
	clock: Arc<dyn Clock>,
	workers: WorkerRuntime,
	persist: PersistQueue,
	shutdown: ShutdownToken,
}

/// Handle to a running rank engine.
#[derive(Clone)]
pub struct RankForge {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for RankForge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RankForge")
			.field("ranks", &self.inner.registry.snapshot().len())
			.field("connected", &self.inner.state.connected().len())
			.field("storage", &self.inner.storage.name())
			.finish_non_exhaustive()
	}
}

impl RankForge {
	pub fn builder(source: RankSource) -> RankForgeBuilder {
		RankForgeBuilder {
			config: EngineConfig::default(),
			source,
			storage: None,
			sync: None,
			host: None,
			clock: None,
			workers: None,
		}
	}

	pub fn config(&self) -> &EngineConfig {
		&self.inner.config
	}

	pub fn registry(&self) -> &RankRegistry {
		&self.inner.registry
	}

	pub fn state(&self) -> &EntityStateStore {
		&self.inner.state
	}

	pub fn workers(&self) -> &WorkerRuntime {
		&self.inner.workers
	}

	/// Current time on the engine's clock.
	pub fn now(&self) -> DateTime<Utc> {
		self.inner.clock.now()
	}

	/// Looks up a rank definition by name, ignoring case.
	pub fn find_rank(&self, name: &str) -> Option<Arc<RankDefinition>> {
		self.inner.registry.resolve(name)
	}

	pub fn list_ranks(&self) -> Vec<Arc<RankDefinition>> {
		self.inner.registry.list()
	}

	/// Ranks by descending weight.
	pub fn list_ranks_sorted(&self) -> Vec<Arc<RankDefinition>> {
		self.inner.registry.list_sorted()
	}

	/// The record currently in force for `entity`.
	///
	/// An expired record is never returned: it is purged first, and a
	/// connected entity gets its default record back instead.
	pub fn current_record(&self, entity: EntityId) -> Option<PlayerRankRecord> {
		let record = self.inner.state.record(entity)?;
		if !record.is_expired(self.inner.clock.now()) {
			return Some(record);
		}
		let guard = self.inner.state.lock(entity);
		self.expire_locked(&guard, entity);
		self.inner.state.record(entity)
	}

	/// The rank `entity` effectively holds, falling back to the default.
	pub fn resolve_rank(&self, entity: EntityId) -> Arc<RankDefinition> {
		self.current_record(entity)
			.and_then(|record| self.inner.registry.resolve(&record.rank_name))
			.unwrap_or_else(|| self.inner.registry.default_rank())
	}

	/// Weight of the rank `entity` effectively holds.
	pub fn entity_weight(&self, entity: EntityId) -> u32 {
		self.resolve_rank(entity).weight
	}

	/// Whether `entity` holds the rank called `rank_name`.
	pub fn has_rank(&self, entity: EntityId, rank_name: &str) -> bool {
		self.resolve_rank(entity).is_named(rank_name)
	}

	/// Assigns `rank_name` to `entity` for `duration` (`"7d"`, `"permanent"`).
	///
	/// Nothing changes if the id is nil or the rank is unknown.
	pub fn set_rank(&self, entity: EntityId, display_name: &str, rank_name: &str, duration: &str) -> Result<PlayerRankRecord> {
		if entity.is_nil() {
			return Err(RankError::NilEntity);
		}
		let rank = self
			.inner
			.registry
			.resolve(rank_name)
			.ok_or_else(|| RankError::UnknownRank(rank_name.to_string()))?;
		let now = stamp(self.inner.clock.now());
		let record = PlayerRankRecord {
			entity_id: entity,
			display_name: display_name.to_string(),
			rank_name: rank.name.clone(),
			time_given: now,
			time_expires: parse_duration(duration).expiry_from(now),
		};

		let guard = self.inner.state.lock(entity);
		self.commit_set(&guard, record.clone(), &rank, Origin::Local);
		Ok(record)
	}

	/// Drops the assignment of `entity`, putting a connected entity back on
	/// the default rank.
	///
	/// Returns false when nothing was cached for the entity. The stored
	/// assignment is deleted either way.
	pub fn remove_rank(&self, entity: EntityId) -> Result<bool> {
		if entity.is_nil() {
			return Err(RankError::NilEntity);
		}
		let guard = self.inner.state.lock(entity);
		Ok(self.commit_remove(&guard, entity, Origin::Local))
	}

	/// Whether `actor` may assign `rank_name`.
	pub fn may_assign(&self, actor: Actor, rank_name: &str) -> Result<bool> {
		let target = self
			.inner
			.registry
			.resolve(rank_name)
			.ok_or_else(|| RankError::UnknownRank(rank_name.to_string()))?;
		Ok(match actor {
			Actor::Console => hierarchy::may_assign(None, &target, false),
			Actor::Entity(id) => hierarchy::may_assign(Some(self.entity_weight(id)), &target, self.has_permission(id, BYPASS_PERMISSION)),
		})
	}

	/// Answers a permission query from the grants last pushed to `entity`.
	///
	/// An explicit denial beats a wildcard grant.
	pub fn has_permission(&self, entity: EntityId, node: &str) -> bool {
		self.inner.state.effective(entity).is_some_and(|set| set.allows(node))
	}

	/// Re-pushes the resolved rank of a connected entity.
	///
	/// Takes the entity id rather than a handle: the handle registered by
	/// [`RankForge::join`] is the one pushed to. Returns `None` when the
	/// entity has no session.
	pub fn apply_to_live_entity(&self, entity: EntityId) -> Option<ApplyReport> {
		let guard = self.inner.state.lock(entity);
		let handle = self.inner.state.handle(entity)?;
		let rank = self.rank_for_record(self.inner.state.record(entity).as_ref());
		let report = self.push_rank(&guard, &handle, &rank);
		drop(guard);
		self.schedule_reconcile(entity);
		Some(report)
	}

	/// Verifies the host reflects the last apply, retrying it once.
	///
	/// A refused display label is pushed again here, also at most once.
	pub fn reconcile(&self, entity: EntityId) -> ReconcileOutcome {
		let state = &self.inner.state;
		let guard = state.lock(entity);
		let Some(applied) = state.applied(entity) else {
			return ReconcileOutcome::Skipped;
		};
		if applied.label_pending
			&& let Some(handle) = state.handle(entity)
		{
			let rank = self.rank_for_record(state.record(entity).as_ref());
			match self.push_label(&handle, &rank) {
				Ok(()) => tracing::debug!(entity = %entity, rank = %rank.name, "presentation.retried"),
				Err(error) => tracing::error!(entity = %entity, rank = %rank.name, %error, "presentation.retry_failed"),
			}
			state.set_label_pending(&guard, entity, false);
		}

		let rank = self
			.inner
			.registry
			.resolve(applied.pending.as_deref().unwrap_or(&applied.rank))
			.unwrap_or_else(|| self.inner.registry.default_rank());
		let outcome = self.inner.applicator.reconcile(&guard, state, &rank);
		if let ReconcileOutcome::Retried(_) = outcome {
			drop(guard);
			self.schedule_reconcile(entity);
		}
		outcome
	}

	/// Re-reads the rank source, swaps the table and re-applies every
	/// connected entity.
	pub async fn reload_ranks(&self) -> Result<RankLoadReport> {
		self.reload(Origin::Local).await
	}

	/// Swaps in ranks parsed from `source` without touching the configured
	/// rank source.
	pub fn replace_ranks(&self, source: &str) -> RankLoadReport {
		let report = self.inner.registry.reload(source);
		self.reapply_connected();
		report
	}

	async fn reload(&self, origin: Origin) -> Result<RankLoadReport> {
		let source = self.inner.source.clone();
		let text = self
			.inner
			.workers
			.run_blocking(move || source.read_blocking())
			.await
			.map_err(|e| RankError::Reload(e.to_string()))?
			.map_err(RankError::Reload)?;
		let report = self.replace_ranks(&text);
		if origin == Origin::Local {
			self.announce(SyncEvent::ConfigReload);
		}
		Ok(report)
	}

	/// Number of cached assignments per rank name.
	pub fn rank_statistics(&self) -> BTreeMap<String, usize> {
		let mut stats = BTreeMap::new();
		for record in self.inner.state.records() {
			*stats.entry(record.rank_name).or_insert(0) += 1;
		}
		stats
	}

	/// Replays an event announced by a peer. Nothing is persisted or
	/// re-announced.
	pub async fn handle_sync_event(&self, event: SyncEvent) {
		let kind = event.kind();
		match event {
			SyncEvent::RankSet {
				entity,
				display_name,
				rank,
				time_given,
				expires,
			} => {
				let Some(definition) = self.inner.registry.resolve(&rank) else {
					tracing::warn!(entity = %entity, rank = %rank, "sync.unknown_rank");
					return;
				};
				let guard = self.inner.state.lock(entity);
				if !self.inner.state.is_connected(entity) && self.inner.state.record(entity).is_none() {
					tracing::trace!(entity = %entity, "sync.ignored_offline");
					return;
				}
				let record = PlayerRankRecord {
					entity_id: entity,
					display_name,
					rank_name: definition.name.clone(),
					time_given,
					time_expires: expires,
				};
				self.commit_set(&guard, record, &definition, Origin::Remote);
			}
			SyncEvent::RankRemoved { entity, .. } => {
				let guard = self.inner.state.lock(entity);
				self.commit_remove(&guard, entity, Origin::Remote);
			}
			SyncEvent::ConfigReload => {
				if let Err(error) = self.reload(Origin::Remote).await {
					tracing::error!(%error, "sync.reload_failed");
					return;
				}
			}
		}
		if self.inner.config.sync.notify {
			tracing::info!(kind, "sync.applied");
		} else {
			tracing::debug!(kind, "sync.applied");
		}
	}

	/// Replays peer events from `subscription` until shutdown.
	pub fn listen(&self, mut subscription: SyncSubscription) {
		let engine = self.clone();
		let shutdown = self.inner.shutdown.child();
		let _listener = rankforge_worker::spawn(TaskClass::Background, async move {
			loop {
				tokio::select! {
					() = shutdown.cancelled() => break,
					event = subscription.recv() => match event {
						Some(event) => engine.handle_sync_event(event).await,
						None => break,
					},
				}
			}
			tracing::debug!("sync.listener_stopped");
		});
	}

	/// Waits for scheduled reconciles and queued storage writes.
	pub async fn settle(&self, budget: DrainBudget) -> DrainReport {
		let report = self.inner.workers.drain(budget).await;
		self.flush().await;
		report
	}

	/// Waits until every storage write queued so far has been attempted.
	///
	/// Records cached for entities without a session are evicted once their
	/// writes have gone through; a later join reads them back from storage.
	pub async fn flush(&self) -> bool {
		let state = &self.inner.state;
		let offline: Vec<_> = state.records().into_iter().filter(|r| !state.is_connected(r.entity_id)).collect();
		let flushed = self.inner.persist.flush().await;
		if flushed {
			self.evict_offline(offline);
		}
		flushed
	}

	/// Drops cached records that are still exactly what was flushed.
	fn evict_offline(&self, flushed: Vec<PlayerRankRecord>) {
		let state = &self.inner.state;
		let mut evicted = 0usize;
		for record in flushed {
			let entity = record.entity_id;
			let guard = state.lock(entity);
			if state.is_connected(entity) || state.record(entity).as_ref() != Some(&record) {
				continue;
			}
			state.take_record(&guard, entity);
			drop(guard);
			state.locks().release_entity(entity);
			evicted += 1;
		}
		if evicted > 0 {
			tracing::debug!(evicted, "engine.offline_evicted");
		}
	}

	/// Settles outstanding work and stops the background tasks.
	pub async fn shutdown(&self, budget: DrainBudget) -> DrainReport {
		let report = self.settle(budget).await;
		self.inner.shutdown.cancel();
		tracing::info!(settled = report.is_settled(), "engine.shutdown");
		report
	}

	pub(crate) fn announce(&self, event: SyncEvent) {
		if !self.inner.config.sync.enabled {
			return;
		}
		let kind = event.kind();
		match self.inner.sync.broadcast(event) {
			Ok(()) if self.inner.config.sync.notify => tracing::info!(kind, "sync.sent"),
			Ok(()) => tracing::debug!(kind, "sync.sent"),
			Err(error) => tracing::warn!(kind, %error, "sync.send_failed"),
		}
	}

	/// Schedules a reconcile after the configured verify delay.
	pub(crate) fn schedule_reconcile(&self, entity: EntityId) {
		if self.inner.shutdown.is_cancelled() {
			return;
		}
		let engine = self.clone();
		let delay = self.inner.config.apply.verify_delay();
		self.inner.workers.submit(TaskClass::Deferred, async move {
			tokio::time::sleep(delay).await;
			if engine.inner.shutdown.is_cancelled() {
				return;
			}
			if let ReconcileOutcome::Failed = engine.reconcile(entity) {
				tracing::error!(entity = %entity, "engine.reconcile_gave_up");
			}
		});
	}

	fn reapply_connected(&self) {
		let connected = self.inner.state.connected();
		for entity in &connected {
			self.apply_to_live_entity(*entity);
		}
		tracing::info!(entities = connected.len(), "engine.reapplied");
	}

	fn rank_for_record(&self, record: Option<&PlayerRankRecord>) -> Arc<RankDefinition> {
		record
			.and_then(|r| self.inner.registry.resolve(&r.rank_name))
			.unwrap_or_else(|| self.inner.registry.default_rank())
	}
}
