use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;

use super::RankStorage;
use crate::error::StorageError;
use crate::model::{EntityId, PlayerRankRecord};

/// A write that reached the store, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
	Upsert { entity: EntityId, rank: String },
	Delete(EntityId),
}

/// Process-local store. Loses everything on restart.
///
/// Fetch latency and failures can be injected to exercise the engine's
/// fallback paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	records: Mutex<HashMap<EntityId, PlayerRankRecord>>,
	history: Mutex<Vec<StorageOp>>,
	fetch_delay: Mutex<Option<Duration>>,
	fail_fetch: AtomicBool,
	fail_writes: AtomicBool,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds a record without going through the write history.
	pub fn insert(&self, record: PlayerRankRecord) {
		self.records.lock().insert(record.entity_id, record);
	}

	pub fn get(&self, entity: EntityId) -> Option<PlayerRankRecord> {
		self.records.lock().get(&entity).cloned()
	}

	pub fn len(&self) -> usize {
		self.records.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Writes received so far.
	pub fn history(&self) -> Vec<StorageOp> {
		self.history.lock().clone()
	}

	pub fn set_fetch_delay(&self, delay: Option<Duration>) {
		*self.fetch_delay.lock() = delay;
	}

	pub fn fail_fetch(&self, fail: bool) {
		self.fail_fetch.store(fail, Ordering::SeqCst);
	}

	pub fn fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	fn check_writes(&self) -> Result<(), StorageError> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(StorageError::Unavailable("writes disabled".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl RankStorage for MemoryStorage {
	async fn fetch(&self, entity: EntityId) -> Result<Option<PlayerRankRecord>, StorageError> {
		let delay = *self.fetch_delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail_fetch.load(Ordering::SeqCst) {
			return Err(StorageError::Unavailable("fetch disabled".into()));
		}
		Ok(self.get(entity))
	}

	async fn upsert(&self, record: PlayerRankRecord) -> Result<(), StorageError> {
		self.check_writes()?;
		self.history.lock().push(StorageOp::Upsert {
			entity: record.entity_id,
			rank: record.rank_name.clone(),
		});
		self.records.lock().insert(record.entity_id, record);
		Ok(())
	}

	async fn delete(&self, entity: EntityId) -> Result<(), StorageError> {
		self.check_writes()?;
		self.history.lock().push(StorageOp::Delete(entity));
		self.records.lock().remove(&entity);
		Ok(())
	}

	fn name(&self) -> &'static str {
		"memory"
	}
}

#[cfg(test)]
mod tests {
	use chrono::Utc;

	use super::*;

	fn record(entity: EntityId, rank: &str) -> PlayerRankRecord {
		PlayerRankRecord {
			entity_id: entity,
			display_name: "Steve".into(),
			rank_name: rank.into(),
			time_given: Utc::now(),
			time_expires: None,
		}
	}

	#[tokio::test]
	async fn writes_are_recorded_in_order() {
		let store = MemoryStorage::new();
		let id = EntityId::random();
		store.upsert(record(id, "vip")).await.expect("upsert");
		store.delete(id).await.expect("delete");
		store.delete(id).await.expect("deleting twice is fine");

		assert!(store.is_empty());
		assert_eq!(
			store.history(),
			vec![
				StorageOp::Upsert {
					entity: id,
					rank: "vip".into()
				},
				StorageOp::Delete(id),
				StorageOp::Delete(id),
			]
		);
	}

	#[tokio::test]
	async fn injected_failures_surface_as_errors() {
		let store = MemoryStorage::new();
		let id = EntityId::random();
		store.insert(record(id, "vip"));

		store.fail_fetch(true);
		assert!(matches!(store.fetch(id).await, Err(StorageError::Unavailable(_))));
		store.fail_fetch(false);
		assert_eq!(store.fetch(id).await.expect("fetch").map(|r| r.rank_name), Some("vip".into()));

		store.fail_writes(true);
		assert!(store.delete(id).await.is_err());
		assert!(store.get(id).is_some());
	}
}
