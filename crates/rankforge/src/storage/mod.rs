//! Persistent rank assignments.
//!
//! The engine only ever talks to a [`RankStorage`]. Writes reach it through
//! the engine's ordered persistence queue, reads happen on join.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{EntityId, PlayerRankRecord};

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::{MemoryStorage, StorageOp};

/// Backend holding one record per entity.
#[async_trait]
pub trait RankStorage: Send + Sync {
	/// Loads the stored record, if any.
	async fn fetch(&self, entity: EntityId) -> Result<Option<PlayerRankRecord>, StorageError>;

	/// Inserts or replaces the record for `record.entity_id`.
	async fn upsert(&self, record: PlayerRankRecord) -> Result<(), StorageError>;

	/// Removes the record. Deleting a missing record is not an error.
	async fn delete(&self, entity: EntityId) -> Result<(), StorageError>;

	/// Short backend name for logs.
	fn name(&self) -> &'static str;
}

pub type SharedStorage = Arc<dyn RankStorage>;
