use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rankforge_worker::WorkerRuntime;
use serde::{Deserialize, Serialize};

use super::RankStorage;
use crate::error::StorageError;
use crate::model::{EntityId, PlayerRankRecord};
use crate::time::{format_timestamp, parse_timestamp};

/// On-disk layout: one `[players.<uuid>]` table per entity.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PlayerFile {
	#[serde(default)]
	players: BTreeMap<String, StoredRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
	name: String,
	rank: String,
	time_given: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	time_expires: Option<String>,
}

impl StoredRecord {
	fn encode(record: &PlayerRankRecord) -> Self {
		Self {
			name: record.display_name.clone(),
			rank: record.rank_name.clone(),
			time_given: format_timestamp(record.time_given),
			time_expires: record.time_expires.map(format_timestamp),
		}
	}

	fn decode(self, entity: EntityId) -> PlayerRankRecord {
		let time_given = parse_timestamp(&self.time_given).unwrap_or_else(|| {
			tracing::warn!(entity = %entity, value = %self.time_given, "storage.file.bad_time_given");
			DateTime::<Utc>::UNIX_EPOCH
		});
		// An expiry nobody can read is treated as already passed.
		let time_expires = self.time_expires.map(|raw| {
			parse_timestamp(&raw).unwrap_or_else(|| {
				tracing::warn!(entity = %entity, value = %raw, "storage.file.bad_time_expires");
				DateTime::<Utc>::UNIX_EPOCH
			})
		});
		PlayerRankRecord {
			entity_id: entity,
			display_name: self.name,
			rank_name: self.rank,
			time_given,
			time_expires,
		}
	}
}

/// TOML flat-file store.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never see a partial file. File access runs on the
/// worker runtime's bounded blocking pool.
#[derive(Debug, Clone)]
pub struct FileStorage {
	path: Arc<PathBuf>,
	write_lock: Arc<Mutex<()>>,
	workers: WorkerRuntime,
}

impl FileStorage {
	pub fn new(path: impl Into<PathBuf>, workers: WorkerRuntime) -> Self {
		Self {
			path: Arc::new(path.into()),
			write_lock: Arc::new(Mutex::new(())),
			workers,
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn blocking<R, F>(&self, f: F) -> Result<R, StorageError>
	where
		F: FnOnce(&Path, &Mutex<()>) -> Result<R, StorageError> + Send + 'static,
		R: Send + 'static,
	{
		let path = Arc::clone(&self.path);
		let lock = Arc::clone(&self.write_lock);
		self.workers.run_blocking(move || f(&path, &lock)).await?
	}
}

fn read_file(path: &Path) -> Result<PlayerFile, StorageError> {
	let text = match std::fs::read_to_string(path) {
		Ok(text) => text,
		Err(error) if error.kind() == ErrorKind::NotFound => return Ok(PlayerFile::default()),
		Err(error) => {
			return Err(StorageError::Io {
				path: path.to_path_buf(),
				error,
			});
		}
	};
	toml::from_str(&text).map_err(|e| StorageError::Malformed(e.to_string()))
}

fn write_file(path: &Path, file: &PlayerFile) -> Result<(), StorageError> {
	let text = toml::to_string_pretty(file).map_err(|e| StorageError::Encode(e.to_string()))?;
	let io_err = |error| StorageError::Io {
		path: path.to_path_buf(),
		error,
	};
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent).map_err(io_err)?;
	}
	let tmp = path.with_extension("toml.tmp");
	std::fs::write(&tmp, text).map_err(io_err)?;
	std::fs::rename(&tmp, path).map_err(io_err)
}

fn modify(path: &Path, lock: &Mutex<()>, f: impl FnOnce(&mut PlayerFile)) -> Result<(), StorageError> {
	let _held = lock.lock();
	let mut file = read_file(path)?;
	f(&mut file);
	write_file(path, &file)
}

#[async_trait]
impl RankStorage for FileStorage {
	async fn fetch(&self, entity: EntityId) -> Result<Option<PlayerRankRecord>, StorageError> {
		self.blocking(move |path, _| {
			let mut file = read_file(path)?;
			Ok(file.players.remove(&entity.to_string()).map(|stored| stored.decode(entity)))
		})
		.await
	}

	async fn upsert(&self, record: PlayerRankRecord) -> Result<(), StorageError> {
		self.blocking(move |path, lock| {
			modify(path, lock, |file| {
				file.players.insert(record.entity_id.to_string(), StoredRecord::encode(&record));
			})
		})
		.await
	}

	async fn delete(&self, entity: EntityId) -> Result<(), StorageError> {
		self.blocking(move |path, lock| {
			modify(path, lock, |file| {
				file.players.remove(&entity.to_string());
			})
		})
		.await
	}

	fn name(&self) -> &'static str {
		"file"
	}
}
