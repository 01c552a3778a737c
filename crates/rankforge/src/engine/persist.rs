//! Ordered write-behind queue in front of the storage backend.
//!
//! Writes are enqueued while the entity lock is held and applied by a single
//! task, so the backend sees them in critical-section order without any lock
//! being held across the await.

use tokio::sync::{mpsc, oneshot};

use rankforge_worker::{ShutdownToken, TaskClass};

use crate::model::{EntityId, PlayerRankRecord};
use crate::storage::SharedStorage;

#[derive(Debug)]
enum PersistOp {
	Upsert(PlayerRankRecord),
	Delete(EntityId),
	Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone)]
pub(crate) struct PersistQueue {
	tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistQueue {
	/// Starts the writer task. It stops once `shutdown` fires and the queue
	/// has been emptied.
	pub(crate) fn start(storage: SharedStorage, shutdown: ShutdownToken) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let _writer = rankforge_worker::spawn(TaskClass::Background, run(storage, rx, shutdown));
		Self { tx }
	}

	pub(crate) fn upsert(&self, record: PlayerRankRecord) {
		let entity = record.entity_id;
		if self.tx.send(PersistOp::Upsert(record)).is_err() {
			tracing::error!(entity = %entity, "persist.queue_closed");
		}
	}

	pub(crate) fn delete(&self, entity: EntityId) {
		if self.tx.send(PersistOp::Delete(entity)).is_err() {
			tracing::error!(entity = %entity, "persist.queue_closed");
		}
	}

	/// Waits until every write queued before this call has been attempted.
	///
	/// Returns false if the writer is gone.
	pub(crate) async fn flush(&self) -> bool {
		let (done_tx, done_rx) = oneshot::channel();
		if self.tx.send(PersistOp::Flush(done_tx)).is_err() {
			return false;
		}
		done_rx.await.is_ok()
	}
}

async fn run(storage: SharedStorage, mut rx: mpsc::UnboundedReceiver<PersistOp>, shutdown: ShutdownToken) {
	loop {
		tokio::select! {
			biased;
			op = rx.recv() => match op {
				Some(op) => write(&storage, op).await,
				None => break,
			},
			() = shutdown.cancelled() => {
				rx.close();
				while let Some(op) = rx.recv().await {
					write(&storage, op).await;
				}
				break;
			}
		}
	}
	tracing::debug!(backend = storage.name(), "persist.stopped");
}

async fn write(storage: &SharedStorage, op: PersistOp) {
	match op {
		PersistOp::Upsert(record) => {
			let entity = record.entity_id;
			let rank = record.rank_name.clone();
			match storage.upsert(record).await {
				Ok(()) => tracing::trace!(entity = %entity, rank = %rank, "persist.upserted"),
				Err(error) => tracing::error!(entity = %entity, rank = %rank, %error, "persist.upsert_failed"),
			}
		}
		PersistOp::Delete(entity) => match storage.delete(entity).await {
			Ok(()) => tracing::trace!(entity = %entity, "persist.deleted"),
			Err(error) => tracing::error!(entity = %entity, %error, "persist.delete_failed"),
		},
		PersistOp::Flush(done) => {
			let _ = done.send(());
		}
	}
}
