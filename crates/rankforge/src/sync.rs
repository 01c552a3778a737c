//! Cross-process notification of rank changes.
//!
//! The engine announces local mutations through a [`SyncBridge`] and replays
//! what peers announce through [`crate::RankForge::handle_sync_event`].
//! [`SyncHub`] connects several engines inside one process over a tokio
//! broadcast channel; anything that carries [`SyncEvent`]s between processes
//! can implement the bridge instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SyncError;
use crate::model::{EntityId, PlayerRankRecord};

/// One announced change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
	RankSet {
		entity: EntityId,
		display_name: String,
		rank: String,
		time_given: DateTime<Utc>,
		/// `None` for a permanent assignment.
		expires: Option<DateTime<Utc>>,
	},
	RankRemoved {
		entity: EntityId,
		display_name: String,
	},
	ConfigReload,
}

impl SyncEvent {
	pub fn rank_set(record: &PlayerRankRecord) -> Self {
		Self::RankSet {
			entity: record.entity_id,
			display_name: record.display_name.clone(),
			rank: record.rank_name.clone(),
			time_given: record.time_given,
			expires: record.time_expires,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::RankSet { .. } => "rank_set",
			Self::RankRemoved { .. } => "rank_removed",
			Self::ConfigReload => "config_reload",
		}
	}
}

/// Outbound side of the sync channel.
pub trait SyncBridge: Send + Sync {
	fn broadcast(&self, event: SyncEvent) -> Result<(), SyncError>;
}

/// Bridge for a single, unsynchronised engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSync;

impl SyncBridge for NoSync {
	fn broadcast(&self, _event: SyncEvent) -> Result<(), SyncError> {
		Ok(())
	}
}

#[derive(Debug, Clone)]
struct Envelope {
	origin: Uuid,
	event: SyncEvent,
}

/// In-process fan-out shared by every connected engine.
#[derive(Debug, Clone)]
pub struct SyncHub {
	tx: broadcast::Sender<Envelope>,
}

impl SyncHub {
	/// `capacity` is how many events a slow listener may fall behind by.
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	/// A new endpoint with its own identity on the hub.
	pub fn connect(&self) -> ChannelSync {
		ChannelSync {
			origin: Uuid::new_v4(),
			tx: self.tx.clone(),
		}
	}
}

/// One engine's endpoint on a [`SyncHub`].
#[derive(Debug, Clone)]
pub struct ChannelSync {
	origin: Uuid,
	tx: broadcast::Sender<Envelope>,
}

impl ChannelSync {
	/// Inbound events from every other endpoint on the hub.
	pub fn subscribe(&self) -> SyncSubscription {
		SyncSubscription {
			origin: self.origin,
			rx: self.tx.subscribe(),
		}
	}
}

impl SyncBridge for ChannelSync {
	fn broadcast(&self, event: SyncEvent) -> Result<(), SyncError> {
		let kind = event.kind();
		self.tx
			.send(Envelope {
				origin: self.origin,
				event,
			})
			.map(|receivers| tracing::trace!(kind, receivers, "sync.sent"))
			.map_err(|_| SyncError::NoListeners)
	}
}

/// Receiving half of a [`ChannelSync`]. Skips the endpoint's own events.
#[derive(Debug)]
pub struct SyncSubscription {
	origin: Uuid,
	rx: broadcast::Receiver<Envelope>,
}

impl SyncSubscription {
	/// Next event from a peer, or `None` once the hub is gone.
	pub async fn recv(&mut self) -> Option<SyncEvent> {
		loop {
			match self.rx.recv().await {
				Ok(envelope) if envelope.origin == self.origin => continue,
				Ok(envelope) => return Some(envelope.event),
				Err(broadcast::error::RecvError::Lagged(missed)) => {
					tracing::warn!(missed, "sync.lagged");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn peers_receive_each_others_events_but_not_their_own() {
		let hub = SyncHub::new(16);
		let (a, b) = (hub.connect(), hub.connect());
		let (mut a_rx, mut b_rx) = (a.subscribe(), b.subscribe());

		a.broadcast(SyncEvent::ConfigReload).expect("b is listening");
		let removed = SyncEvent::RankRemoved {
			entity: EntityId::random(),
			display_name: "Steve".into(),
		};
		b.broadcast(removed.clone()).expect("a is listening");

		assert_eq!(b_rx.recv().await, Some(SyncEvent::ConfigReload));
		assert_eq!(a_rx.recv().await, Some(removed));
	}

	#[test]
	fn broadcast_without_listeners_is_reported() {
		let hub = SyncHub::new(4);
		let lonely = hub.connect();
		assert!(matches!(lonely.broadcast(SyncEvent::ConfigReload), Err(SyncError::NoListeners)));
	}
}
