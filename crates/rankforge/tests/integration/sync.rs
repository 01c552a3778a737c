use std::sync::Arc;
use std::time::Duration;

use rankforge::testing::FakeEntity;
use rankforge::{EngineConfig, EntityId, LiveEntity, MemoryStorage, SyncHub};

use crate::common::{builder, clock, config, wait_until};

fn synced() -> EngineConfig {
	let mut config = config();
	config.sync.enabled = true;
	config
}

#[tokio::test]
async fn peers_follow_each_others_assignments() {
	let hub = SyncHub::new(64);
	let (a_link, b_link) = (hub.connect(), hub.connect());
	let (a_storage, b_storage) = (Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()));

	let (a, _) = builder(a_storage.clone(), clock()).config(synced()).sync(Arc::new(a_link.clone())).build();
	let (b, _) = builder(b_storage.clone(), clock()).config(synced()).sync(Arc::new(b_link.clone())).build();
	a.listen(a_link.subscribe());
	b.listen(b_link.subscribe());

	let steve = FakeEntity::random("Steve");
	b.join(steve.clone()).await.expect("real id");
	assert_eq!(b.resolve_rank(steve.id()).name, "member");

	a.set_rank(steve.id(), "Steve", "vip", "7d").expect("VIP exists");
	assert!(wait_until(Duration::from_secs(2), || b.resolve_rank(steve.id()).name == "VIP").await);
	assert!(steve.has_permission("kit.vip"));
	assert_eq!(
		b.current_record(steve.id()).and_then(|r| r.time_expires),
		a.current_record(steve.id()).and_then(|r| r.time_expires)
	);

	a.remove_rank(steve.id()).expect("real id");
	assert!(wait_until(Duration::from_secs(2), || b.resolve_rank(steve.id()).name == "member").await);
	assert!(!steve.has_permission("kit.vip"));

	assert!(a.flush().await && b.flush().await);
	assert_eq!(a_storage.history().len(), 2);
	assert!(b_storage.history().is_empty(), "replayed changes are written by their origin only");
}

#[tokio::test]
async fn disabled_sync_announces_nothing() {
	let hub = SyncHub::new(8);
	let link = hub.connect();
	let mut peer = hub.connect().subscribe();

	let (engine, _) = builder(Arc::new(MemoryStorage::new()), clock()).sync(Arc::new(link)).build();
	engine.set_rank(EntityId::random(), "Steve", "vip", "permanent").expect("VIP exists");

	let received = tokio::time::timeout(Duration::from_millis(50), peer.recv()).await;
	assert!(received.is_err(), "nothing should reach the peer");
}
