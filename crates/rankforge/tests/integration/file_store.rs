use std::sync::Arc;

use rankforge::config::StorageKind;
use rankforge::testing::FakeEntity;
use rankforge::{JoinOutcome, LiveEntity, RankForge, RankSource, SystemClock};

use crate::common::{RANKS, config, init_tracing};

fn file_engine(path: &std::path::Path) -> RankForge {
	init_tracing();
	let mut config = config();
	config.storage.kind = StorageKind::File;
	config.storage.path = path.to_path_buf();
	let (engine, _) = RankForge::builder(RankSource::Inline(RANKS.to_string()))
		.config(config)
		.clock(Arc::new(SystemClock))
		.build();
	engine
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn assignments_survive_a_restart() {
	let dir = tempfile::tempdir().expect("temp dir");
	let path = dir.path().join("data").join("players.toml");
	let steve = FakeEntity::random("Steve");

	let first = file_engine(&path);
	first.set_rank(steve.id(), "Steve", "admin", "30d").expect("admin exists");
	assert!(first.flush().await);

	let text = std::fs::read_to_string(&path).expect("store written");
	assert!(text.contains(&steve.id().to_string()));
	assert!(text.contains("rank = \"admin\""));

	let second = file_engine(&path);
	let outcome = second.join(steve.clone()).await.expect("real id");
	assert!(matches!(outcome, JoinOutcome::Resolved { ref rank, expires: Some(_), fallback: None } if rank == "admin"));
	assert!(steve.has_permission("anything"));

	assert_eq!(second.remove_rank(steve.id()), Ok(true));
	assert!(second.flush().await);
	let text = std::fs::read_to_string(&path).expect("store written");
	assert!(!text.contains(&steve.id().to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rank_file_reload_picks_up_edits() {
	init_tracing();
	let dir = tempfile::tempdir().expect("temp dir");
	let ranks = dir.path().join("ranks.toml");
	std::fs::write(&ranks, RANKS).expect("write ranks");

	let mut config = config();
	config.storage.kind = StorageKind::Memory;
	let (engine, report) = RankForge::builder(RankSource::File(ranks.clone())).config(config).build();
	assert_eq!(report.table.len(), 3);
	let steve = FakeEntity::random("Steve");
	engine.join(steve.clone()).await.expect("real id");
	engine.set_rank(steve.id(), "Steve", "vip", "permanent").expect("VIP exists");

	std::fs::write(&ranks, "[ranks.member]\ndefault = true\n[ranks.VIP]\nweight = 60\npermissions = [\"kit.gold\"]\n")
		.expect("rewrite ranks");
	let report = engine.reload_ranks().await.expect("file readable");
	assert_eq!(report.table.len(), 2);
	assert_eq!(engine.entity_weight(steve.id()), 60);
	assert!(steve.has_permission("kit.gold"));
	assert!(!steve.has_permission("kit.vip"));

	std::fs::remove_file(&ranks).expect("remove ranks");
	assert!(engine.reload_ranks().await.is_err());
	assert_eq!(engine.entity_weight(steve.id()), 60, "a failed reload keeps the current table");
}
