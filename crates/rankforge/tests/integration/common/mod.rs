//! Shared fixtures for engine integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use rankforge::config::ApplyConfig;
use rankforge::{EngineConfig, ManualClock, MemoryStorage, RankForge, RankForgeBuilder, RankSource};

pub const RANKS: &str = r#"
[ranks.member]
weight = 1
default = true
permissions = ["chat.use"]

[ranks.VIP]
prefix = "[VIP] "
suffix = "&6*"
weight = 50
permissions = ["kit.vip", "fly"]

[ranks.admin]
prefix = "&c[Admin]"
weight = 100
permissions = ["*", "-server.stop"]
"#;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn clock() -> Arc<ManualClock> {
	Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid start")))
}

/// Engine config with a short verify delay so settling stays quick.
pub fn config() -> EngineConfig {
	EngineConfig {
		apply: ApplyConfig { verify_delay_ms: 5 },
		..EngineConfig::default()
	}
}

pub fn builder(storage: Arc<MemoryStorage>, clock: Arc<ManualClock>) -> RankForgeBuilder {
	init_tracing();
	RankForge::builder(RankSource::Inline(RANKS.to_string()))
		.config(config())
		.storage(storage)
		.clock(clock)
}

pub fn engine(storage: Arc<MemoryStorage>, clock: Arc<ManualClock>) -> RankForge {
	let (engine, report) = builder(storage, clock).build();
	assert!(report.errors.is_empty(), "{:?}", report.errors);
	engine
}

/// Polls `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	check()
}
