//! Rank resolution and permission engine.
//!
//! Each connected entity holds exactly one rank at a time. The engine loads
//! the assignment from storage on join, resolves it against the current rank
//! table, pushes the rank's permission grants and display label to the live
//! entity, and moves the entity back to the default rank when an assignment
//! expires or is removed.
//!
//! Start with [`RankForge::builder`].

pub mod apply;
pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod host;
pub mod locks;
pub mod model;
pub mod permission;
pub mod placeholders;
pub mod presentation;
pub mod registry;
pub mod state;
pub mod storage;
pub mod sync;
#[doc(hidden)]
pub mod testing;
pub mod time;

pub use apply::{ApplyReport, ReconcileOutcome};
pub use config::EngineConfig;
pub use engine::{DefaultReason, JoinOutcome, RankForge, RankForgeBuilder, RankSource};
pub use error::{RankError, Result};
pub use hierarchy::{Actor, may_assign};
pub use host::{EntityHandle, LiveEntity, PermissionHost};
pub use model::{EntityId, PlayerRankRecord, RankDefinition};
pub use presentation::{DisplayLabel, NameTag};
pub use registry::{RankLoadReport, RankRegistry, RankTable};
pub use storage::{FileStorage, MemoryStorage, RankStorage};
pub use sync::{ChannelSync, NoSync, SyncBridge, SyncEvent, SyncHub};
pub use time::{Clock, ManualClock, SystemClock};
