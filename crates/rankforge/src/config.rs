//! Engine settings, read from a TOML document.
//!
//! Every key is optional:
//!
//! ```toml
//! debug = false
//!
//! [storage]
//! kind = "file"          # or "memory"
//! path = "players.toml"
//!
//! [sync]
//! enabled = false
//! notify = true
//!
//! [presentation]
//! nametag = true
//! roster = true
//!
//! [apply]
//! verify_delay_ms = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::presentation::PresentationOptions;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Logs per-entity steps at `info` instead of `debug`.
	pub debug: bool,
	pub storage: StorageConfig,
	pub sync: SyncConfig,
	pub presentation: PresentationConfig,
	pub apply: ApplyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
	Memory,
	#[default]
	File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
	pub kind: StorageKind,
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			kind: StorageKind::default(),
			path: PathBuf::from("players.toml"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Announce local changes to peers.
	pub enabled: bool,
	/// Log every sent and replayed event at `info`.
	pub notify: bool,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			notify: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
	pub nametag: bool,
	pub roster: bool,
}

impl Default for PresentationConfig {
	fn default() -> Self {
		Self {
			nametag: true,
			roster: true,
		}
	}
}

impl From<PresentationConfig> for PresentationOptions {
	fn from(config: PresentationConfig) -> Self {
		Self {
			nametag: config.nametag,
			roster: config.roster,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
	/// Delay before checking that the host reflects an apply.
	pub verify_delay_ms: u64,
}

impl Default for ApplyConfig {
	fn default() -> Self {
		Self { verify_delay_ms: 100 }
	}
}

impl ApplyConfig {
	pub fn verify_delay(&self) -> Duration {
		Duration::from_millis(self.verify_delay_ms)
	}
}

impl EngineConfig {
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads `path`. A missing file yields the defaults.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		match std::fs::read_to_string(path) {
			Ok(text) => Self::from_toml_str(&text),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
				tracing::info!(path = %path.display(), "config.missing_using_defaults");
				Ok(Self::default())
			}
			Err(error) => Err(ConfigError::Io {
				path: path.to_path_buf(),
				error,
			}),
		}
	}
}
