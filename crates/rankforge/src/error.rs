//! Error types for the rank engine.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a command-layer operation was refused or failed.
///
/// The `Display` text is meant to be shown to whoever issued the command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RankError {
	/// The nil UUID was supplied where a real entity is required.
	#[error("no entity id was given")]
	NilEntity,

	/// The requested rank is not in the current rank table.
	#[error("rank '{0}' does not exist")]
	UnknownRank(String),

	/// The rank source could not be read.
	#[error("could not reload ranks: {0}")]
	Reload(String),
}

/// Result type for command-layer operations.
pub type Result<T> = std::result::Result<T, RankError>;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("I/O error on {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	#[error("malformed store contents: {0}")]
	Malformed(String),

	#[error("failed to encode store contents: {0}")]
	Encode(String),

	#[error("storage worker failed: {0}")]
	Worker(#[from] rankforge_worker::WorkerError),

	/// Injected or backend-specific failure with no richer classification.
	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

/// Failure reported by the live host when pushing grants or labels.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
	#[error("entity is no longer connected")]
	Offline,

	#[error("host rejected the operation: {0}")]
	Rejected(String),
}

/// Errors loading the engine configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
}

/// One rejected entry in a rank source. Never fatal to the load as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RankLoadError {
	#[error("rank source is not valid TOML: {0}")]
	Parse(String),

	#[error("rank source has no [ranks] table")]
	MissingRanks,

	#[error("invalid rank name '{0}': use 1-32 letters, digits, '.', '_' or '-'")]
	InvalidName(String),

	#[error("duplicate rank name '{0}' (names are case-insensitive)")]
	DuplicateName(String),

	#[error("rank '{rank}' is malformed: {reason}")]
	InvalidEntry { rank: String, reason: String },

	#[error("invalid permission '{token}' in rank '{rank}'")]
	InvalidPermission { rank: String, token: String },

	#[error("duplicate permission '{token}' in rank '{rank}'")]
	DuplicatePermission { rank: String, token: String },
}

/// Failure announcing a change to peers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
	#[error("no peer is listening on the sync channel")]
	NoListeners,

	#[error("sync transport failed: {0}")]
	Transport(String),
}
