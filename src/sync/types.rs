use crate::probe::{BlockRecord, ProbeError};
use std::sync::Arc;

/// Boxed error returned by consumer-supplied data loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types surfaced by the sync engine
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Provider error: {0}")]
	ProviderError(#[source] ProbeError),

	#[error("Block {0} not found")]
	BlockNotFoundError(u64),

	#[error("Data load error at block {block_number}: {source}")]
	DataLoadError {
		block_number: u64,
		#[source]
		source: BoxError,
	},

	#[error("Reorg at block {height} rejected by consumer")]
	ReorgAbort { height: u64 },

	#[error("Configuration error: {0}")]
	ConfigError(String),
}

impl From<ProbeError> for SyncError {
	fn from(err: ProbeError) -> Self {
		match err {
			ProbeError::BlockNotFound(number) => SyncError::BlockNotFoundError(number),
			other => SyncError::ProviderError(other),
		}
	}
}

/// Snapshot of the engine's published state.
///
/// `block_number`, `latest_block` and `data` always change together, when a block has been
/// applied. Everything else is refreshed once per tick.
#[derive(Debug, Clone)]
pub struct SyncState<T> {
	pub block_number: Option<u64>,
	pub latest_block: Option<BlockRecord>,
	pub data: Option<T>,
	pub is_loading: bool,
	pub error: Option<Arc<SyncError>>,
	pub is_stale: bool,
	pub is_paused: bool,
}

impl<T> Default for SyncState<T> {
	fn default() -> Self {
		Self {
			block_number: None,
			latest_block: None,
			data: None,
			is_loading: false,
			error: None,
			is_stale: false,
			is_paused: false,
		}
	}
}

/// Whether a block at `block_number` lags `chain_head` by more than `threshold` blocks.
pub fn is_stale(chain_head: u64, block_number: u64, threshold: u64) -> bool {
	chain_head.saturating_sub(block_number) > threshold
}
