//! Types for chain probe integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A block as seen by the sync engine.
///
/// Records are immutable once fetched. When a reorg replaces the block at some height the old
/// record is evicted and a new one takes its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
	/// Block height.
	pub number: u64,
	/// Block timestamp in seconds since the unix epoch.
	pub timestamp: u64,
	/// Block hash as returned by the provider.
	pub hash: String,
	/// Hash of the parent block.
	#[serde(rename = "parentHash")]
	pub parent_hash: String,
}

impl BlockRecord {
	pub fn new(
		number: u64,
		timestamp: u64,
		hash: impl Into<String>,
		parent_hash: impl Into<String>,
	) -> Self {
		Self {
			number,
			timestamp,
			hash: hash.into(),
			parent_hash: parent_hash.into(),
		}
	}

	/// Whether `self` is the direct child of `parent`.
	pub fn extends(&self, parent: &BlockRecord) -> bool {
		self.number == parent.number + 1 && self.parent_hash == parent.hash
	}

	/// Block timestamp as a UTC datetime, if it is representable.
	pub fn produced_at(&self) -> Option<DateTime<Utc>> {
		i64::try_from(self.timestamp)
			.ok()
			.and_then(|secs| DateTime::from_timestamp(secs, 0))
	}
}

/// Block object returned by `eth_getBlockByNumber` with hex-encoded quantities.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcBlock {
	pub number: String,
	pub hash: String,
	#[serde(rename = "parentHash")]
	pub parent_hash: String,
	pub timestamp: String,
}

impl TryFrom<RpcBlock> for BlockRecord {
	type Error = ProbeError;

	fn try_from(block: RpcBlock) -> Result<Self, Self::Error> {
		Ok(BlockRecord {
			number: parse_quantity(&block.number)?,
			timestamp: parse_quantity(&block.timestamp)?,
			hash: block.hash,
			parent_hash: block.parent_hash,
		})
	}
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcErrorObject {
	pub code: i64,
	pub message: String,
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcResponse<R> {
	pub result: Option<R>,
	pub error: Option<RpcErrorObject>,
}

/// Parse a `0x`-prefixed hex quantity.
pub(crate) fn parse_quantity(raw: &str) -> Result<u64, ProbeError> {
	let digits = raw
		.strip_prefix("0x")
		.or_else(|| raw.strip_prefix("0X"))
		.ok_or_else(|| ProbeError::InvalidQuantity(raw.to_string()))?;
	if digits.is_empty() {
		return Err(ProbeError::InvalidQuantity(raw.to_string()));
	}
	u64::from_str_radix(digits, 16).map_err(|_| ProbeError::InvalidQuantity(raw.to_string()))
}

/// Error types for probe operations
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
	#[error("RPC error {code}: {message}")]
	RpcError { code: i64, message: String },

	#[error("No data returned")]
	NoData,

	#[error("Block {0} not found")]
	BlockNotFound(u64),

	#[error("Invalid hex quantity: {0}")]
	InvalidQuantity(String),

	#[error("Provider error: {0}")]
	ProviderError(String),

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),
}
