//! Chain probe integration module
//!
//! This module provides the read interface the sync engine uses to observe the chain, the
//! block record type it reasons about, and a JSON-RPC client implementing that interface for
//! Ethereum-style providers.

/// JSON-RPC client for Ethereum-style providers
mod client;
/// Type definitions for probe data structures
mod types;

pub use client::JsonRpcChainProbe;
pub use types::*;

/// Read-only view of an external chain.
///
/// The engine never writes through a probe. Implementations are expected to be cheap to call
/// repeatedly; any caching happens inside the engine.
#[async_trait::async_trait]
pub trait ChainProbe: Send + Sync {
	/// Fetch the current chain head.
	async fn get_head(&self) -> Result<BlockRecord, ProbeError>;

	/// Fetch the block at `number`, failing with [`ProbeError::BlockNotFound`] if the height
	/// does not exist.
	async fn get_block(&self, number: u64) -> Result<BlockRecord, ProbeError>;
}
