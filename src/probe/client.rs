//!
//! JSON-RPC client for Ethereum-style chain providers.
//!
//! This module provides an async [`ChainProbe`] implementation over HTTP. It reads the chain head
//! and individual blocks with `eth_getBlockByNumber`, and exposes a per-block transaction count
//! query that consumers can use as a cheap data loader. All methods are async and designed for
//! use with Tokio.

use super::types::*;
use super::ChainProbe;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC chain probe
pub struct JsonRpcChainProbe {
	/// The underlying HTTP client for RPC calls.
	http_client: Client,
	/// The provider's HTTP endpoint.
	rpc_url: String,
	/// Monotonic JSON-RPC request id.
	next_id: AtomicU64,
}

impl JsonRpcChainProbe {
	/// Create a new probe.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint of the provider.
	/// * `request_timeout` - Upper bound for each individual request.
	///
	/// # Errors
	/// Returns `ProbeError::HttpError` if the HTTP client cannot be built.
	pub fn new(rpc_url: String, request_timeout: Duration) -> Result<Self, ProbeError> {
		let http_client = Client::builder().timeout(request_timeout).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			next_id: AtomicU64::new(1),
		})
	}

	/// The endpoint this probe talks to.
	pub fn rpc_url(&self) -> &str {
		&self.rpc_url
	}

	/// Number of transactions in the block at `number`.
	///
	/// # Errors
	/// Returns `ProbeError::BlockNotFound` if the provider has no block at that height.
	pub async fn block_transaction_count(&self, number: u64) -> Result<u64, ProbeError> {
		let count: Option<String> = self
			.call(
				"eth_getBlockTransactionCountByNumber",
				json!([format!("{number:#x}")]),
			)
			.await?;

		match count {
			Some(raw) => parse_quantity(&raw),
			None => Err(ProbeError::BlockNotFound(number)),
		}
	}

	async fn block_by_tag(&self, tag: String) -> Result<Option<BlockRecord>, ProbeError> {
		let block: Option<RpcBlock> = self
			.call("eth_getBlockByNumber", json!([tag, false]))
			.await?;
		block.map(BlockRecord::try_from).transpose()
	}

	/// Execute a JSON-RPC call.
	///
	/// # Arguments
	/// * `method` - The RPC method name.
	/// * `params` - Positional parameters for the call.
	///
	/// # Returns
	/// The `result` member decoded as `R`, or `None` when the provider returned `null`.
	pub async fn call<R: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<Option<R>, ProbeError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		debug!(method, id, "Sending RPC request");

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(ProbeError::ProviderError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let body: serde_json::Value = response.json().await?;
		decode_response(body)
	}
}

/// Split a JSON-RPC envelope into its result or error.
fn decode_response<R: DeserializeOwned>(body: serde_json::Value) -> Result<Option<R>, ProbeError> {
	let envelope: RpcResponse<R> = serde_json::from_value(body)?;

	if let Some(error) = envelope.error {
		return Err(ProbeError::RpcError {
			code: error.code,
			message: error.message,
		});
	}

	Ok(envelope.result)
}

#[async_trait::async_trait]
impl ChainProbe for JsonRpcChainProbe {
	async fn get_head(&self) -> Result<BlockRecord, ProbeError> {
		self.block_by_tag("latest".to_string())
			.await?
			.ok_or(ProbeError::NoData)
	}

	async fn get_block(&self, number: u64) -> Result<BlockRecord, ProbeError> {
		self.block_by_tag(format!("{number:#x}"))
			.await?
			.ok_or(ProbeError::BlockNotFound(number))
	}
}
