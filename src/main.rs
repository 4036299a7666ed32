use chain_tip_sync::probe::{BlockRecord, JsonRpcChainProbe};
use chain_tip_sync::sync::{ReorgKind, SyncConfig, SyncEngine, SyncHooks};
use chain_tip_sync::utils::{format_block_age, short_hash};
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Logs every accepted block and reorg.
struct LoggingHooks;

#[async_trait::async_trait]
impl SyncHooks for LoggingHooks {
	async fn on_block(&self, record: &BlockRecord) {
		let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
		info!(
			"Block {} {} ({})",
			record.number,
			short_hash(&record.hash),
			format_block_age(record.timestamp, now)
		);
	}

	async fn on_reorg(
		&self,
		new_block: &BlockRecord,
		old_block: &BlockRecord,
		kind: ReorgKind,
	) -> bool {
		warn!(
			"{}: {} {} replaces {} {}",
			kind,
			new_block.number,
			short_hash(&new_block.hash),
			old_block.number,
			short_hash(&old_block.hash)
		);
		true
	}

	fn name(&self) -> &'static str {
		"LoggingHooks"
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.init();

	let rpc_url = std::env::var("CHAIN_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
	let config = SyncConfig::from_env().with_tick_on_start(true);
	info!("Following chain head at {}", rpc_url);

	let probe = match JsonRpcChainProbe::new(rpc_url, config.request_timeout) {
		Ok(probe) => Arc::new(probe),
		Err(e) => {
			error!("Failed to create chain probe: {}", e);
			return;
		}
	};

	// Consumer data for this demo is the number of transactions in each block.
	let loader_probe = probe.clone();
	let loader = move |number: u64| {
		let probe = loader_probe.clone();
		async move { probe.block_transaction_count(number).await }
	};

	let engine = match SyncEngine::start(probe, loader, LoggingHooks, config) {
		Ok(engine) => engine,
		Err(e) => {
			error!("Failed to start sync engine: {}", e);
			return;
		}
	};

	let mut updates = engine.subscribe();
	let mut last_reported = None;
	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	loop {
		tokio::select! {
			_ = &mut ctrl_c => {
				info!("Interrupt received, shutting down");
				break;
			}
			changed = updates.changed() => {
				if changed.is_err() {
					warn!("Sync engine stopped unexpectedly");
					break;
				}
				let state = updates.borrow_and_update().clone();
				if let Some(err) = &state.error {
					warn!("Sync error: {}", err);
				}
				if state.block_number != last_reported {
					last_reported = state.block_number;
					if let (Some(number), Some(tx_count)) = (state.block_number, state.data) {
						info!(
							"Synced block {}: {} transactions{}",
							number,
							tx_count,
							if state.is_stale { " (stale)" } else { "" }
						);
					}
				}
			}
		}
	}

	if let Some(stats) = engine.shutdown().await {
		info!("Session summary: {}", stats.summary());
	}
}
