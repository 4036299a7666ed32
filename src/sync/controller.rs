//! Tick-level orchestration of chain tip synchronization.
//!
//! This module defines the `DataSyncController`, which performs one synchronization cycle per
//! call to [`DataSyncController::tick`]. A cycle fetches the chain head, asks the
//! [`ReorgWalker`] which blocks changed, loads consumer data for each of them in order and
//! publishes the resulting [`SyncState`].
//!
//! The controller is the only writer of the published state. Errors never escape a tick: they
//! are logged, published as `SyncState::error` and retried on the next tick. Once the shutdown
//! token is cancelled, nothing more is published, even by a tick that was already in flight.

use crate::probe::{BlockRecord, ChainProbe};
use crate::sync::{
	block_cache::BlockCache,
	config::SyncConfig,
	hooks::{DataLoader, SyncHooks},
	progress_tracker::{SyncProgressTracker, SyncStats},
	reorg_walker::{ReorgEvent, ReorgKind, ReorgWalker},
	types::{SyncError, SyncState, is_stale},
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single tick did.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
	/// Chain head observed by this tick, if the probe answered
	pub chain_head: Option<u64>,
	/// Block numbers applied, in order
	pub applied: Vec<u64>,
	pub reorg: Option<ReorgEvent>,
	pub error: Option<Arc<SyncError>>,
}

/// Runs sync cycles and owns the published state.
pub struct DataSyncController<T> {
	probe: Arc<dyn ChainProbe>,
	loader: Box<dyn DataLoader<T>>,
	hooks: Box<dyn SyncHooks>,

	walker: ReorgWalker,
	cache: BlockCache,
	stale_threshold: u64,

	/// Last block whose data was published
	last_processed: Option<BlockRecord>,
	/// Freshest chain head seen
	chain_head: Option<u64>,

	state_tx: watch::Sender<SyncState<T>>,
	shutdown: CancellationToken,
	progress: SyncProgressTracker,
}

impl<T: Clone + Send + Sync + 'static> DataSyncController<T> {
	pub fn new(
		probe: Arc<dyn ChainProbe>,
		loader: impl DataLoader<T> + 'static,
		hooks: impl SyncHooks + 'static,
		config: &SyncConfig,
		shutdown: CancellationToken,
	) -> Self {
		let (state_tx, _) = watch::channel(SyncState::default());

		Self {
			probe,
			loader: Box::new(loader),
			hooks: Box::new(hooks),
			walker: ReorgWalker::new(config.max_blocks_per_update),
			cache: BlockCache::new(config.cache_capacity),
			stale_threshold: config.stale_threshold,
			last_processed: None,
			chain_head: None,
			state_tx,
			shutdown,
			progress: SyncProgressTracker::new(),
		}
	}

	/// Subscribe to state changes.
	pub fn subscribe(&self) -> watch::Receiver<SyncState<T>> {
		self.state_tx.subscribe()
	}

	/// Current published state.
	pub fn state(&self) -> SyncState<T> {
		self.state_tx.borrow().clone()
	}

	pub fn last_processed(&self) -> Option<&BlockRecord> {
		self.last_processed.as_ref()
	}

	pub fn stats(&self) -> SyncStats {
		self.progress.get_stats()
	}

	pub fn is_disposed(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Run one sync cycle.
	///
	/// Callers must not run two ticks concurrently; [`LifecycleManager`] guarantees this by
	/// awaiting each tick before scheduling the next.
	///
	/// [`LifecycleManager`]: crate::sync::lifecycle::LifecycleManager
	pub async fn tick(&mut self) -> TickOutcome {
		let mut outcome = TickOutcome::default();
		if self.is_disposed() {
			return outcome;
		}

		self.publish(|state| state.is_loading = true);

		let result = self.run_cycle(&mut outcome).await;
		let stale = self.staleness();

		match result {
			Ok(()) => {
				self.publish(|state| {
					state.is_loading = false;
					state.error = None;
					state.is_stale = stale;
				});
			}
			Err(err) => {
				warn!("Sync cycle failed: {}", err);
				self.progress.record_failure();
				let err = Arc::new(err);
				outcome.error = Some(err.clone());
				self.publish(|state| {
					state.is_loading = false;
					state.error = Some(err);
					state.is_stale = stale;
				});
			}
		}

		self.progress.log_progress(false);
		outcome
	}

	/// Run a tick outside the regular schedule.
	pub async fn refresh(&mut self) -> TickOutcome {
		debug!("Manual refresh requested");
		self.tick().await
	}

	/// Forget the last processed block and every cached record, so the next tick bootstraps
	/// from the head again. Published state is kept until that tick applies a block.
	pub fn reset(&mut self) {
		info!(
			last = ?self.last_processed.as_ref().map(|b| b.number),
			"Resetting sync position"
		);
		self.last_processed = None;
		self.cache.clear();
	}

	pub fn set_paused(&mut self, paused: bool) {
		self.publish(|state| state.is_paused = paused);
	}

	async fn run_cycle(&mut self, outcome: &mut TickOutcome) -> Result<(), SyncError> {
		let head = self.probe.get_head().await?;
		debug!(number = head.number, hash = %head.hash, "Fetched chain head");
		self.chain_head = Some(head.number);
		outcome.chain_head = Some(head.number);

		if self.is_disposed() {
			debug!("Engine disposed, skipping walk");
			return Ok(());
		}

		let walk = self
			.walker
			.walk(
				self.last_processed.as_ref(),
				head,
				&mut self.cache,
				self.probe.as_ref(),
				self.hooks.as_ref(),
			)
			.await?;

		if let Some(event) = &walk.reorg {
			self.progress.record_reorg(event.kind, walk.aborted);
			if event.kind == ReorgKind::BeyondWindow && !walk.aborted {
				self.progress
					.record_skipped(event.new_block.number.saturating_sub(event.old_block.number + 1));
			}
			outcome.reorg = Some(event.clone());
			if walk.aborted {
				return Err(SyncError::ReorgAbort {
					height: event.new_block.number,
				});
			}
		}

		for record in walk.plan {
			let data = self.loader.load(record.number).await.map_err(|source| {
				SyncError::DataLoadError {
					block_number: record.number,
					source,
				}
			})?;

			if self.is_disposed() {
				debug!(number = record.number, "Engine disposed, dropping loaded data");
				return Ok(());
			}

			outcome.applied.push(record.number);
			self.apply(record, data).await;
		}

		Ok(())
	}

	/// Commit a block: cache it, publish its data and notify hooks.
	async fn apply(&mut self, record: BlockRecord, data: T) {
		let number = record.number;
		let stale = is_stale(
			self.chain_head.unwrap_or(number),
			number,
			self.stale_threshold,
		);

		self.cache.put(number, record.clone());
		let published = record.clone();
		self.publish(move |state| {
			state.block_number = Some(number);
			state.latest_block = Some(published);
			state.data = Some(data);
			state.is_stale = stale;
		});

		debug!(number, hash = %record.hash, stale, "Applied block");
		self.progress.record_block(number);
		self.hooks.on_block(&record).await;
		self.last_processed = Some(record);
	}

	fn staleness(&self) -> bool {
		match (self.chain_head, self.last_processed.as_ref()) {
			(Some(head), Some(last)) => is_stale(head, last.number, self.stale_threshold),
			_ => false,
		}
	}

	fn publish(&self, update: impl FnOnce(&mut SyncState<T>)) {
		if self.is_disposed() {
			return;
		}
		self.state_tx.send_modify(update);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sync::test_utils::{MockChain, RecordingHooks, block, hash};
	use crate::sync::types::BoxError;
	use std::collections::HashSet;
	use std::sync::Mutex;

	struct Harness {
		chain: Arc<MockChain>,
		hooks: Arc<RecordingHooks>,
		failing: Arc<Mutex<HashSet<u64>>>,
		controller: DataSyncController<u64>,
		shutdown: CancellationToken,
	}

	fn harness(chain: MockChain, config: SyncConfig) -> Harness {
		let chain = Arc::new(chain);
		let hooks = Arc::new(RecordingHooks::accepting());
		let failing = Arc::new(Mutex::new(HashSet::new()));
		let shutdown = CancellationToken::new();

		let loader_failing = failing.clone();
		let loader = move |n: u64| {
			let failing = loader_failing.clone();
			async move {
				if failing.lock().unwrap().contains(&n) {
					Err::<u64, BoxError>(format!("no data for {n}").into())
				} else {
					Ok(n * 10)
				}
			}
		};

		let controller = DataSyncController::new(
			chain.clone(),
			loader,
			hooks.clone(),
			&config,
			shutdown.clone(),
		);

		Harness {
			chain,
			hooks,
			failing,
			controller,
			shutdown,
		}
	}

	#[tokio::test]
	async fn cold_start_applies_only_the_head() {
		let mut h = harness(MockChain::linear(1, 42, "a"), SyncConfig::default());

		let outcome = h.controller.tick().await;

		assert_eq!(outcome.applied, vec![42]);
		assert_eq!(h.hooks.block_numbers(), vec![42]);
		let state = h.controller.state();
		assert_eq!(state.block_number, Some(42));
		assert_eq!(state.latest_block, Some(block("a", 42)));
		assert_eq!(state.data, Some(420));
		assert!(!state.is_loading);
		assert!(state.error.is_none());
		assert!(!state.is_stale);
		assert_eq!(h.chain.block_calls(), 0);
	}

	#[tokio::test]
	async fn unchanged_head_is_a_no_op() {
		let mut h = harness(MockChain::linear(1, 10, "a"), SyncConfig::default());
		h.controller.tick().await;

		let outcome = h.controller.tick().await;

		assert!(outcome.applied.is_empty());
		assert_eq!(h.hooks.block_numbers(), vec![10]);
		assert_eq!(h.controller.state().block_number, Some(10));
	}

	#[tokio::test]
	async fn single_height_reorg_scenario() {
		let chain = MockChain::new();
		chain.push(BlockRecord::new(10, 120, "hashA", hash("a", 9)));
		let mut h = harness(chain, SyncConfig::default());

		h.controller.tick().await;
		h.chain.push(BlockRecord::new(11, 132, "hashB", "hashA"));
		h.controller.tick().await;
		h.chain.push(BlockRecord::new(11, 133, "hashC", "hashX"));
		let outcome = h.controller.tick().await;

		let blocks = h.hooks.blocks();
		let seen: Vec<(u64, &str)> = blocks.iter().map(|b| (b.number, b.hash.as_str())).collect();
		assert_eq!(seen, vec![(10, "hashA"), (11, "hashB"), (11, "hashC")]);

		let reorgs = h.hooks.reorgs();
		assert_eq!(reorgs.len(), 1);
		assert_eq!(reorgs[0].0.hash, "hashC");
		assert_eq!(reorgs[0].1.hash, "hashB");
		assert_eq!(reorgs[0].2, ReorgKind::SameHeight);

		assert_eq!(outcome.reorg.unwrap().kind, ReorgKind::SameHeight);
		let state = h.controller.state();
		assert_eq!(state.latest_block.unwrap().hash, "hashC");
		assert!(!state.is_stale);
		assert_eq!(h.controller.stats().reorgs_detected, 1);
	}

	#[tokio::test]
	async fn rejected_reorg_leaves_block_number_unchanged() {
		let mut h = harness(MockChain::linear(1, 11, "a"), SyncConfig::default());
		h.controller.tick().await;
		h.hooks.set_accept(false);
		h.chain.fork_at(11, "b", 12);

		let outcome = h.controller.tick().await;

		assert!(outcome.applied.is_empty());
		let state = h.controller.state();
		assert_eq!(state.block_number, Some(11));
		assert_eq!(state.latest_block, Some(block("a", 11)));
		assert!(matches!(
			state.error.as_deref(),
			Some(SyncError::ReorgAbort { height: 11 })
		));
		assert_eq!(h.controller.stats().reorgs_rejected, 1);

		// Accepting on a later tick splices the new branch in.
		h.hooks.set_accept(true);
		let outcome = h.controller.tick().await;
		assert_eq!(outcome.applied, vec![11, 12]);
		assert_eq!(h.controller.state().latest_block, Some(h.chain.block(12)));
		assert!(h.controller.state().error.is_none());
	}

	#[tokio::test]
	async fn loader_failure_stops_at_failing_block_and_retries() {
		let mut h = harness(MockChain::linear(1, 10, "a"), SyncConfig::default());
		h.controller.tick().await;
		h.chain.extend_to(13, "a");
		h.failing.lock().unwrap().insert(12);

		let outcome = h.controller.tick().await;

		assert_eq!(outcome.applied, vec![11]);
		let state = h.controller.state();
		assert_eq!(state.block_number, Some(11));
		assert_eq!(state.data, Some(110));
		assert!(matches!(
			state.error.as_deref(),
			Some(SyncError::DataLoadError { block_number: 12, .. })
		));

		h.failing.lock().unwrap().clear();
		let outcome = h.controller.tick().await;

		assert_eq!(outcome.applied, vec![12, 13]);
		assert_eq!(h.hooks.block_numbers(), vec![10, 11, 12, 13]);
		let state = h.controller.state();
		assert_eq!(state.block_number, Some(13));
		assert!(state.error.is_none());
	}

	#[tokio::test]
	async fn provider_outage_is_published_and_recovered() {
		let mut h = harness(MockChain::linear(1, 10, "a"), SyncConfig::default());
		h.controller.tick().await;
		h.chain.set_unreachable(true);

		let outcome = h.controller.tick().await;

		assert!(outcome.chain_head.is_none());
		let state = h.controller.state();
		assert!(matches!(
			state.error.as_deref(),
			Some(SyncError::ProviderError(_))
		));
		assert_eq!(state.block_number, Some(10));
		assert!(!state.is_loading);

		h.chain.set_unreachable(false);
		h.chain.extend_to(11, "a");
		h.controller.tick().await;
		let state = h.controller.state();
		assert!(state.error.is_none());
		assert_eq!(state.block_number, Some(11));
		assert_eq!(h.controller.stats().failed_cycles, 1);
	}

	#[tokio::test]
	async fn staleness_follows_gap_to_live_head() {
		let config = SyncConfig::default().with_stale_threshold(5);
		let mut h = harness(MockChain::linear(1, 99, "a"), config);
		h.controller.tick().await;
		h.chain.extend_to(108, "a");
		h.failing.lock().unwrap().insert(105);

		let mut rx = h.controller.subscribe();
		let outcome = h.controller.tick().await;
		assert_eq!(outcome.applied, vec![100, 101, 102, 103, 104]);

		// After #104 the gap to #108 is within the threshold.
		let state = rx.borrow_and_update().clone();
		assert_eq!(state.block_number, Some(104));
		assert!(!state.is_stale);
	}

	#[tokio::test]
	async fn block_applied_far_behind_head_is_stale() {
		let config = SyncConfig::default().with_stale_threshold(5);
		let mut h = harness(MockChain::linear(1, 99, "a"), config);
		h.controller.tick().await;
		h.chain.extend_to(108, "a");
		h.failing.lock().unwrap().insert(101);

		h.controller.tick().await;

		let state = h.controller.state();
		assert_eq!(state.block_number, Some(100));
		assert!(state.is_stale);
	}

	#[tokio::test]
	async fn long_gap_jumps_to_recent_window() {
		let config = SyncConfig::default().with_max_blocks_per_update(10);
		let mut h = harness(MockChain::linear(1, 10, "a"), config);
		h.controller.tick().await;
		h.chain.extend_to(40, "a");

		let outcome = h.controller.tick().await;

		assert_eq!(outcome.applied, (31..=40).collect::<Vec<_>>());
		assert_eq!(outcome.reorg.unwrap().kind, ReorgKind::BeyondWindow);
		assert_eq!(h.controller.stats().blocks_skipped, 20);
		assert_eq!(h.controller.state().block_number, Some(40));
	}

	#[tokio::test]
	async fn reset_bootstraps_from_head_again() {
		let mut h = harness(MockChain::linear(1, 10, "a"), SyncConfig::default());
		h.controller.tick().await;
		h.chain.extend_to(15, "a");

		h.controller.reset();
		let outcome = h.controller.tick().await;

		assert_eq!(outcome.applied, vec![15]);
		assert_eq!(h.controller.last_processed(), Some(&block("a", 15)));
	}

	#[tokio::test]
	async fn nothing_is_published_after_disposal() {
		let mut h = harness(MockChain::linear(1, 10, "a"), SyncConfig::default());
		h.controller.tick().await;
		h.chain.extend_to(12, "a");
		h.shutdown.cancel();

		let outcome = h.controller.tick().await;

		assert!(outcome.applied.is_empty());
		assert_eq!(h.controller.state().block_number, Some(10));
		assert_eq!(h.hooks.block_numbers(), vec![10]);
	}

	#[tokio::test]
	async fn disposal_during_load_discards_result() {
		let chain = Arc::new(MockChain::linear(1, 10, "a"));
		let hooks = Arc::new(RecordingHooks::accepting());
		let shutdown = CancellationToken::new();
		let token = shutdown.clone();
		let loader = move |n: u64| {
			let token = token.clone();
			async move {
				// The engine is torn down while this load is in flight.
				if n == 11 {
					token.cancel();
				}
				Ok::<u64, BoxError>(n)
			}
		};
		let mut controller = DataSyncController::new(
			chain.clone(),
			loader,
			hooks.clone(),
			&SyncConfig::default(),
			shutdown,
		);
		controller.tick().await;
		chain.extend_to(11, "a");

		let outcome = controller.tick().await;

		assert!(outcome.applied.is_empty());
		let state = controller.state();
		assert_eq!(state.block_number, Some(10));
		assert!(state.is_loading, "final publish is suppressed after disposal");
		assert_eq!(hooks.block_numbers(), vec![10]);
	}

	/// Probe that tears the engine down once the head has been fetched.
	struct DisposeOnHead {
		chain: Arc<MockChain>,
		shutdown: CancellationToken,
		armed: std::sync::atomic::AtomicBool,
	}

	#[async_trait::async_trait]
	impl ChainProbe for DisposeOnHead {
		async fn get_head(&self) -> Result<BlockRecord, crate::probe::ProbeError> {
			let head = self.chain.get_head().await?;
			if self.armed.load(std::sync::atomic::Ordering::SeqCst) {
				self.shutdown.cancel();
			}
			Ok(head)
		}

		async fn get_block(&self, number: u64) -> Result<BlockRecord, crate::probe::ProbeError> {
			self.chain.get_block(number).await
		}
	}

	#[tokio::test]
	async fn disposal_after_head_fetch_skips_reorg_hooks() {
		let chain = Arc::new(MockChain::linear(1, 11, "a"));
		let hooks = Arc::new(RecordingHooks::accepting());
		let shutdown = CancellationToken::new();
		let probe = Arc::new(DisposeOnHead {
			chain: chain.clone(),
			shutdown: shutdown.clone(),
			armed: std::sync::atomic::AtomicBool::new(false),
		});
		let loader = |n: u64| async move { Ok::<u64, BoxError>(n) };
		let mut controller = DataSyncController::new(
			probe.clone(),
			loader,
			hooks.clone(),
			&SyncConfig::default(),
			shutdown,
		);
		controller.tick().await;

		chain.fork_at(11, "b", 12);
		probe.armed.store(true, std::sync::atomic::Ordering::SeqCst);
		let outcome = controller.tick().await;

		assert_eq!(outcome.chain_head, Some(12));
		assert!(outcome.reorg.is_none());
		assert!(outcome.applied.is_empty());
		assert!(hooks.reorgs().is_empty());
		assert_eq!(hooks.block_numbers(), vec![11]);
		assert_eq!(chain.block_calls(), 0);
	}

	#[tokio::test]
	async fn block_callbacks_stay_ordered_across_reorgs() {
		let mut h = harness(MockChain::linear(1, 5, "a"), SyncConfig::default());
		h.controller.tick().await;
		h.chain.extend_to(8, "a");
		h.controller.tick().await;
		h.chain.fork_at(8, "b", 8);
		h.controller.tick().await;
		h.chain.extend_to(11, "b");
		h.controller.tick().await;
		h.controller.tick().await;

		let numbers = h.hooks.block_numbers();
		assert_eq!(numbers, vec![5, 6, 7, 8, 8, 9, 10, 11]);

		let mut repeats = 0;
		for pair in numbers.windows(2) {
			assert!(pair[1] >= pair[0], "callbacks went backwards: {numbers:?}");
			if pair[1] == pair[0] {
				repeats += 1;
			}
		}
		assert_eq!(repeats, h.hooks.reorgs().len());
	}
}
