//! Consumer seams of the sync engine.
//!
//! This module defines the traits through which consumers plug into a running engine: the
//! [`DataLoader`] that derives application data for a block, and the [`SyncHooks`] that observe
//! accepted blocks and decide on detected reorgs. A [`HookDispatcher`] fans callbacks out to
//! several hook sets so logging, persistence and policy can be registered independently.

use crate::probe::BlockRecord;
use crate::sync::reorg_walker::ReorgKind;
use crate::sync::types::BoxError;
use std::future::Future;
use std::sync::Arc;

/// Loads consumer data for a single block.
///
/// Any error aborts the current tick at that block and is published as the tick's error.
#[async_trait::async_trait]
pub trait DataLoader<T>: Send + Sync {
	async fn load(&self, block_number: u64) -> Result<T, BoxError>;
}

#[async_trait::async_trait]
impl<T, F, Fut, E> DataLoader<T> for F
where
	F: Fn(u64) -> Fut + Send + Sync,
	Fut: Future<Output = Result<T, E>> + Send + 'static,
	E: Into<BoxError> + 'static,
	T: Send + 'static,
{
	async fn load(&self, block_number: u64) -> Result<T, BoxError> {
		(self)(block_number).await.map_err(Into::into)
	}
}

/// Callbacks invoked by the engine while applying blocks.
///
/// Both methods have defaults, so implementors only override what they need.
#[async_trait::async_trait]
pub trait SyncHooks: Send + Sync {
	/// Called once per newly accepted block, in order, after its state has been published.
	async fn on_block(&self, _record: &BlockRecord) {}

	/// Called when the walk finds that `old_block` is no longer part of the provider's chain.
	///
	/// Returning `false` rejects the new branch for this tick.
	async fn on_reorg(
		&self,
		_new_block: &BlockRecord,
		_old_block: &BlockRecord,
		_kind: ReorgKind,
	) -> bool {
		true
	}

	/// Get the name of this hook set for logging and diagnostics.
	fn name(&self) -> &'static str {
		"SyncHooks"
	}
}

#[async_trait::async_trait]
impl<H: SyncHooks + ?Sized> SyncHooks for Arc<H> {
	async fn on_block(&self, record: &BlockRecord) {
		(**self).on_block(record).await
	}

	async fn on_reorg(
		&self,
		new_block: &BlockRecord,
		old_block: &BlockRecord,
		kind: ReorgKind,
	) -> bool {
		(**self).on_reorg(new_block, old_block, kind).await
	}

	fn name(&self) -> &'static str {
		(**self).name()
	}
}

/// Hooks that observe nothing and accept every reorg.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SyncHooks for NoopHooks {
	fn name(&self) -> &'static str {
		"NoopHooks"
	}
}

/// Dispatcher that forwards callbacks to multiple hook sets.
///
/// Hooks are called in registration order. A reorg is accepted only if every hook accepts it.
#[derive(Default)]
pub struct HookDispatcher {
	hooks: Vec<Box<dyn SyncHooks>>,
}

impl HookDispatcher {
	pub fn new() -> Self {
		Self { hooks: Vec::new() }
	}

	pub fn register(&mut self, hooks: Box<dyn SyncHooks>) {
		self.hooks.push(hooks);
	}

	pub fn with(mut self, hooks: impl SyncHooks + 'static) -> Self {
		self.register(Box::new(hooks));
		self
	}

	pub fn len(&self) -> usize {
		self.hooks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.hooks.is_empty()
	}
}

#[async_trait::async_trait]
impl SyncHooks for HookDispatcher {
	async fn on_block(&self, record: &BlockRecord) {
		for hooks in &self.hooks {
			hooks.on_block(record).await;
		}
	}

	async fn on_reorg(
		&self,
		new_block: &BlockRecord,
		old_block: &BlockRecord,
		kind: ReorgKind,
	) -> bool {
		let mut accepted = true;
		// Every hook observes the reorg even after one has rejected it.
		for hooks in &self.hooks {
			if !hooks.on_reorg(new_block, old_block, kind).await {
				tracing::debug!("Hook {} rejected reorg at block {}", hooks.name(), new_block.number);
				accepted = false;
			}
		}
		accepted
	}

	fn name(&self) -> &'static str {
		"HookDispatcher"
	}
}
