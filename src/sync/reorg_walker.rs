//! Ancestry walk between the last processed block and a fresh chain head.
//!
//! On every tick the engine knows the last block it applied (`L`) and the head it just fetched
//! (`H`). The walk goes back from `H` one parent at a time until it either links up with `L`,
//! lands on `L`'s height with a different hash, or fills the per-tick window:
//!
//! ```text
//! intact:      L(10) <- 11 <- 12 <- H(13)        plan [11, 12, 13]
//! same height: L(11,B)    11(C) <- 12 <- H(13)   reorg at 11, plan [11(C), 12, 13]
//! window:      L(10) ... 21 <- ... <- H(30)      window of 10, plan [21..=30]
//! ```
//!
//! Reorgs are spliced at `L`'s height only. The walk never looks below `L`, so a divergence
//! deeper than one block shows up as a same-height reorg at `L` and consumers that need a
//! clean slate can resync from the head.

use crate::probe::{BlockRecord, ChainProbe, ProbeError};
use crate::sync::block_cache::BlockCache;
use crate::sync::hooks::SyncHooks;
use crate::sync::types::SyncError;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// How the walk lost track of the last processed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgKind {
	/// The provider holds a different block at the last processed height.
	SameHeight,
	/// The window filled up before reaching the last processed height, so ancestry is unknown.
	BeyondWindow,
}

impl std::fmt::Display for ReorgKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::SameHeight => write!(f, "same-height reorg"),
			Self::BeyondWindow => write!(f, "reorg beyond walk-back window"),
		}
	}
}

/// A detected divergence from the last processed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgEvent {
	pub kind: ReorgKind,
	/// Oldest block of the new branch included in the plan
	pub new_block: BlockRecord,
	/// The last processed block
	pub old_block: BlockRecord,
}

/// Result of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
	/// Blocks to apply, oldest first
	pub plan: Vec<BlockRecord>,
	pub reorg: Option<ReorgEvent>,
	/// Set when a hook rejected the reorg; the plan is then empty
	pub aborted: bool,
}

impl WalkOutcome {
	fn replay(plan: impl Into<Vec<BlockRecord>>) -> Self {
		Self {
			plan: plan.into(),
			..Default::default()
		}
	}

	pub fn reorg_detected(&self) -> bool {
		self.reorg.is_some()
	}
}

/// Computes replay plans bounded to a fixed number of blocks per tick.
#[derive(Debug, Clone)]
pub struct ReorgWalker {
	max_blocks_per_update: usize,
}

impl ReorgWalker {
	pub fn new(max_blocks_per_update: usize) -> Self {
		Self {
			max_blocks_per_update: max_blocks_per_update.max(1),
		}
	}

	/// Work out which blocks to apply to move from `last` to `head`.
	///
	/// `head` must come straight from the probe. It is written to the cache along with every
	/// ancestor fetched during the walk.
	pub async fn walk<P, H>(
		&self,
		last: Option<&BlockRecord>,
		head: BlockRecord,
		cache: &mut BlockCache,
		probe: &P,
		hooks: &H,
	) -> Result<WalkOutcome, SyncError>
	where
		P: ChainProbe + ?Sized,
		H: SyncHooks + ?Sized,
	{
		cache.put(head.number, head.clone());

		let Some(last) = last else {
			debug!(head = head.number, "Cold start, bootstrapping from head");
			return Ok(WalkOutcome::replay(vec![head]));
		};

		if head.number < last.number {
			debug!(
				head = head.number,
				last = last.number,
				"Head is behind the last processed block, waiting for it to catch up"
			);
			return Ok(WalkOutcome::default());
		}
		if head.number == last.number && head.hash == last.hash {
			return Ok(WalkOutcome::default());
		}

		let mut current = head.clone();
		let mut plan = VecDeque::from([head]);

		loop {
			if current.number == last.number {
				if current.hash == last.hash {
					// The child did not link to `last` but the provider still serves it at
					// this height, so `last` stays canonical.
					plan.pop_front();
					return Ok(WalkOutcome::replay(plan));
				}
				return Ok(self
					.diverged(ReorgKind::SameHeight, plan, current, last, hooks)
					.await);
			}

			if current.extends(last) {
				return Ok(WalkOutcome::replay(plan));
			}

			if plan.len() >= self.max_blocks_per_update {
				let oldest = plan.front().cloned().unwrap_or(current);
				return Ok(self
					.diverged(ReorgKind::BeyondWindow, plan, oldest, last, hooks)
					.await);
			}

			let parent = fetch_parent(&current, cache, probe).await?;
			plan.push_front(parent.clone());
			current = parent;
		}
	}

	async fn diverged<H: SyncHooks + ?Sized>(
		&self,
		kind: ReorgKind,
		plan: VecDeque<BlockRecord>,
		new_block: BlockRecord,
		last: &BlockRecord,
		hooks: &H,
	) -> WalkOutcome {
		warn!(
			kind = %kind,
			height = new_block.number,
			new_hash = %new_block.hash,
			old_height = last.number,
			old_hash = %last.hash,
			"Reorg detected"
		);

		let event = ReorgEvent {
			kind,
			new_block,
			old_block: last.clone(),
		};

		if !hooks.on_reorg(&event.new_block, &event.old_block, kind).await {
			warn!(height = event.new_block.number, "New branch rejected by consumer");
			return WalkOutcome {
				plan: Vec::new(),
				reorg: Some(event),
				aborted: true,
			};
		}

		WalkOutcome {
			plan: plan.into(),
			reorg: Some(event),
			aborted: false,
		}
	}
}

/// Fetch the parent of `child`, preferring the cache.
///
/// A cached record whose hash does not match `child.parent_hash` belongs to an abandoned branch
/// and is replaced by a fresh fetch.
async fn fetch_parent<P: ChainProbe + ?Sized>(
	child: &BlockRecord,
	cache: &mut BlockCache,
	probe: &P,
) -> Result<BlockRecord, SyncError> {
	let number = child
		.number
		.checked_sub(1)
		.ok_or(SyncError::BlockNotFoundError(0))?;

	if let Some(cached) = cache.get(number) {
		if cached.hash == child.parent_hash {
			return Ok(cached.clone());
		}
		debug!(number, "Cached block is not on the current branch, refetching");
		cache.remove(number);
	}

	let parent = probe.get_block(number).await?;
	if parent.number != number {
		return Err(SyncError::ProviderError(ProbeError::ProviderError(format!(
			"requested block {} but provider returned {}",
			number, parent.number
		))));
	}
	if parent.hash != child.parent_hash {
		debug!(
			number,
			"Provider branch moved during the walk, following the provider"
		);
	}

	cache.put(number, parent.clone());
	Ok(parent)
}
