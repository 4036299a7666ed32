//! Progress tracking for chain tip synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records how far the engine has
//! followed the chain: blocks applied, reorgs seen and rejected, failed cycles, and blocks
//! skipped because a gap outgrew the per-tick window. It keeps counters only, so its memory
//! use stays constant however long the engine runs.

use crate::sync::reorg_walker::ReorgKind;
use tracing::info;

/// Applied blocks between two periodic progress lines.
const LOG_EVERY_BLOCKS: u64 = 100;

/// Service for tracking synchronization progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
	/// First block applied in this session
	first_applied: Option<u64>,
	/// Most recently applied block
	last_applied: Option<u64>,
	blocks_applied: u64,
	reorgs_detected: u64,
	reorgs_rejected: u64,
	window_rejections: u64,
	blocks_skipped: u64,
	failed_cycles: u64,
	/// Value of `blocks_applied` at the last progress line
	last_logged_count: u64,
}

impl SyncProgressTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record that a block was applied
	pub fn record_block(&mut self, number: u64) {
		self.first_applied.get_or_insert(number);
		self.last_applied = Some(number);
		self.blocks_applied += 1;
	}

	/// Record a detected reorg and whether the consumer rejected it
	pub fn record_reorg(&mut self, kind: ReorgKind, rejected: bool) {
		match (kind, rejected) {
			(ReorgKind::SameHeight, false) => self.reorgs_detected += 1,
			(ReorgKind::SameHeight, true) => {
				self.reorgs_detected += 1;
				self.reorgs_rejected += 1;
			}
			(ReorgKind::BeyondWindow, true) => self.window_rejections += 1,
			(ReorgKind::BeyondWindow, false) => {}
		}
	}

	/// Record blocks that were skipped over because the gap exceeded the walk window
	pub fn record_skipped(&mut self, count: u64) {
		self.blocks_skipped += count;
	}

	/// Record a tick that ended in an error
	pub fn record_failure(&mut self) {
		self.failed_cycles += 1;
	}

	/// Log progress every `LOG_EVERY_BLOCKS` applied blocks or when forced
	pub fn log_progress(&mut self, force: bool) {
		let since_last_log = self.blocks_applied - self.last_logged_count;
		let should_log = force || since_last_log >= LOG_EVERY_BLOCKS;

		if should_log && self.blocks_applied > 0 {
			info!("Sync progress: {}", self.get_stats().summary());
			self.last_logged_count = self.blocks_applied;
		}
	}

	/// Get sync statistics as a SyncStats struct
	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			first_applied: self.first_applied,
			last_applied: self.last_applied,
			blocks_applied: self.blocks_applied,
			reorgs_detected: self.reorgs_detected,
			reorgs_rejected: self.reorgs_rejected,
			window_rejections: self.window_rejections,
			blocks_skipped: self.blocks_skipped,
			failed_cycles: self.failed_cycles,
		}
	}
}

/// Statistics about the sync session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
	pub first_applied: Option<u64>,
	pub last_applied: Option<u64>,
	pub blocks_applied: u64,
	/// Same-height reorgs only; window overflows are counted in `blocks_skipped`
	pub reorgs_detected: u64,
	/// Rejected same-height reorgs
	pub reorgs_rejected: u64,
	/// Rejected jumps past the walk window
	pub window_rejections: u64,
	pub blocks_skipped: u64,
	pub failed_cycles: u64,
}

impl SyncStats {
	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		let range = match (self.first_applied, self.last_applied) {
			(Some(first), Some(last)) => format!("blocks {} to {}", first, last),
			_ => "no blocks".to_string(),
		};
		format!(
			"{}: {} applied, {} reorgs ({} rejected), {} failed cycles{}{}",
			range,
			self.blocks_applied,
			self.reorgs_detected,
			self.reorgs_rejected,
			self.failed_cycles,
			if self.blocks_skipped == 0 {
				String::new()
			} else {
				format!(", {} skipped", self.blocks_skipped)
			},
			if self.window_rejections == 0 {
				String::new()
			} else {
				format!(", {} window jumps rejected", self.window_rejections)
			}
		)
	}
}
