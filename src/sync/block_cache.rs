//! Bounded block record cache.
//!
//! The cache maps block numbers to records so the reorg walk does not refetch ancestors it has
//! already seen. Eviction is first-in first-out by insertion: lookups never refresh an entry's
//! position, and re-inserting an existing number replaces the record in place.

use crate::probe::BlockRecord;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Insertion-ordered block cache with a fixed capacity.
#[derive(Debug, Clone)]
pub struct BlockCache {
	capacity: usize,
	records: HashMap<u64, BlockRecord>,
	/// Block numbers in insertion order, oldest first
	order: VecDeque<u64>,
}

impl BlockCache {
	/// Create a cache holding at most `capacity` records. A zero capacity is treated as one.
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			capacity,
			records: HashMap::with_capacity(capacity),
			order: VecDeque::with_capacity(capacity),
		}
	}

	pub fn get(&self, number: u64) -> Option<&BlockRecord> {
		self.records.get(&number)
	}

	/// Insert `record` under `number`, evicting the oldest entry if the cache is full.
	pub fn put(&mut self, number: u64, record: BlockRecord) {
		if let Some(existing) = self.records.get_mut(&number) {
			*existing = record;
			return;
		}

		if self.records.len() >= self.capacity {
			if let Some(oldest) = self.order.pop_front() {
				self.records.remove(&oldest);
				debug!(evicted = oldest, "Block cache full, evicted oldest entry");
			}
		}

		self.records.insert(number, record);
		self.order.push_back(number);
	}

	pub fn remove(&mut self, number: u64) -> Option<BlockRecord> {
		let removed = self.records.remove(&number)?;
		self.order.retain(|n| *n != number);
		Some(removed)
	}

	/// Evict every entry at or above `height`. Returns the number of evicted entries.
	pub fn invalidate_from(&mut self, height: u64) -> usize {
		let before = self.records.len();
		self.records.retain(|number, _| *number < height);
		self.order.retain(|number| *number < height);
		before - self.records.len()
	}

	pub fn clear(&mut self) {
		self.records.clear();
		self.order.clear();
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
