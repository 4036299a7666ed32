//! In-memory chain and hook doubles shared by the sync tests.

use crate::probe::{BlockRecord, ChainProbe, ProbeError};
use crate::sync::hooks::SyncHooks;
use crate::sync::reorg_walker::ReorgKind;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) fn hash(tag: &str, number: u64) -> String {
	format!("0x{tag}{number}")
}

/// Block `number` of a linear branch named `tag`.
pub(crate) fn block(tag: &str, number: u64) -> BlockRecord {
	BlockRecord::new(
		number,
		number * 12,
		hash(tag, number),
		hash(tag, number.saturating_sub(1)),
	)
}

#[derive(Default)]
struct MockState {
	blocks: BTreeMap<u64, BlockRecord>,
	head: u64,
}

/// Scriptable chain probe.
#[derive(Default)]
pub(crate) struct MockChain {
	state: Mutex<MockState>,
	unreachable: AtomicBool,
	head_calls: AtomicUsize,
	block_calls: AtomicUsize,
}

impl MockChain {
	pub fn new() -> Self {
		Self::default()
	}

	/// Chain of blocks `from..=to` on branch `tag`, with the head at `to`.
	pub fn linear(from: u64, to: u64, tag: &str) -> Self {
		let chain = Self::new();
		for number in from..=to {
			chain.push(block(tag, number));
		}
		chain
	}

	/// Insert or replace a block and move the head to it.
	pub fn push(&self, record: BlockRecord) {
		let mut state = self.state.lock().unwrap();
		state.head = record.number;
		state.blocks.insert(record.number, record);
	}

	/// Extend the current head with blocks on branch `tag` up to `to`.
	pub fn extend_to(&self, to: u64, tag: &str) {
		let head = self.head();
		let mut parent_hash = head.hash;
		for number in head.number + 1..=to {
			let record = BlockRecord::new(number, number * 12, hash(tag, number), parent_hash);
			parent_hash = record.hash.clone();
			self.push(record);
		}
	}

	/// Replace everything from `height` upwards with a branch `tag` reaching `to`.
	pub fn fork_at(&self, height: u64, tag: &str, to: u64) {
		{
			let mut state = self.state.lock().unwrap();
			state.blocks.retain(|number, _| *number < height);
		}
		let parent_hash = self
			.state
			.lock()
			.unwrap()
			.blocks
			.get(&(height - 1))
			.map(|b| b.hash.clone())
			.unwrap_or_else(|| hash(tag, height - 1));
		self.push(BlockRecord::new(
			height,
			height * 12,
			hash(tag, height),
			parent_hash,
		));
		self.extend_to(to, tag);
	}

	pub fn set_head(&self, number: u64) {
		self.state.lock().unwrap().head = number;
	}

	pub fn set_unreachable(&self, unreachable: bool) {
		self.unreachable.store(unreachable, Ordering::SeqCst);
	}

	pub fn head(&self) -> BlockRecord {
		let state = self.state.lock().unwrap();
		state.blocks[&state.head].clone()
	}

	pub fn block(&self, number: u64) -> BlockRecord {
		self.state.lock().unwrap().blocks[&number].clone()
	}

	pub fn head_calls(&self) -> usize {
		self.head_calls.load(Ordering::SeqCst)
	}

	pub fn block_calls(&self) -> usize {
		self.block_calls.load(Ordering::SeqCst)
	}

	fn check_reachable(&self) -> Result<(), ProbeError> {
		if self.unreachable.load(Ordering::SeqCst) {
			return Err(ProbeError::ProviderError("connection refused".to_string()));
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl ChainProbe for MockChain {
	async fn get_head(&self) -> Result<BlockRecord, ProbeError> {
		self.head_calls.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		let state = self.state.lock().unwrap();
		state.blocks.get(&state.head).cloned().ok_or(ProbeError::NoData)
	}

	async fn get_block(&self, number: u64) -> Result<BlockRecord, ProbeError> {
		self.block_calls.fetch_add(1, Ordering::SeqCst);
		self.check_reachable()?;
		let state = self.state.lock().unwrap();
		state
			.blocks
			.get(&number)
			.cloned()
			.ok_or(ProbeError::BlockNotFound(number))
	}
}

/// Hooks that record every callback.
pub(crate) struct RecordingHooks {
	accept: AtomicBool,
	blocks: Mutex<Vec<BlockRecord>>,
	reorgs: Mutex<Vec<(BlockRecord, BlockRecord, ReorgKind)>>,
}

impl RecordingHooks {
	pub fn accepting() -> Self {
		Self {
			accept: AtomicBool::new(true),
			blocks: Mutex::new(Vec::new()),
			reorgs: Mutex::new(Vec::new()),
		}
	}

	pub fn rejecting() -> Self {
		let hooks = Self::accepting();
		hooks.set_accept(false);
		hooks
	}

	pub fn set_accept(&self, accept: bool) {
		self.accept.store(accept, Ordering::SeqCst);
	}

	pub fn blocks(&self) -> Vec<BlockRecord> {
		self.blocks.lock().unwrap().clone()
	}

	pub fn block_numbers(&self) -> Vec<u64> {
		self.blocks().iter().map(|b| b.number).collect()
	}

	pub fn reorgs(&self) -> Vec<(BlockRecord, BlockRecord, ReorgKind)> {
		self.reorgs.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl SyncHooks for RecordingHooks {
	async fn on_block(&self, record: &BlockRecord) {
		self.blocks.lock().unwrap().push(record.clone());
	}

	async fn on_reorg(
		&self,
		new_block: &BlockRecord,
		old_block: &BlockRecord,
		kind: ReorgKind,
	) -> bool {
		self.reorgs
			.lock()
			.unwrap()
			.push((new_block.clone(), old_block.clone(), kind));
		self.accept.load(Ordering::SeqCst)
	}

	fn name(&self) -> &'static str {
		"RecordingHooks"
	}
}
