use crate::sync::types::SyncError;
use std::time::Duration;
use tracing::warn;

/// Default delay between the end of one tick and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);
/// Default number of block records kept in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;
/// Default gap, in blocks, beyond which published data is considered stale.
pub const DEFAULT_STALE_THRESHOLD: u64 = 5;
/// Default upper bound on blocks replayed per tick.
pub const DEFAULT_MAX_BLOCKS_PER_UPDATE: usize = 10;

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Wait between ticks, measured from when the previous tick settled
	pub poll_interval: Duration,
	/// Maximum number of cached block records
	pub cache_capacity: usize,
	/// Staleness threshold in blocks
	pub stale_threshold: u64,
	/// Maximum replay plan length per tick
	pub max_blocks_per_update: usize,
	/// Run the first tick as soon as the engine starts instead of after one interval
	pub tick_on_start: bool,
	/// Per-request timeout used by network probes
	pub request_timeout: Duration,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			poll_interval: DEFAULT_POLL_INTERVAL,
			cache_capacity: DEFAULT_CACHE_CAPACITY,
			stale_threshold: DEFAULT_STALE_THRESHOLD,
			max_blocks_per_update: DEFAULT_MAX_BLOCKS_PER_UPDATE,
			tick_on_start: false,
			request_timeout: Duration::from_secs(30),
		}
	}
}

impl SyncConfig {
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
		self.cache_capacity = cache_capacity;
		self
	}

	pub fn with_stale_threshold(mut self, stale_threshold: u64) -> Self {
		self.stale_threshold = stale_threshold;
		self
	}

	pub fn with_max_blocks_per_update(mut self, max_blocks_per_update: usize) -> Self {
		self.max_blocks_per_update = max_blocks_per_update;
		self
	}

	pub fn with_tick_on_start(mut self, tick_on_start: bool) -> Self {
		self.tick_on_start = tick_on_start;
		self
	}

	pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
		self.request_timeout = request_timeout;
		self
	}

	/// Build a configuration from the defaults, overridden by any `SYNC_*` environment
	/// variables that are set. Unparseable values are logged and ignored.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let mut config = Self::default();

		if let Some(ms) = parse_var::<u64>(&lookup, "SYNC_POLL_INTERVAL_MS") {
			config.poll_interval = Duration::from_millis(ms);
		}
		if let Some(capacity) = parse_var(&lookup, "SYNC_CACHE_CAPACITY") {
			config.cache_capacity = capacity;
		}
		if let Some(threshold) = parse_var(&lookup, "SYNC_STALE_THRESHOLD") {
			config.stale_threshold = threshold;
		}
		if let Some(max_blocks) = parse_var(&lookup, "SYNC_MAX_BLOCKS_PER_UPDATE") {
			config.max_blocks_per_update = max_blocks;
		}

		config
	}

	/// Reject configurations the engine cannot run with.
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.cache_capacity == 0 {
			return Err(SyncError::ConfigError(
				"cache_capacity must be greater than zero".to_string(),
			));
		}
		if self.max_blocks_per_update == 0 {
			return Err(SyncError::ConfigError(
				"max_blocks_per_update must be greater than zero".to_string(),
			));
		}
		if self.poll_interval.is_zero() {
			return Err(SyncError::ConfigError(
				"poll_interval must be greater than zero".to_string(),
			));
		}
		Ok(())
	}
}

fn parse_var<V: std::str::FromStr>(
	lookup: &impl Fn(&str) -> Option<String>,
	key: &str,
) -> Option<V> {
	let raw = lookup(key)?;
	match raw.trim().parse() {
		Ok(value) => Some(value),
		Err(_) => {
			warn!("Ignoring {}: cannot parse {:?}", key, raw);
			None
		}
	}
}
