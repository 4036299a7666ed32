//! Chain Tip Synchronization Module
//!
//! This module provides the engine that keeps consumer data in step with the canonical head of
//! an external, occasionally reorganizing chain. It is composed of several submodules, each
//! responsible for one aspect of the sync process:
//!
//! - `block_cache`: Bounded, insertion-ordered cache of block records.
//! - `reorg_walker`: Walks back from a new head to the last processed block and builds the replay plan.
//! - `controller`: Runs one sync cycle per tick and owns the published state.
//! - `lifecycle`: Schedules ticks, handles pause/resume/refresh and disposal.
//! - `hooks`: Consumer seams (data loader, block and reorg callbacks).
//! - `progress_tracker`: Counters and periodic progress logging.
//! - `config` and `types`: Configuration, errors and the published state.
//!
//! The lifecycle task is the only caller of the controller, and the controller is the only
//! writer of the state, so consumers observe block updates strictly in order.

/// Bounded block record cache
pub mod block_cache;
/// Engine configuration
pub mod config;
/// Per-tick sync orchestration
pub mod controller;
/// Consumer callbacks and data loaders
pub mod hooks;
/// Polling loop and engine handle
pub mod lifecycle;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Replay plan computation and reorg detection
pub mod reorg_walker;
/// Errors and published state
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use block_cache::BlockCache;
pub use config::SyncConfig;
pub use controller::{DataSyncController, TickOutcome};
pub use hooks::{DataLoader, HookDispatcher, NoopHooks, SyncHooks};
pub use lifecycle::{LifecycleManager, SyncEngine};
pub use progress_tracker::{SyncProgressTracker, SyncStats};
pub use reorg_walker::{ReorgEvent, ReorgKind, ReorgWalker, WalkOutcome};
pub use types::{BoxError, SyncError, SyncState};
