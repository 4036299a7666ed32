//! Chain tip synchronization for polling clients.
//!
//! The engine polls a [`probe::ChainProbe`] for the chain head, detects reorganizations against
//! the last block it applied, loads consumer data for every new block in order and publishes the
//! result as a [`sync::SyncState`] snapshot.

pub mod probe;
pub mod sync;
pub mod utils;

pub use probe::{BlockRecord, ChainProbe, JsonRpcChainProbe, ProbeError};
pub use sync::{SyncConfig, SyncEngine, SyncError, SyncHooks, SyncState};
