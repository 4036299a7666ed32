//!
//! Utility module for the chain tip sync engine.
//!
//! Re-exports formatting helpers used in log output.
/// Utility functions for formatting and display
pub mod index;

pub use index::{format_block_age, short_hash};
