//! Accumulator Module
//!
//! Per-denomination accumulators, consensus checkpoints and the anonymity
//! windows drawn from them.

pub mod merkle;
pub mod checkpoint;
pub mod store;
pub mod window;

// Re-export main types
pub use checkpoint::{AccumulatorValue, Checkpoint, CheckpointEntry};
pub use merkle::{IncrementalMerkleTree, TREE_DEPTH};
pub use store::{AccumulatorSnapshot, AccumulatorStore, FoldedMint};
pub use window::{canonical_window, window_for};
