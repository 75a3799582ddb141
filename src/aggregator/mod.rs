//! Aggregation of trace stacks.
//!
//! This module turns individual observations into:
//! - Unique stacks with frequency (and size) counters
//! - Merged stack trees for human review

pub mod merge_tree;
pub mod stack_builder;

// Re-export main types and functions
pub use merge_tree::{MergedStackTree, StackTreeNode};
pub use stack_builder::{sort_by_frequency, total_count, StackAggregator, StackOccurrence};
