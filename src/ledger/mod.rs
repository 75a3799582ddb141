//! Stateful replay of trace entries.
//!
//! - Allocation ledger for malloc/calloc/realloc/free traces
//! - Heap-boundary ledger for brk/sbrk traces
//! - Per-thread array marker pairing

pub mod allocation;
pub mod heap;
pub mod pairing;

pub use allocation::{
    analyze_allocation_file, replay, AllocationAnalysis, AllocationLedger, CallStatistics, Release,
};
pub use heap::{analyze_heap_file, replay_heap, BreakChange, HeapAnalysis, HeapBoundaryLedger};
pub use pairing::ArrayPairing;
