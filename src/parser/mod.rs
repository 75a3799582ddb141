//! Trace parsing.
//!
//! This module handles:
//! - Splitting raw tracer output into entries
//! - Decoding entry headers for allocator and heap-boundary traces
//! - Call stack normalization
//! - Pre-processed (aggregated) trace files

pub mod entry;
pub mod processed;
pub mod reader;
pub mod stack;

// Re-export main types
pub use entry::{decode_entry, parse_address, EventKind, TraceEntry, TraceFamily};
pub use processed::{parse_processed, read_processed_file, ProcessedTrace};
pub use reader::{open_trace, TraceReader};
pub use stack::{normalize, CallStack};
