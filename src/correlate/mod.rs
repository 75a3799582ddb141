//! Cross-file analysis.
//!
//! - Learning free/allocation stack relationships from full traces
//! - Correlating pre-processed traces against those relationships
//! - Combining per-file results into one multi-file report

pub mod combiner;
pub mod processed;
pub mod relationships;

pub use combiner::{
    combine_allocation_results, combine_category, combine_processed_results, format_vector,
    CombinedAllocationReport, CombinedProcessedReport, CombinedStack, Confidence,
};
pub use processed::{analyze_processed_file, correlate, ProcessedAnalysis};
pub use relationships::{learn_from_files, FreeSite, StackRelationships};
