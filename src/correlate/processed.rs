//! Resolve leak suspects in pre-processed traces.
//!
//! A pre-processed file only says which stacks allocated and which freed,
//! not which free released which allocation. Learned relationships fill
//! that gap: every deallocation stack with known allocation partners clears
//! those partners from the outstanding set. What remains are the suspects.

use super::relationships::StackRelationships;
use crate::aggregator::{total_count, StackOccurrence};
use crate::parser::{read_processed_file, CallStack, ProcessedTrace};
use crate::utils::error::AnalysisError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Correlation result for one pre-processed file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedAnalysis {
    pub allocations: Vec<StackOccurrence>,
    pub deallocations: Vec<StackOccurrence>,

    /// Allocation stacks no known free stack released
    pub unfreed_allocations: Vec<StackOccurrence>,

    /// Deallocation stacks missing from the relationship map
    pub unknown_deallocations: Vec<StackOccurrence>,
}

impl ProcessedAnalysis {
    pub fn total_allocations(&self) -> u64 {
        total_count(&self.allocations)
    }

    pub fn total_deallocations(&self) -> u64 {
        total_count(&self.deallocations)
    }

    pub fn total_unfreed(&self) -> u64 {
        total_count(&self.unfreed_allocations)
    }

    pub fn total_unknown(&self) -> u64 {
        total_count(&self.unknown_deallocations)
    }

    /// Allocation calls minus deallocation calls
    pub fn balance(&self) -> i64 {
        self.total_allocations() as i64 - self.total_deallocations() as i64
    }
}

/// Apply learned relationships to one parsed file
pub fn correlate(trace: ProcessedTrace, relationships: &StackRelationships) -> ProcessedAnalysis {
    let mut released: BTreeSet<&CallStack> = BTreeSet::new();
    let mut unknown_deallocations = Vec::new();

    for deallocation in &trace.deallocations {
        match relationships.allocation_stacks(&deallocation.stack) {
            Some(partners) => released.extend(partners),
            None => unknown_deallocations.push(deallocation.clone()),
        }
    }

    let unfreed_allocations: Vec<StackOccurrence> = trace
        .allocations
        .iter()
        .filter(|allocation| !released.contains(&allocation.stack))
        .cloned()
        .collect();

    debug!(
        "{} of {} allocation stacks remain unfreed, {} unknown free stacks",
        unfreed_allocations.len(),
        trace.allocations.len(),
        unknown_deallocations.len()
    );

    ProcessedAnalysis {
        allocations: trace.allocations,
        deallocations: trace.deallocations,
        unfreed_allocations,
        unknown_deallocations,
    }
}

/// Parse and correlate one pre-processed file
///
/// **Public** - used by the `correlate` command
pub fn analyze_processed_file(
    path: impl AsRef<Path>,
    relationships: &StackRelationships,
) -> Result<ProcessedAnalysis, AnalysisError> {
    let path = path.as_ref();
    let analysis = correlate(read_processed_file(path)?, relationships);

    info!(
        "{}: {} allocations, {} deallocations, {} unfreed, {} unknown frees",
        path.display(),
        analysis.total_allocations(),
        analysis.total_deallocations(),
        analysis.total_unfreed(),
        analysis.total_unknown()
    );
    Ok(analysis)
}
