//! Learn which allocation sites each free site releases.
//!
//! Full-window allocator traces show every free together with the
//! allocation it released. Counting those pairs over a corpus gives a map
//! from free stack to the allocation stacks it is known to clean up, which
//! the correlator then applies to traces that only carry stack counts.

use crate::ledger::{replay, Release};
use crate::parser::{open_trace, CallStack, TraceFamily};
use crate::utils::error::AnalysisError;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One free stack and what it released
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSite {
    /// Successful releases performed from this stack
    pub count: u64,

    /// Allocation stacks released, with how often
    pub allocations: BTreeMap<CallStack, u64>,
}

/// Counted edges free stack -> allocation stack
///
/// **Public** - built by `learn_from_files`, consumed by `correlate`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRelationships {
    pub edges: BTreeMap<CallStack, FreeSite>,
}

impl StackRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, release: &Release) {
        let site = self.edges.entry(release.freeing_stack.clone()).or_default();
        site.count += 1;
        *site
            .allocations
            .entry(release.allocation_stack.clone())
            .or_insert(0) += 1;
    }

    /// Allocation stacks released by `free_stack`, if it is known
    pub fn allocation_stacks(&self, free_stack: &CallStack) -> Option<impl Iterator<Item = &CallStack>> {
        self.edges.get(free_stack).map(|site| site.allocations.keys())
    }

    pub fn contains(&self, free_stack: &CallStack) -> bool {
        self.edges.contains_key(free_stack)
    }

    /// Number of distinct free stacks
    pub fn free_stack_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of distinct (free, allocation) pairs
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|site| site.allocations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Collect the releases of one trace file
pub fn releases_in_file(path: &Path) -> Result<Vec<Release>, AnalysisError> {
    let mut releases = Vec::new();
    replay(open_trace(path, TraceFamily::Allocator)?, |release| {
        releases.push(release)
    })?;
    debug!("{}: {} releases", path.display(), releases.len());
    Ok(releases)
}

/// Learn relationships from full allocator traces
///
/// **Public** - first stage of the `correlate` command
///
/// Files are replayed in parallel on the current rayon pool. Results are
/// merged one file at a time, in the order given. A file that fails is
/// skipped with a warning.
pub fn learn_from_files(paths: &[PathBuf]) -> StackRelationships {
    info!("Collecting free/allocation stack relationships from {} files", paths.len());

    let per_file: Vec<Result<Vec<Release>, AnalysisError>> = paths
        .par_iter()
        .map(|path| releases_in_file(path))
        .collect();

    let mut relationships = StackRelationships::new();
    for (path, result) in paths.iter().zip(per_file) {
        match result {
            Ok(releases) => {
                for release in &releases {
                    relationships.record(release);
                }
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    info!(
        "Found {} unique free stacks that freed memory allocated from {} stacks",
        relationships.free_stack_count(),
        relationships.edge_count()
    );
    relationships
}
