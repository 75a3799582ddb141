//! Deduplicate observed call stacks into counted occurrences.
//!
//! Every classification list in a report is a set of unique stacks with the
//! number of times each was seen (and, for heap-boundary traces, the summed
//! size change). Lists are presented most frequent first; equal counts are
//! ordered by stack text so reports are byte-stable.

use crate::parser::CallStack;
use crate::utils::error::FormatError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A unique call stack with its frequency
///
/// **Public** - used by every report and by the tree merger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOccurrence {
    pub stack: CallStack,

    /// Number of times the stack was observed
    pub count: u64,

    /// Cumulative signed size change in bytes (heap-boundary stacks only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<i64>,
}

impl StackOccurrence {
    pub fn new(stack: CallStack, count: u64) -> Self {
        Self {
            stack,
            count,
            size: None,
        }
    }

    pub fn with_size(stack: CallStack, count: u64, size: i64) -> Self {
        Self {
            stack,
            count,
            size: Some(size),
        }
    }

    /// One-line description used in debug logs
    pub fn summary(&self) -> String {
        let top = self.stack.frames().next().unwrap_or("<no stack>");
        match self.size {
            Some(size) => format!("{} x{} ({} bytes)", top, self.count, size),
            None => format!("{} x{}", top, self.count),
        }
    }
}

/// Accumulates observations keyed by stack
///
/// **Public** - used by the ledgers and the correlator
#[derive(Debug, Clone, Default)]
pub struct StackAggregator {
    entries: HashMap<CallStack, (u64, Option<i64>)>,
}

impl StackAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `weight` more occurrences of `stack`
    pub fn add(&mut self, stack: CallStack, weight: u64) {
        self.entries.entry(stack).or_insert((0, None)).0 += weight;
    }

    /// Count one occurrence of `stack` carrying a size change
    ///
    /// # Errors
    /// * `FormatError::SizeOverflow` - the summed size leaves the i64 range;
    ///   the aggregator is left unchanged
    pub fn add_sized(&mut self, stack: CallStack, size: i64) -> Result<(), FormatError> {
        let current = self.entries.get(&stack).and_then(|(_, sum)| *sum).unwrap_or(0);
        let sum = current.checked_add(size).ok_or_else(|| FormatError::SizeOverflow {
            stack: stack.to_string(),
            size,
        })?;

        let entry = self.entries.entry(stack).or_insert((0, None));
        entry.0 += 1;
        entry.1 = Some(sum);
        Ok(())
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.entries.values().map(|(count, _)| count).sum()
    }

    /// Consume into a presentation-ordered list
    pub fn into_sorted(self) -> Vec<StackOccurrence> {
        let mut stacks: Vec<StackOccurrence> = self
            .entries
            .into_iter()
            .map(|(stack, (count, size))| StackOccurrence { stack, count, size })
            .collect();

        sort_by_frequency(&mut stacks);
        debug!("Aggregated {} unique stacks", stacks.len());
        stacks
    }
}

/// Most frequent first, ties by ascending stack text
pub fn sort_by_frequency(stacks: &mut [StackOccurrence]) {
    stacks.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.stack.cmp(&b.stack)));
}

pub fn total_count(stacks: &[StackOccurrence]) -> u64 {
    stacks.iter().map(|s| s.count).sum()
}
