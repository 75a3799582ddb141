//! Heap-boundary ledger for brk/sbrk traces.
//!
//! Tracks the program break and classifies each call by how it moved it.

use crate::aggregator::{StackAggregator, StackOccurrence};
use crate::parser::{open_trace, parse_address, EventKind, TraceEntry, TraceFamily};
use crate::utils::error::{AnalysisError, FormatError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Effect of one call on the program break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakChange {
    /// First successful brk; establishes the break without a delta
    Seeded,
    Increase(i64),
    Decrease(i64),
    Neutral,
    /// Carries the requested delta (0 when it cannot be known)
    Failed(i64),
}

/// End-of-stream classification of one heap-boundary trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapAnalysis {
    pub increases: u64,
    pub decreases: u64,
    pub neutral: u64,
    pub failed: u64,

    /// Stacks of calls that moved the break, with summed size change
    pub unique_stacks: Vec<StackOccurrence>,

    pub unique_failed_stacks: Vec<StackOccurrence>,

    /// Break address after the last successful call
    pub final_break: Option<i64>,
}

#[derive(Debug, Default)]
pub struct HeapBoundaryLedger {
    current_break: Option<i64>,
    increases: u64,
    decreases: u64,
    neutral: u64,
    moved: StackAggregator,
    failed: StackAggregator,
}

impl HeapBoundaryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_break(&self) -> Option<i64> {
        self.current_break
    }

    /// Apply one entry
    ///
    /// # Errors
    /// * `FormatError::InvalidAddress` - address field is not a number
    /// * `FormatError::BreakOverflow` - the break move leaves the i64 range
    /// * `FormatError::SizeOverflow` - a stack's summed size leaves the i64 range
    pub fn process(&mut self, entry: &TraceEntry) -> Result<BreakChange, FormatError> {
        let change = match (entry.kind, entry.success) {
            (EventKind::Brk, true) => {
                let new_break = parse_address(&entry.address)?;
                let change = match self.current_break {
                    None => BreakChange::Seeded,
                    Some(current) => classify(break_distance(entry, current, new_break)?),
                };
                self.current_break = Some(new_break);
                change
            }
            (EventKind::Brk, false) => {
                let requested = match self.current_break {
                    Some(current) => {
                        break_distance(entry, current, parse_address(&entry.address)?)?
                    }
                    None => 0,
                };
                BreakChange::Failed(requested)
            }
            (EventKind::Sbrk, true) => {
                let previous = parse_address(&entry.address)?;
                let delta = entry.size.unwrap_or(0);
                let moved = previous
                    .checked_add(delta)
                    .ok_or_else(|| FormatError::BreakOverflow {
                        address: entry.address.clone(),
                        delta,
                    })?;
                self.current_break = Some(moved);
                classify(delta)
            }
            (EventKind::Sbrk, false) => BreakChange::Failed(entry.size.unwrap_or(0)),
            (kind, _) => {
                warn!("Skipping {} entry {} in heap-boundary trace", kind, entry.sequence);
                return Ok(BreakChange::Neutral);
            }
        };

        let stack = entry.stack_or_empty();
        match change {
            BreakChange::Increase(delta) => {
                self.increases += 1;
                self.moved.add_sized(stack, delta)?;
            }
            BreakChange::Decrease(delta) => {
                self.decreases += 1;
                self.moved.add_sized(stack, delta)?;
            }
            BreakChange::Neutral => self.neutral += 1,
            BreakChange::Failed(requested) => {
                debug!("Failed {} call (entry {})", entry.kind, entry.sequence);
                self.failed.add_sized(stack, requested)?;
            }
            BreakChange::Seeded => {
                debug!("Program break seeded at {}", entry.address);
            }
        }
        Ok(change)
    }

    pub fn finish(self) -> HeapAnalysis {
        HeapAnalysis {
            increases: self.increases,
            decreases: self.decreases,
            neutral: self.neutral,
            failed: self.failed.total(),
            unique_stacks: self.moved.into_sorted(),
            unique_failed_stacks: self.failed.into_sorted(),
            final_break: self.current_break,
        }
    }
}

fn break_distance(entry: &TraceEntry, current: i64, target: i64) -> Result<i64, FormatError> {
    target
        .checked_sub(current)
        .ok_or_else(|| FormatError::BreakOverflow {
            address: entry.address.clone(),
            delta: target.wrapping_sub(current),
        })
}

fn classify(delta: i64) -> BreakChange {
    match delta {
        0 => BreakChange::Neutral,
        d if d > 0 => BreakChange::Increase(d),
        d => BreakChange::Decrease(d),
    }
}

/// Run entries through a fresh heap-boundary ledger
pub fn replay_heap<I>(entries: I) -> Result<HeapAnalysis, AnalysisError>
where
    I: IntoIterator<Item = Result<TraceEntry, AnalysisError>>,
{
    let mut ledger = HeapBoundaryLedger::new();
    for entry in entries {
        ledger.process(&entry?)?;
    }
    Ok(ledger.finish())
}

/// Analyze one heap-boundary trace file
///
/// **Public** - used by the `brk` command
pub fn analyze_heap_file(path: impl AsRef<Path>) -> Result<HeapAnalysis, AnalysisError> {
    let path = path.as_ref();
    let analysis = replay_heap(open_trace(path, TraceFamily::HeapBoundary)?)?;

    info!(
        "{}: {} increases, {} decreases, {} neutral, {} failed",
        path.display(),
        analysis.increases,
        analysis.decreases,
        analysis.neutral,
        analysis.failed
    );
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TraceReader;
    use std::io::Cursor;

    fn analyze(text: &str) -> HeapAnalysis {
        replay_heap(TraceReader::new(
            Cursor::new(text.to_string()),
            TraceFamily::HeapBoundary,
        ))
        .unwrap()
    }

    #[test]
    fn test_sbrk_buckets_and_size() {
        let analysis = analyze(
            "<__1;ts;1;sbrk;0x1000;100\nsbrk\nmain__>\n<__2;ts;1;sbrk;0x1064;-40\nsbrk\nmain__>\n<__3;ts;1;sbrk;0x103c;0\nsbrk\nmain__>\n",
        );

        assert_eq!((analysis.increases, analysis.decreases, analysis.neutral), (1, 1, 1));
        assert_eq!(analysis.unique_stacks.len(), 1);
        assert_eq!(analysis.unique_stacks[0].count, 2);
        assert_eq!(analysis.unique_stacks[0].size, Some(60));
        assert_eq!(analysis.final_break, Some(0x103c));
    }

    #[test]
    fn test_first_brk_seeds_break() {
        let mut ledger = HeapBoundaryLedger::new();
        let seed = crate::parser::decode_entry(&["1;ts;1;brk;0x8000;0"], TraceFamily::HeapBoundary)
            .unwrap();
        let grow = crate::parser::decode_entry(&["2;ts;1;brk;0x9000;0"], TraceFamily::HeapBoundary)
            .unwrap();

        assert_eq!(ledger.process(&seed).unwrap(), BreakChange::Seeded);
        assert_eq!(ledger.process(&grow).unwrap(), BreakChange::Increase(0x1000));
        assert_eq!(ledger.current_break(), Some(0x9000));
    }

    #[test]
    fn test_failed_calls_keep_state() {
        let analysis = analyze(
            "<__1;ts;1;brk;0x8000;-1\nbrk\nA__>\n<__2;ts;1;brk;0x8000;0__>\n<__3;ts;1;brk;0xa000;-1\nbrk\nA__>\n<__4;ts;1;sbrk;-0x1;64\nsbrk\nB__>\n",
        );

        assert_eq!(analysis.failed, 3);
        assert_eq!(analysis.final_break, Some(0x8000));
        let a = analysis
            .unique_failed_stacks
            .iter()
            .find(|s| s.stack.as_str() == "brk\nA")
            .unwrap();
        assert_eq!(a.count, 2);
        assert_eq!(a.size, Some(0x2000));
        assert!(analysis.unique_stacks.is_empty());
    }

    #[test]
    fn test_brk_decrease() {
        let analysis = analyze(
            "<__1;ts;1;brk;0x9000;0__>\n<__2;ts;1;brk;0x8000;0\nbrk\nshrink__>\n",
        );
        assert_eq!(analysis.decreases, 1);
        assert_eq!(analysis.unique_stacks[0].size, Some(-0x1000));
    }

    #[test]
    fn test_sbrk_past_address_range() {
        let result = replay_heap(TraceReader::new(
            Cursor::new("<__1;ts;1;sbrk;0x7fffffffffffff00;4096\nsbrk\nmain__>\n"),
            TraceFamily::HeapBoundary,
        ));
        match result {
            Err(AnalysisError::Format(FormatError::BreakOverflow { address, delta })) => {
                assert_eq!(address, "0x7fffffffffffff00");
                assert_eq!(delta, 4096);
            }
            other => panic!("expected BreakOverflow, got {:?}", other),
        }
    }

    #[test]
    fn test_brk_distance_past_address_range() {
        let result = replay_heap(TraceReader::new(
            Cursor::new("<__1;ts;1;brk;-0x7fffffffffffffff;0__>\n<__2;ts;1;brk;0x7fffffffffffffff;0__>\n"),
            TraceFamily::HeapBoundary,
        ));
        assert!(matches!(
            result,
            Err(AnalysisError::Format(FormatError::BreakOverflow { .. }))
        ));
    }

    #[test]
    fn test_invalid_address() {
        let result = replay_heap(TraceReader::new(
            Cursor::new("<__1;ts;1;brk;nothex;0__>\n"),
            TraceFamily::HeapBoundary,
        ));
        assert!(matches!(
            result,
            Err(AnalysisError::Format(FormatError::InvalidAddress(_)))
        ));
    }
}
