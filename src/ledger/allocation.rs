//! Allocation ledger.
//!
//! Replays allocator events in file order and rebuilds which addresses are
//! live. Frees of addresses that are not live are expected (the trace window
//! usually starts after the process did) and are classified, not rejected.
//!
//! At end of stream the remaining live addresses become leak candidates.

use super::pairing::ArrayPairing;
use crate::aggregator::{StackAggregator, StackOccurrence};
use crate::parser::{open_trace, CallStack, EventKind, TraceEntry, TraceFamily};
use crate::utils::error::{AnalysisError, ConsistencyError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A free (or moving realloc) that released a live allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub freeing_stack: CallStack,
    pub allocation_stack: CallStack,
}

/// Number of calls seen per event kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatistics {
    pub malloc: u64,
    pub calloc: u64,
    pub realloc: u64,
    pub free: u64,
    pub new_array: u64,
    pub delete_array: u64,
}

impl CallStatistics {
    fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Malloc => self.malloc += 1,
            EventKind::Calloc => self.calloc += 1,
            EventKind::Realloc => self.realloc += 1,
            EventKind::Free => self.free += 1,
            EventKind::NewArray => self.new_array += 1,
            EventKind::DeleteArray => self.delete_array += 1,
            EventKind::Brk | EventKind::Sbrk => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.malloc + self.calloc + self.realloc + self.free + self.new_array + self.delete_array
    }
}

/// End-of-stream classification of one allocator trace
///
/// **Public** - consumed by the report writers and the combiner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationAnalysis {
    pub statistics: CallStatistics,

    /// Stacks of allocations still live at end of trace
    pub leak_candidates: Vec<StackOccurrence>,

    /// Leak candidates whose stack never had an allocation freed
    pub never_freed: Vec<StackOccurrence>,

    /// Stacks that freed an address that was not live
    pub wrong_frees: Vec<StackOccurrence>,

    /// Wrong-free stacks that never freed a live address
    pub never_correctly_freed: Vec<StackOccurrence>,

    pub double_frees: Vec<StackOccurrence>,

    /// Stacks that freed a live address
    pub successfully_freed_stacks: BTreeSet<CallStack>,

    /// Stacks whose allocations were freed at least once
    pub successfully_deallocated_stacks: BTreeSet<CallStack>,

    /// Live addresses at end of trace
    pub total_leak_suspects: u64,
    pub total_wrong_frees: u64,
    pub total_double_frees: u64,
}

/// Single-pass replay state
///
/// **Public** - also driven directly by relationship learning
#[derive(Debug, Default)]
pub struct AllocationLedger {
    live: HashMap<String, TraceEntry>,
    freed_not_reused: HashMap<String, TraceEntry>,
    pairing: ArrayPairing,
    statistics: CallStatistics,
    wrong_frees: StackAggregator,
    double_frees: StackAggregator,
    successfully_freed: BTreeSet<CallStack>,
    successfully_deallocated: BTreeSet<CallStack>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently live addresses
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Apply one entry.
    ///
    /// Returns the release it caused, if any.
    ///
    /// # Errors
    /// * `ConsistencyError::AddressAlreadyLive` - allocation of a live address
    /// * `ConsistencyError::FreedAddressStillWatched` - free of an address that
    ///   is both live and recorded as freed
    /// * `ConsistencyError::UnpairedArrayMarker` / `ArraySizeMismatch` - array
    ///   marker violations
    pub fn process(&mut self, entry: TraceEntry) -> Result<Option<Release>, ConsistencyError> {
        if entry.kind.family() != TraceFamily::Allocator {
            warn!("Skipping {} entry {} in allocator trace", entry.kind, entry.sequence);
            return Ok(None);
        }

        self.statistics.record(entry.kind);
        let marker = self.pairing.observe(&entry)?;

        match entry.kind {
            EventKind::Malloc | EventKind::Calloc => {
                self.insert_live(entry)?;
                Ok(None)
            }
            EventKind::Realloc => self.realloc(entry),
            EventKind::Free => {
                if let Some(marker) = marker {
                    self.check_array_size(&entry, &marker)?;
                }
                self.free(entry)
            }
            EventKind::NewArray | EventKind::DeleteArray => Ok(None),
            EventKind::Brk | EventKind::Sbrk => Ok(None),
        }
    }

    fn insert_live(&mut self, entry: TraceEntry) -> Result<(), ConsistencyError> {
        if let Some(existing) = self.live.get(&entry.address) {
            return Err(ConsistencyError::AddressAlreadyLive {
                address: entry.address.clone(),
                entry: entry.to_string(),
                existing: existing.to_string(),
            });
        }
        self.freed_not_reused.remove(&entry.address);
        self.live.insert(entry.address.clone(), entry);
        Ok(())
    }

    fn realloc(&mut self, entry: TraceEntry) -> Result<Option<Release>, ConsistencyError> {
        if !entry.is_moving_realloc() {
            self.freed_not_reused.remove(&entry.address);
            self.live.insert(entry.address.clone(), entry);
            return Ok(None);
        }

        if let Some(existing) = self.live.get(&entry.address) {
            return Err(ConsistencyError::AddressAlreadyLive {
                address: entry.address.clone(),
                entry: entry.to_string(),
                existing: existing.to_string(),
            });
        }

        let release = entry
            .previous_address
            .as_ref()
            .and_then(|previous| self.live.remove(previous))
            .map(|moved| self.record_release(&entry, &moved));

        self.freed_not_reused.remove(&entry.address);
        self.live.insert(entry.address.clone(), entry);
        Ok(release)
    }

    fn free(&mut self, entry: TraceEntry) -> Result<Option<Release>, ConsistencyError> {
        if let Some(allocation) = self.live.remove(&entry.address) {
            let release = self.record_release(&entry, &allocation);

            if self.freed_not_reused.contains_key(&entry.address) {
                return Err(ConsistencyError::FreedAddressStillWatched {
                    address: entry.address.clone(),
                    entry: entry.to_string(),
                });
            }
            self.freed_not_reused.insert(entry.address.clone(), entry);
            return Ok(Some(release));
        }

        let stack = entry.stack_or_empty();
        self.wrong_frees.add(stack.clone(), 1);

        if self.freed_not_reused.contains_key(&entry.address) {
            debug!("Double free of {} (entry {})", entry.address, entry.sequence);
            self.double_frees.add(stack, 1);
        } else {
            self.freed_not_reused.insert(entry.address.clone(), entry);
        }
        Ok(None)
    }

    fn record_release(&mut self, freeing: &TraceEntry, allocation: &TraceEntry) -> Release {
        let release = Release {
            freeing_stack: freeing.stack_or_empty(),
            allocation_stack: allocation.stack_or_empty(),
        };
        self.successfully_freed.insert(release.freeing_stack.clone());
        self.successfully_deallocated
            .insert(release.allocation_stack.clone());
        release
    }

    fn check_array_size(
        &self,
        free: &TraceEntry,
        marker: &TraceEntry,
    ) -> Result<(), ConsistencyError> {
        let (Some(declared), Some(live)) = (marker.size, self.live.get(&free.address)) else {
            return Ok(());
        };
        match live.size {
            Some(allocated) if allocated != declared => Err(ConsistencyError::ArraySizeMismatch {
                address: free.address.clone(),
                allocated,
                declared,
                entry: marker.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Take the end-of-stream snapshot and drop the address maps
    pub fn finish(self) -> AllocationAnalysis {
        self.pairing.finish();

        let mut leaks = StackAggregator::new();
        for entry in self.live.values() {
            leaks.add(entry.stack_or_empty(), 1);
        }

        let total_wrong_frees = self.wrong_frees.total();
        let total_double_frees = self.double_frees.total();
        let leak_candidates = leaks.into_sorted();
        let wrong_frees = self.wrong_frees.into_sorted();

        let never_freed: Vec<StackOccurrence> = leak_candidates
            .iter()
            .filter(|occ| !self.successfully_deallocated.contains(&occ.stack))
            .cloned()
            .collect();

        let never_correctly_freed: Vec<StackOccurrence> = wrong_frees
            .iter()
            .filter(|occ| !self.successfully_freed.contains(&occ.stack))
            .cloned()
            .collect();

        AllocationAnalysis {
            statistics: self.statistics,
            total_leak_suspects: self.live.len() as u64,
            total_wrong_frees,
            total_double_frees,
            leak_candidates,
            never_freed,
            wrong_frees,
            never_correctly_freed,
            double_frees: self.double_frees.into_sorted(),
            successfully_freed_stacks: self.successfully_freed,
            successfully_deallocated_stacks: self.successfully_deallocated,
        }
    }
}

/// Run entries through a fresh ledger, reporting every release
///
/// # Errors
/// The first parse or consistency failure aborts the replay.
pub fn replay<I, F>(entries: I, mut on_release: F) -> Result<AllocationAnalysis, AnalysisError>
where
    I: IntoIterator<Item = Result<TraceEntry, AnalysisError>>,
    F: FnMut(Release),
{
    let mut ledger = AllocationLedger::new();
    for entry in entries {
        if let Some(release) = ledger.process(entry?)? {
            on_release(release);
        }
    }
    Ok(ledger.finish())
}

/// Analyze one allocator trace file
///
/// **Public** - used by the `memalloc` and `combine` commands
///
/// # Errors
/// * `AnalysisError::Io` - file cannot be read
/// * `AnalysisError::Format` / `AnalysisError::Consistency` - fatal for the file
pub fn analyze_allocation_file(path: impl AsRef<Path>) -> Result<AllocationAnalysis, AnalysisError> {
    let path = path.as_ref();
    let analysis = replay(open_trace(path, TraceFamily::Allocator)?, |_| {})?;

    info!(
        "{}: {} calls, {} leak suspects, {} wrong frees, {} double frees",
        path.display(),
        analysis.statistics.total(),
        analysis.total_leak_suspects,
        analysis.total_wrong_frees,
        analysis.total_double_frees
    );
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{decode_entry, TraceReader};
    use std::io::Cursor;

    fn analyze(text: &str) -> Result<AllocationAnalysis, AnalysisError> {
        replay(
            TraceReader::new(Cursor::new(text.to_string()), TraceFamily::Allocator),
            |_| {},
        )
    }

    fn entry(header: &str, stack: &str) -> TraceEntry {
        decode_entry(&[header, stack], TraceFamily::Allocator).unwrap()
    }

    #[test]
    fn test_malloc_then_free_is_clean() {
        let analysis = analyze(
            "<__1;ts;1;malloc;0x10;16\nmalloc+0x4\nA__>\n<__2;ts;1;free;0x10\nfree+0x8\nA__>\n",
        )
        .unwrap();

        assert!(analysis.leak_candidates.is_empty());
        assert!(analysis.double_frees.is_empty());
        assert_eq!(
            analysis.successfully_freed_stacks,
            BTreeSet::from([CallStack::parse("free\nA")])
        );
    }

    #[test]
    fn test_repeated_wrong_free_is_double_free() {
        let analysis = analyze(
            "<__1;ts;1;free;0x20\nfree\nB__>\n<__2;ts;1;free;0x20\nfree\nB__>\n",
        )
        .unwrap();

        assert_eq!(analysis.wrong_frees.len(), 1);
        assert_eq!(analysis.wrong_frees[0].count, 2);
        assert_eq!(analysis.double_frees.len(), 1);
        assert_eq!(analysis.double_frees[0].count, 1);
        assert_eq!(analysis.total_double_frees, 1);
        assert_eq!(analysis.never_correctly_freed.len(), 1);
    }

    #[test]
    fn test_unfreed_malloc_is_never_freed_leak() {
        let analysis = analyze("<__1;ts;1;malloc;0x30;8\nmalloc\nC__>\n").unwrap();

        assert_eq!(analysis.leak_candidates.len(), 1);
        assert_eq!(analysis.leak_candidates[0].count, 1);
        assert_eq!(analysis.never_freed, analysis.leak_candidates);
        assert_eq!(analysis.total_leak_suspects, 1);
    }

    #[test]
    fn test_leak_from_stack_that_also_freed_is_not_never_freed() {
        let analysis = analyze(
            "<__1;ts;1;malloc;0x10;8\nmalloc\nC__>\n<__2;ts;1;free;0x10\nfree\nD__>\n<__3;ts;1;malloc;0x20;8\nmalloc\nC__>\n",
        )
        .unwrap();

        assert_eq!(analysis.leak_candidates.len(), 1);
        assert!(analysis.never_freed.is_empty());
    }

    #[test]
    fn test_reallocating_live_address() {
        let err = analyze("<__1;ts;1;malloc;0x10;8__>\n<__2;ts;1;calloc;0x10;8__>\n")
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Consistency(ConsistencyError::AddressAlreadyLive { .. })
        ));
    }

    #[test]
    fn test_moving_realloc_releases_old_block() {
        let mut ledger = AllocationLedger::new();
        ledger.process(entry("1;ts;1;malloc;0x10;8", "malloc\nA")).unwrap();
        let release = ledger
            .process(entry("2;ts;1;realloc;0x10;0x20;16", "realloc\nB"))
            .unwrap()
            .unwrap();

        assert_eq!(release.allocation_stack, CallStack::parse("malloc\nA"));
        assert_eq!(release.freeing_stack, CallStack::parse("realloc\nB"));
        assert_eq!(ledger.live_count(), 1);

        let analysis = ledger.finish();
        assert_eq!(analysis.leak_candidates[0].stack, CallStack::parse("realloc\nB"));
        assert!(analysis
            .successfully_deallocated_stacks
            .contains(&CallStack::parse("malloc\nA")));
    }

    #[test]
    fn test_moving_realloc_onto_live_address() {
        let err = analyze(
            "<__1;ts;1;malloc;0x10;8__>\n<__2;ts;1;malloc;0x20;8__>\n<__3;ts;1;realloc;0x10;0x20;16__>\n",
        )
        .unwrap_err();
        match err {
            AnalysisError::Consistency(ConsistencyError::AddressAlreadyLive { address, .. }) => {
                assert_eq!(address, "0x20");
            }
            other => panic!("expected AddressAlreadyLive, got {:?}", other),
        }
    }

    #[test]
    fn test_in_place_realloc_replaces_entry() {
        let mut ledger = AllocationLedger::new();
        ledger.process(entry("1;ts;1;malloc;0x10;8", "malloc\nA")).unwrap();
        let release = ledger
            .process(entry("2;ts;1;realloc;0x10;0x10;32", "realloc\nB"))
            .unwrap();
        assert!(release.is_none());

        let analysis = ledger.finish();
        assert_eq!(analysis.total_leak_suspects, 1);
        assert_eq!(analysis.leak_candidates[0].stack, CallStack::parse("realloc\nB"));
    }

    #[test]
    fn test_reuse_clears_double_free_watch() {
        let analysis = analyze(
            "<__1;ts;1;malloc;0x10;8__>\n<__2;ts;1;free;0x10__>\n<__3;ts;1;malloc;0x10;8__>\n<__4;ts;1;free;0x10__>\n",
        )
        .unwrap();
        assert!(analysis.double_frees.is_empty());
        assert!(analysis.wrong_frees.is_empty());
    }

    #[test]
    fn test_delete_array_size_mismatch() {
        let err = analyze(
            "<__1;ts;1;malloc;0x10;32__>\n<__2;ts;1;delete[];0x10;64__>\n<__3;ts;1;free;0x10__>\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Consistency(ConsistencyError::ArraySizeMismatch {
                allocated: 32,
                declared: 64,
                ..
            })
        ));
    }

    #[test]
    fn test_array_markers_are_counted() {
        let analysis = analyze(
            "<__1;ts;1;new[];32__>\n<__2;ts;1;malloc;0x10;32__>\n<__3;ts;1;delete[];0x10;32__>\n<__4;ts;1;free;0x10__>\n",
        )
        .unwrap();
        assert_eq!(analysis.statistics.new_array, 1);
        assert_eq!(analysis.statistics.delete_array, 1);
        assert_eq!(analysis.statistics.malloc, 1);
        assert_eq!(analysis.statistics.free, 1);
        assert!(analysis.leak_candidates.is_empty());
    }

    #[test]
    fn test_leak_frequencies_match_live_count() {
        let analysis = analyze(
            "<__1;ts;1;malloc;0x1;8\nmalloc\nA__>\n<__2;ts;1;malloc;0x2;8\nmalloc\nA__>\n<__3;ts;1;malloc;0x3;8\nmalloc\nB__>\n",
        )
        .unwrap();
        let sum: u64 = analysis.leak_candidates.iter().map(|s| s.count).sum();
        assert_eq!(sum, analysis.total_leak_suspects);
        assert_eq!(analysis.leak_candidates[0].count, 2);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let text = "<__1;ts;1;malloc;0x1;8\nmalloc\nA__>\n<__2;ts;1;free;0x9\nfree\nB__>\n<__3;ts;1;malloc;0x3;8\nmalloc\nC__>\n";
        assert_eq!(analyze(text).unwrap(), analyze(text).unwrap());
    }
}
