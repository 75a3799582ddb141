//! Per-thread pairing of array markers with allocator calls.
//!
//! A `new[]` marker must be followed, on the same thread, by the `malloc`
//! that serves it; a `delete[]` marker by the `free` of the same address.

use crate::parser::{EventKind, TraceEntry};
use crate::utils::error::ConsistencyError;
use log::warn;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PairState {
    /// Marker seen, waiting for the allocator call it belongs to
    ExpectingPair(TraceEntry),
}

/// Pairing state machine, one slot per thread
#[derive(Debug, Default)]
pub struct ArrayPairing {
    threads: HashMap<String, PairState>,
}

impl ArrayPairing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one entry.
    ///
    /// Returns the marker a non-marker entry completes, if any.
    ///
    /// # Errors
    /// * `ConsistencyError::UnpairedArrayMarker` - a second marker while a
    ///   pair is pending, or the pending marker is followed by the wrong call
    pub fn observe(&mut self, entry: &TraceEntry) -> Result<Option<TraceEntry>, ConsistencyError> {
        let pending = self.threads.remove(&entry.thread_id);

        if entry.kind.is_array_marker() {
            if let Some(PairState::ExpectingPair(marker)) = pending {
                return Err(unpaired(entry, &marker));
            }
            self.threads.insert(
                entry.thread_id.clone(),
                PairState::ExpectingPair(entry.clone()),
            );
            return Ok(None);
        }

        let Some(PairState::ExpectingPair(marker)) = pending else {
            return Ok(None);
        };

        let completes = match marker.kind {
            EventKind::NewArray => entry.kind == EventKind::Malloc,
            EventKind::DeleteArray => {
                entry.kind == EventKind::Free && entry.address == marker.address
            }
            _ => false,
        };

        if completes {
            Ok(Some(marker))
        } else {
            Err(unpaired(entry, &marker))
        }
    }

    /// Threads whose last marker never saw its allocator call
    pub fn pending_threads(&self) -> usize {
        self.threads.len()
    }

    /// Log markers left open at end of trace
    pub fn finish(self) {
        for (thread, PairState::ExpectingPair(marker)) in self.threads {
            warn!(
                "Thread {} ended with an unpaired {} marker (entry {})",
                thread, marker.kind, marker.sequence
            );
        }
    }
}

fn unpaired(entry: &TraceEntry, marker: &TraceEntry) -> ConsistencyError {
    ConsistencyError::UnpairedArrayMarker {
        thread: entry.thread_id.clone(),
        marker: marker.header(),
        entry: entry.to_string(),
    }
}
