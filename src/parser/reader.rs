//! Lazy reader that splits a trace stream into entries.
//!
//! A block opens on the line containing `<__` and closes on the line
//! containing `__>` (possibly the same line). Lines between blocks are
//! ignored; blank lines inside a block are dropped.

use super::entry::{decode_entry, TraceEntry, TraceFamily};
use crate::utils::config::{ENTRY_END_MARKER, ENTRY_START_MARKER};
use crate::utils::error::{AnalysisError, FormatError};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Iterator over the entries of one trace stream.
///
/// **Public** - entry point for both allocator and heap-boundary traces
///
/// Yields `Err` once on the first fatal problem and then stops.
pub struct TraceReader<R> {
    source: R,
    family: TraceFamily,
    line_number: usize,
    finished: bool,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(source: R, family: TraceFamily) -> Self {
        Self {
            source,
            family,
            line_number: 0,
            finished: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, AnalysisError> {
        let mut line = String::new();
        if self.source.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }

    fn next_block(&mut self) -> Result<Option<Vec<String>>, AnalysisError> {
        let mut block: Vec<String> = Vec::new();
        let mut start_line = 0;
        let mut inside = false;

        while let Some(line) = self.read_line()? {
            if line.contains(ENTRY_START_MARKER) {
                if inside {
                    return Err(FormatError::NestedEntryStart {
                        line: self.line_number,
                        content: line,
                    }
                    .into());
                }
                inside = true;
                start_line = self.line_number;
                let closes = line.contains(ENTRY_END_MARKER);
                block.push(line);
                if closes {
                    return Ok(Some(block));
                }
                continue;
            }

            if inside && !line.trim().is_empty() {
                block.push(line.clone());
            }

            if line.contains(ENTRY_END_MARKER) {
                if !inside {
                    return Err(FormatError::UnexpectedEntryEnd {
                        line: self.line_number,
                        content: line,
                    }
                    .into());
                }
                return Ok(Some(block));
            }
        }

        if inside {
            return Err(FormatError::UnterminatedEntry { line: start_line }.into());
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceEntry, AnalysisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.next_block().and_then(|block| match block {
            Some(lines) => decode_entry(&lines, self.family)
                .map(Some)
                .map_err(AnalysisError::from),
            None => Ok(None),
        });

        match result {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Open a trace file for lazy reading
///
/// **Public** - used by the ledgers and relationship learning
///
/// # Errors
/// * `AnalysisError::Io` - file cannot be opened
pub fn open_trace(
    path: impl AsRef<Path>,
    family: TraceFamily,
) -> Result<TraceReader<BufReader<File>>, AnalysisError> {
    let path = path.as_ref();
    debug!("Opening {:?} trace: {}", family, path.display());
    let file = File::open(path)?;
    Ok(TraceReader::new(BufReader::new(file), family))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::entry::EventKind;
    use std::io::Cursor;

    fn read_all(text: &str) -> Vec<Result<TraceEntry, AnalysisError>> {
        TraceReader::new(Cursor::new(text.to_string()), TraceFamily::Allocator).collect()
    }

    #[test]
    fn test_single_and_multi_line_entries() {
        let text = "\
noise before entries
<__1;ts;1;malloc;0x10;16__>

<__2;ts;1;free;0x10
  libc.so.1`free+0x8

  app`main+0x10
__>
";
        let entries: Vec<TraceEntry> = read_all(text).into_iter().map(Result::unwrap).collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EventKind::Malloc);
        assert!(entries[0].stack.is_none());
        assert_eq!(entries[1].kind, EventKind::Free);
        assert_eq!(
            entries[1].stack.as_ref().unwrap().as_str(),
            "libc.so.1`free\napp`main+0x10"
        );
    }

    #[test]
    fn test_nested_start_marker() {
        let results = read_all("<__1;ts;1;malloc;0x10;16\n<__2;ts;1;free;0x10__>\n");
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(AnalysisError::Format(FormatError::NestedEntryStart { line, .. })) => {
                assert_eq!(*line, 2)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_end_marker_outside_entry() {
        let results = read_all("<__1;ts;1;malloc;0x10;16__>\nstray__>\n");
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(AnalysisError::Format(FormatError::UnexpectedEntryEnd { line: 2, .. }))
        ));
    }

    #[test]
    fn test_unterminated_entry() {
        let results = read_all("<__1;ts;1;malloc;0x10;16__>\n<__2;ts;1;free;0x10\nframe\n");
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[1],
            Err(AnalysisError::Format(FormatError::UnterminatedEntry { line: 2 }))
        ));
    }

    #[test]
    fn test_reader_stops_after_error() {
        let mut reader = TraceReader::new(
            Cursor::new("<__1;ts;1;bogus;0x10__>\n<__2;ts;1;free;0x10__>\n"),
            TraceFamily::Allocator,
        );
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_empty_stream() {
        assert!(read_all("").is_empty());
        assert!(read_all("\n\n").is_empty());
    }
}
