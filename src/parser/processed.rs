//! Parser for pre-processed trace files.
//!
//! These files only carry aggregated counts:
//!
//! ```text
//! == allocations
//! libc.so.1`malloc+0x8
//! app`main
//! 12
//!
//! == deallocations
//! libc.so.1`free+0x4
//! app`main
//! 9
//! ```
//!
//! Groups are stack lines followed by a count line and are separated by
//! blank lines. A further `==` line after the deallocation section ends it.
//! The allocation heading may be two lines (a title and an `==` underline);
//! an `==` line before the first allocation group belongs to that heading.

use crate::aggregator::{StackAggregator, StackOccurrence};
use crate::parser::CallStack;
use crate::utils::config::SECTION_MARKER;
use crate::utils::error::{AnalysisError, FormatError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Unique allocation and deallocation stacks of one pre-processed file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedTrace {
    pub allocations: Vec<StackOccurrence>,
    pub deallocations: Vec<StackOccurrence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Allocations,
    Deallocations,
    Done,
}

/// Parse a pre-processed stream
///
/// **Public** - used by the correlator
///
/// # Errors
/// * `FormatError::MissingSectionMarker` - content before the first `==` line
/// * `FormatError::InvalidCount` - last line of a group is not a count
/// * `FormatError::EmptyStackGroup` - group with a count and no frames
pub fn parse_processed<R: BufRead>(source: R) -> Result<ProcessedTrace, AnalysisError> {
    let mut section = Section::Preamble;
    let mut allocations = StackAggregator::new();
    let mut deallocations = StackAggregator::new();
    let mut group: Vec<String> = Vec::new();
    let mut line_number = 0;
    let mut in_heading = false;

    for line in source.lines() {
        let line = line?;
        line_number += 1;
        let trimmed = line.trim();

        if section == Section::Done {
            break;
        }

        if trimmed.is_empty() {
            flush_group(&mut group, line_number - 1, section, &mut allocations, &mut deallocations)?;
            continue;
        }

        if trimmed.starts_with(SECTION_MARKER) {
            if in_heading {
                debug!("Allocation heading continues on line {}", line_number);
                in_heading = false;
                continue;
            }
            flush_group(&mut group, line_number - 1, section, &mut allocations, &mut deallocations)?;
            section = match section {
                Section::Preamble => Section::Allocations,
                Section::Allocations => Section::Deallocations,
                Section::Deallocations | Section::Done => Section::Done,
            };
            in_heading = section == Section::Allocations;
            continue;
        }

        if section == Section::Preamble {
            return Err(FormatError::MissingSectionMarker {
                line: line_number,
                content: line,
            }
            .into());
        }

        in_heading = false;
        group.push(trimmed.to_string());
    }

    flush_group(&mut group, line_number, section, &mut allocations, &mut deallocations)?;

    let trace = ProcessedTrace {
        allocations: allocations.into_sorted(),
        deallocations: deallocations.into_sorted(),
    };
    debug!(
        "Parsed processed trace: {} allocation stacks, {} deallocation stacks",
        trace.allocations.len(),
        trace.deallocations.len()
    );
    Ok(trace)
}

/// Parse a pre-processed file from disk
pub fn read_processed_file(path: impl AsRef<Path>) -> Result<ProcessedTrace, AnalysisError> {
    let file = File::open(path.as_ref())?;
    parse_processed(BufReader::new(file))
}

/// Turn the buffered group into an occurrence. `last_line` is the line
/// number of the count line.
fn flush_group(
    group: &mut Vec<String>,
    last_line: usize,
    section: Section,
    allocations: &mut StackAggregator,
    deallocations: &mut StackAggregator,
) -> Result<(), FormatError> {
    let Some(count_line) = group.pop() else {
        return Ok(());
    };

    let count = count_line
        .parse::<u64>()
        .map_err(|_| FormatError::InvalidCount {
            line: last_line,
            content: count_line.clone(),
        })?;

    let stack = CallStack::from_lines(group.drain(..))
        .ok_or(FormatError::EmptyStackGroup { line: last_line })?;

    match section {
        Section::Allocations => allocations.add(stack, count),
        Section::Deallocations => deallocations.add(stack, count),
        Section::Preamble | Section::Done => {}
    }
    Ok(())
}
