//! Configuration and constants for the analyzer.

/// Current JSON summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

// Trace entry framing. A block opens with the start marker and closes with the
// end marker, both of which may sit on the same line.
pub const ENTRY_START_MARKER: &str = "<__";
pub const ENTRY_END_MARKER: &str = "__>";

/// Field separator inside an entry header line
pub const HEADER_SEPARATOR: char = ';';

/// Every header carries at least `seq;timestamp;thread;event`
pub const HEADER_PREFIX_FIELDS: usize = 4;

/// Lines starting with this open a section in pre-processed files
pub const SECTION_MARKER: &str = "==";

/// Suffix of the per-file reports written next to analyzed traces.
/// Files with this suffix are skipped when listing trace directories.
pub const REPORT_SUFFIX: &str = ".report";

/// `sbrk` returns this address when it fails
pub const SBRK_FAILURE_ADDRESS: &str = "-0x1";

/// `brk` returns this code when it fails
pub const BRK_FAILURE_CODE: i64 = -1;

// Flamegraph defaults
pub const DEFAULT_FLAMEGRAPH_TITLE: &str = "Leak Suspects";
pub const DEFAULT_FLAMEGRAPH_WIDTH: usize = 1200;

/// Environment variable that caps the worker pool in multi-file modes
pub const JOBS_ENV_VAR: &str = "LEAK_TRACE_JOBS";
