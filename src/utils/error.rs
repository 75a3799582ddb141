//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Malformed input. Fatal for the file being analyzed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("line {line}: found start marker while already inside a trace entry: {content}")]
    NestedEntryStart { line: usize, content: String },

    #[error("line {line}: found end marker outside of a trace entry: {content}")]
    UnexpectedEntryEnd { line: usize, content: String },

    #[error("line {line}: trace entry is never closed")]
    UnterminatedEntry { line: usize },

    #[error("cannot decode header '{header}': {reason}")]
    MalformedHeader { header: String, reason: String },

    #[error("unknown event '{name}' in header '{header}'")]
    UnknownEvent { name: String, header: String },

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("line {line}: expected a section marker, found: {content}")]
    MissingSectionMarker { line: usize, content: String },

    #[error("line {line}: invalid stack count '{content}'")]
    InvalidCount { line: usize, content: String },

    #[error("line {line}: stack group has a count but no frames")]
    EmptyStackGroup { line: usize },

    #[error("stack ends at depth {depth} before diverging from its siblings:\n{stack}")]
    StackTooShort { depth: usize, stack: String },

    #[error("program break {address} moved by {delta} bytes leaves the address range")]
    BreakOverflow { address: String, delta: i64 },

    #[error("accumulated size change of stack overflows ({size} more bytes):\n{stack}")]
    SizeOverflow { stack: String, size: i64 },
}

/// The trace contradicts the allocator state rebuilt so far.
/// Signals a corrupted or non-monotonic capture; fatal for the file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Entry: {entry}\nFound allocation on memory address: {address} that was already allocated by: {existing}")]
    AddressAlreadyLive {
        address: String,
        entry: String,
        existing: String,
    },

    #[error("Entry: {entry}\nFound free on memory address: {address} that was live but is also recorded as freed and not reused")]
    FreedAddressStillWatched { address: String, entry: String },

    #[error("Entry: {entry}\nThread {thread} expected the allocator call paired with: {marker}")]
    UnpairedArrayMarker {
        thread: String,
        marker: String,
        entry: String,
    },

    #[error("Entry: {entry}\ndelete[] of {address} releases {allocated} bytes but declares {declared} bytes")]
    ArraySizeMismatch {
        address: String,
        allocated: i64,
        declared: i64,
        entry: String,
    },
}

/// Any fatal failure while analyzing one trace file
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during flamegraph generation
#[derive(Error, Debug)]
pub enum FlamegraphError {
    #[error("Empty stack data")]
    EmptyStacks,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to render flamegraph: {0}")]
    RenderFailed(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
