//! Trace entry types and header decoding.
//!
//! Header layout is `seq;timestamp;thread;event;...` where the trailing
//! fields depend on the event:
//!
//! | event            | fields                              |
//! |------------------|-------------------------------------|
//! | malloc / calloc  | address, size                       |
//! | realloc          | previous address, new address, size |
//! | free             | address                             |
//! | new[]            | size                                |
//! | delete[]         | address, optional size              |
//! | brk              | address, return code                |
//! | sbrk             | previous break, signed increment    |

use super::stack::CallStack;
use crate::utils::config::{
    BRK_FAILURE_CODE, ENTRY_END_MARKER, ENTRY_START_MARKER, HEADER_PREFIX_FIELDS,
    HEADER_SEPARATOR, SBRK_FAILURE_ADDRESS,
};
use crate::utils::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tracer script produced a file, and so which events it may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFamily {
    /// malloc/calloc/realloc/free (plus array markers)
    Allocator,
    /// brk/sbrk
    HeapBoundary,
}

/// Traced call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Malloc,
    Calloc,
    Realloc,
    Free,
    /// `operator new[]` marker, paired with the next malloc on the thread
    NewArray,
    /// `operator delete[]` marker, paired with the next free on the thread
    DeleteArray,
    Brk,
    Sbrk,
}

impl EventKind {
    /// Look up an event by the name the tracer prints
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "malloc" => Some(Self::Malloc),
            "calloc" => Some(Self::Calloc),
            "realloc" => Some(Self::Realloc),
            "free" => Some(Self::Free),
            "new[]" => Some(Self::NewArray),
            "delete[]" => Some(Self::DeleteArray),
            "brk" => Some(Self::Brk),
            "sbrk" => Some(Self::Sbrk),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::Calloc => "calloc",
            Self::Realloc => "realloc",
            Self::Free => "free",
            Self::NewArray => "new[]",
            Self::DeleteArray => "delete[]",
            Self::Brk => "brk",
            Self::Sbrk => "sbrk",
        }
    }

    pub fn family(self) -> TraceFamily {
        match self {
            Self::Brk | Self::Sbrk => TraceFamily::HeapBoundary,
            _ => TraceFamily::Allocator,
        }
    }

    pub fn is_array_marker(self) -> bool {
        matches!(self, Self::NewArray | Self::DeleteArray)
    }

    /// Number of fields after the common `seq;ts;thread;event` prefix
    fn required_fields(self) -> usize {
        match self {
            Self::Malloc | Self::Calloc | Self::Brk | Self::Sbrk => 2,
            Self::Realloc => 3,
            Self::Free | Self::NewArray | Self::DeleteArray => 1,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded tracer block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub sequence: u64,
    pub timestamp: String,
    pub thread_id: String,
    pub kind: EventKind,

    /// Address as printed by the tracer. Empty for `new[]` markers.
    pub address: String,

    /// Requested size, or the signed increment for `sbrk`
    pub size: Option<i64>,

    /// Address handed to `realloc`
    pub previous_address: Option<String>,

    /// Only `brk`/`sbrk` can fail
    pub success: bool,

    pub stack: Option<CallStack>,
}

impl TraceEntry {
    /// The stack, or an empty one when the tracer captured none
    pub fn stack_or_empty(&self) -> CallStack {
        self.stack.clone().unwrap_or_default()
    }

    /// `realloc` that handed back a different block
    pub fn is_moving_realloc(&self) -> bool {
        self.kind == EventKind::Realloc
            && self.previous_address.as_deref() != Some(self.address.as_str())
    }

    /// Header line the entry was decoded from (markers stripped)
    pub fn header(&self) -> String {
        let mut fields = vec![
            self.sequence.to_string(),
            self.timestamp.clone(),
            self.thread_id.clone(),
            self.kind.name().to_string(),
        ];

        match self.kind {
            EventKind::Realloc => {
                fields.push(self.previous_address.clone().unwrap_or_default());
                fields.push(self.address.clone());
            }
            EventKind::NewArray => {}
            _ => fields.push(self.address.clone()),
        }

        match self.kind {
            EventKind::Brk => {
                let code = if self.success { 0 } else { BRK_FAILURE_CODE };
                fields.push(code.to_string());
            }
            _ => {
                if let Some(size) = self.size {
                    fields.push(size.to_string());
                }
            }
        }

        fields.join(";")
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        if let Some(stack) = &self.stack {
            write!(f, "\n{}", stack)?;
        }
        Ok(())
    }
}

/// Remove both entry markers from a raw line
pub fn strip_markers(line: &str) -> String {
    line.replace(ENTRY_START_MARKER, "")
        .replace(ENTRY_END_MARKER, "")
}

/// Decode the lines of one block into an entry.
///
/// The first line is the header; the rest are stack frames in file order.
pub fn decode_entry<S: AsRef<str>>(
    lines: &[S],
    family: TraceFamily,
) -> Result<TraceEntry, FormatError> {
    let Some((first, frames)) = lines.split_first() else {
        return Err(FormatError::MalformedHeader {
            header: String::new(),
            reason: "empty trace entry".to_string(),
        });
    };

    let header = strip_markers(first.as_ref()).trim().to_string();
    let fields: Vec<&str> = header.split(HEADER_SEPARATOR).map(str::trim).collect();

    if fields.len() < HEADER_PREFIX_FIELDS + 1 {
        return Err(malformed(&header, "too few fields"));
    }

    let kind = EventKind::from_name(fields[3])
        .filter(|kind| kind.family() == family)
        .ok_or_else(|| FormatError::UnknownEvent {
            name: fields[3].to_string(),
            header: header.clone(),
        })?;

    let args = &fields[HEADER_PREFIX_FIELDS..];
    if args.len() < kind.required_fields() {
        return Err(malformed(
            &header,
            &format!(
                "{} needs {} fields after the event name, found {}",
                kind,
                kind.required_fields(),
                args.len()
            ),
        ));
    }

    let sequence = fields[0]
        .parse::<u64>()
        .map_err(|e| malformed(&header, &format!("invalid sequence number: {}", e)))?;

    let mut entry = TraceEntry {
        sequence,
        timestamp: fields[1].to_string(),
        thread_id: fields[2].to_string(),
        kind,
        address: String::new(),
        size: None,
        previous_address: None,
        success: true,
        stack: CallStack::from_lines(frames.iter().map(|line| strip_markers(line.as_ref()))),
    };

    match kind {
        EventKind::Malloc | EventKind::Calloc => {
            entry.address = args[0].to_string();
            entry.size = Some(parse_number(&header, args[1])?);
        }
        EventKind::Realloc => {
            entry.previous_address = Some(args[0].to_string());
            entry.address = args[1].to_string();
            entry.size = Some(parse_number(&header, args[2])?);
        }
        EventKind::Free => {
            entry.address = args[0].to_string();
        }
        EventKind::NewArray => {
            entry.size = Some(parse_number(&header, args[0])?);
        }
        EventKind::DeleteArray => {
            entry.address = args[0].to_string();
            entry.size = match args.get(1).filter(|field| !field.is_empty()) {
                Some(field) => Some(parse_number(&header, field)?),
                None => None,
            };
        }
        EventKind::Brk => {
            entry.address = args[0].to_string();
            entry.success = parse_number(&header, args[1])? != BRK_FAILURE_CODE;
        }
        EventKind::Sbrk => {
            entry.address = args[0].to_string();
            entry.size = Some(parse_number(&header, args[1])?);
            entry.success = entry.address != SBRK_FAILURE_ADDRESS;
        }
    }

    Ok(entry)
}

/// Parse an address the way the tracer prints it: `0x` hex, decimal,
/// optionally negative (`-0x1`).
pub fn parse_address(value: &str) -> Result<i64, FormatError> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else {
        digits.parse::<i64>()
    }
    .map_err(|_| FormatError::InvalidAddress(value.to_string()))?;

    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_number(header: &str, field: &str) -> Result<i64, FormatError> {
    field
        .parse::<i64>()
        .map_err(|e| malformed(header, &format!("invalid number '{}': {}", field, e)))
}

fn malformed(header: &str, reason: &str) -> FormatError {
    FormatError::MalformedHeader {
        header: header.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_malloc_single_line() {
        let entry = decode_entry(
            &["<__1;2024-01-01 10:00:00;7;malloc;0x10;16__>"],
            TraceFamily::Allocator,
        )
        .unwrap();

        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.thread_id, "7");
        assert_eq!(entry.kind, EventKind::Malloc);
        assert_eq!(entry.address, "0x10");
        assert_eq!(entry.size, Some(16));
        assert!(entry.stack.is_none());
    }

    #[test]
    fn test_decode_realloc_fields() {
        let entry = decode_entry(
            &["<__3;ts;1;realloc;0x10;0x20;64", "libc.so.1`realloc+0x4", "app`grow__>"],
            TraceFamily::Allocator,
        )
        .unwrap();

        assert_eq!(entry.previous_address.as_deref(), Some("0x10"));
        assert_eq!(entry.address, "0x20");
        assert_eq!(entry.size, Some(64));
        assert!(entry.is_moving_realloc());
        assert_eq!(entry.stack.unwrap().as_str(), "libc.so.1`realloc\napp`grow");
    }

    #[test]
    fn test_decode_brk_failure() {
        let entry = decode_entry(&["<__1;ts;1;brk;0x8000;-1__>"], TraceFamily::HeapBoundary)
            .unwrap();
        assert!(!entry.success);

        let entry = decode_entry(&["<__1;ts;1;brk;0x8000;0__>"], TraceFamily::HeapBoundary)
            .unwrap();
        assert!(entry.success);
    }

    #[test]
    fn test_decode_sbrk_failure() {
        let entry = decode_entry(&["<__1;ts;1;sbrk;-0x1;4096__>"], TraceFamily::HeapBoundary)
            .unwrap();
        assert!(!entry.success);
        assert_eq!(entry.size, Some(4096));
    }

    #[test]
    fn test_decode_delete_array_optional_size() {
        let entry = decode_entry(&["<__1;ts;1;delete[];0x10__>"], TraceFamily::Allocator)
            .unwrap();
        assert_eq!(entry.size, None);

        let entry = decode_entry(&["<__1;ts;1;delete[];0x10;32__>"], TraceFamily::Allocator)
            .unwrap();
        assert_eq!(entry.size, Some(32));
    }

    #[test]
    fn test_unknown_event_for_family() {
        let err = decode_entry(&["<__1;ts;1;brk;0x10;0__>"], TraceFamily::Allocator)
            .unwrap_err();
        assert!(matches!(err, FormatError::UnknownEvent { .. }));

        let err = decode_entry(&["<__1;ts;1;mmap;0x10;0__>"], TraceFamily::HeapBoundary)
            .unwrap_err();
        assert!(matches!(err, FormatError::UnknownEvent { .. }));
    }

    #[test]
    fn test_too_few_fields() {
        let err = decode_entry(&["<__1;ts;1;malloc;0x10__>"], TraceFamily::Allocator)
            .unwrap_err();
        assert!(matches!(err, FormatError::MalformedHeader { .. }));

        let err = decode_entry(&["<__1;ts;1__>"], TraceFamily::Allocator).unwrap_err();
        assert!(matches!(err, FormatError::MalformedHeader { .. }));
    }

    #[test]
    fn test_invalid_size() {
        let err = decode_entry(&["<__1;ts;1;malloc;0x10;big__>"], TraceFamily::Allocator)
            .unwrap_err();
        assert!(matches!(err, FormatError::MalformedHeader { .. }));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x10").unwrap(), 16);
        assert_eq!(parse_address("-0x1").unwrap(), -1);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_header_round_trips_through_display() {
        let entry = decode_entry(
            &["<__9;ts;3;realloc;0x10;0x20;64", "realloc+0x4", "main__>"],
            TraceFamily::Allocator,
        )
        .unwrap();
        assert_eq!(entry.to_string(), "9;ts;3;realloc;0x10;0x20;64\nrealloc\nmain");
    }
}
