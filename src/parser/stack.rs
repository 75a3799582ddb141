//! Call stack representation and return-address normalization.
//!
//! Stacks are kept in the order the tracer prints them: innermost frame
//! (the traced allocator call) first, outermost caller last. The innermost
//! frame carries a return offset (`libc.so.1`malloc+0x64`) that differs
//! between otherwise identical call sites, so it is cut off before stacks
//! are compared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized call stack, usable as a grouping key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallStack(String);

impl CallStack {
    /// Build a stack from raw frame lines in file order.
    ///
    /// Lines are trimmed, blank lines dropped, and the first frame has its
    /// return offset stripped. Returns `None` when no frame is left.
    pub fn from_lines<I, S>(lines: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let frames: Vec<String> = lines
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if frames.is_empty() {
            return None;
        }

        Some(Self(normalize(&frames.join("\n"))))
    }

    /// Parse an already joined stack (frames separated by newlines)
    pub fn parse(text: &str) -> Self {
        Self(normalize(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Frames in file order, innermost first
    pub fn frames(&self) -> impl Iterator<Item = &str> {
        self.0.split('\n').filter(|frame| !frame.is_empty())
    }

    /// Frames ordered from the outermost caller down to the traced call
    pub fn root_first(&self) -> Vec<&str> {
        let mut frames: Vec<&str> = self.frames().collect();
        frames.reverse();
        frames
    }

    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    /// Collapsed `root;caller;leaf` form used by flamegraph tools
    pub fn collapsed(&self) -> String {
        self.root_first()
            .iter()
            .map(|frame| frame.replace(';', ":"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallStack {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

/// Normalize a newline separated stack.
///
/// Trims every frame, drops blank frames and strips the `+offset` suffix of
/// the first frame only. Idempotent.
pub fn normalize(stack: &str) -> String {
    let mut frames = stack
        .split('\n')
        .map(str::trim)
        .filter(|frame| !frame.is_empty());

    let Some(first) = frames.next() else {
        return String::new();
    };

    let mut out = String::with_capacity(stack.len());
    out.push_str(strip_return_offset(first));
    for frame in frames {
        out.push('\n');
        out.push_str(frame);
    }
    out
}

/// `malloc+0x64` -> `malloc`. A frame that starts with `+` or ends right
/// after it is left untouched.
fn strip_return_offset(frame: &str) -> &str {
    match frame.find('+') {
        Some(pos) if pos > 0 && pos + 1 < frame.len() => &frame[..pos],
        _ => frame,
    }
}
