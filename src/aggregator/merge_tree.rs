//! Merge related call stacks into one indented tree.
//!
//! Stacks are read root first. Frames shared by several stacks are printed
//! once; where the stacks diverge, each branch is printed one tab deeper.
//! A branch that only one stack follows is printed down to its leaf and the
//! leaf line is annotated with the stack's frequency (and size change).
//!
//! ```text
//! root
//!     foo
//!         bar    ***** Found  2  times *****
//!         baz    ***** Found  3  times *****
//! ```

use super::stack_builder::StackOccurrence;
use crate::utils::error::FormatError;
use std::collections::BTreeMap;
use std::fmt;

/// One node of a merged tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackTreeNode {
    /// Tail of a single stack, from `depth` down to its leaf frame
    Leaf {
        depth: usize,
        frames: Vec<String>,
        count: u64,
        size: Option<i64>,
    },
    /// Frame shared by more than one stack
    Branch {
        depth: usize,
        frame: String,
        children: BTreeMap<String, StackTreeNode>,
    },
}

/// Merged view of a set of stacks, partitioned by root frame
///
/// **Public** - rendered into the leak and heap-boundary reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedStackTree {
    pub roots: BTreeMap<String, StackTreeNode>,
}

impl MergedStackTree {
    /// Build the tree for a list of unique stacks
    ///
    /// # Errors
    /// * `FormatError::StackTooShort` - a stack ends on a frame other
    ///   stacks continue past, so it has no leaf of its own
    pub fn build(stacks: &[StackOccurrence]) -> Result<Self, FormatError> {
        let paths: Vec<Vec<&str>> = stacks.iter().map(root_first_frames).collect();

        let mut partitions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, path) in paths.iter().enumerate() {
            partitions.entry(path[0]).or_default().push(index);
        }

        let mut roots = BTreeMap::new();
        for (root, members) in partitions {
            roots.insert(root.to_string(), build_node(0, &members, &paths, stacks)?);
        }
        Ok(Self { roots })
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Render with one tab of indentation per depth level
    pub fn render(&self) -> String {
        let mut out = String::new();
        for node in self.roots.values() {
            render_node(node, &mut out);
        }
        out
    }
}

impl fmt::Display for MergedStackTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A stack without frames is shown as a single empty frame
fn root_first_frames(occurrence: &StackOccurrence) -> Vec<&str> {
    let frames = occurrence.stack.root_first();
    if frames.is_empty() {
        vec![""]
    } else {
        frames
    }
}

fn build_node(
    depth: usize,
    members: &[usize],
    paths: &[Vec<&str>],
    stacks: &[StackOccurrence],
) -> Result<StackTreeNode, FormatError> {
    if let [only] = members {
        let occurrence = &stacks[*only];
        return Ok(StackTreeNode::Leaf {
            depth,
            frames: paths[*only][depth..].iter().map(|f| f.to_string()).collect(),
            count: occurrence.count,
            size: occurrence.size,
        });
    }

    let mut partitions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &index in members {
        match paths[index].get(depth + 1) {
            Some(frame) => partitions.entry(*frame).or_default().push(index),
            None => {
                return Err(FormatError::StackTooShort {
                    depth,
                    stack: stacks[index].stack.to_string(),
                })
            }
        }
    }

    let mut children = BTreeMap::new();
    for (frame, group) in partitions {
        children.insert(frame.to_string(), build_node(depth + 1, &group, paths, stacks)?);
    }

    Ok(StackTreeNode::Branch {
        depth,
        frame: paths[members[0]][depth].to_string(),
        children,
    })
}

fn render_node(node: &StackTreeNode, out: &mut String) {
    match node {
        StackTreeNode::Leaf {
            depth,
            frames,
            count,
            size,
        } => {
            let last = frames.len().saturating_sub(1);
            for (offset, frame) in frames.iter().enumerate() {
                push_indented(out, depth + offset, frame);
                if offset == last {
                    out.push_str(&leaf_annotation(*count, *size));
                }
                out.push('\n');
            }
        }
        StackTreeNode::Branch {
            depth,
            frame,
            children,
        } => {
            push_indented(out, *depth, frame);
            out.push('\n');
            for child in children.values() {
                render_node(child, out);
            }
        }
    }
}

fn push_indented(out: &mut String, depth: usize, frame: &str) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str(frame);
}

/// Suffix of the leaf line
pub fn leaf_annotation(count: u64, size: Option<i64>) -> String {
    match size {
        Some(size) => format!(
            "\t***** Found {} times, overall size increase: {} bytes *****",
            count, size
        ),
        None => format!("\t***** Found  {}  times *****", count),
    }
}
