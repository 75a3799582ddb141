//! Combine per-file results into one multi-file view.
//!
//! Files are ordered by name and numbered `{0}`, `{1}`, ... Each category is
//! walked file by file; a stack is reported once, at the first file it
//! appears in, with its count in every file (0 where absent). Matching
//! entries in later files are consumed so they are not reported again.

use crate::aggregator::StackOccurrence;
use crate::correlate::ProcessedAnalysis;
use crate::ledger::AllocationAnalysis;
use crate::parser::CallStack;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// How sure the combined view is about a strong-tier stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Seen succeeding in at least one file
    Strong,
    /// Never seen succeeding in any file
    VeryStrong,
}

/// A stack with its count per file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedStack {
    pub stack: CallStack,
    pub per_file: Vec<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<Confidence>,
}

impl CombinedStack {
    /// `{0}=3, {1}=0`
    pub fn vector(&self) -> String {
        format_vector(&self.per_file)
    }
}

/// Format counts as `{0}=a, {1}=b`
pub fn format_vector<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| format!("{{{}}}={}", index, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Combined allocator analysis of several trace files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedAllocationReport {
    /// File names in index order
    pub files: Vec<String>,
    pub double_frees: Vec<CombinedStack>,
    pub wrong_frees: Vec<CombinedStack>,
    pub strong_wrong_frees: Vec<CombinedStack>,
    pub leaks: Vec<CombinedStack>,
    pub strong_leaks: Vec<CombinedStack>,

    /// Allocations still live at end of each file
    pub pending_per_file: Vec<u64>,
}

/// Combined correlation of several pre-processed files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedProcessedReport {
    pub files: Vec<String>,
    pub allocations: Vec<CombinedStack>,
    pub unfreed_allocations: Vec<CombinedStack>,
    pub deallocations: Vec<CombinedStack>,
    pub unknown_deallocations: Vec<CombinedStack>,

    /// Allocation calls minus deallocation calls per file
    pub balance_per_file: Vec<i64>,
}

/// Combine one category across files given in index order
pub fn combine_category(per_file: &[&[StackOccurrence]]) -> Vec<CombinedStack> {
    let mut remaining: Vec<HashMap<&CallStack, u64>> = per_file
        .iter()
        .map(|stacks| stacks.iter().map(|occ| (&occ.stack, occ.count)).collect())
        .collect();

    let mut combined = Vec::new();
    for (index, stacks) in per_file.iter().enumerate() {
        for occurrence in stacks.iter() {
            if remaining[index].remove(&occurrence.stack).is_none() {
                continue;
            }

            let mut counts = vec![0; per_file.len()];
            counts[index] = occurrence.count;
            for (later, map) in remaining.iter_mut().enumerate().skip(index + 1) {
                if let Some(count) = map.remove(&occurrence.stack) {
                    counts[later] = count;
                }
            }

            combined.push(CombinedStack {
                stack: occurrence.stack.clone(),
                per_file: counts,
                confidence: None,
            });
        }
    }
    combined
}

/// Combine the list `select` picks out of each file's result
fn category<T>(analyses: &[&T], select: impl Fn(&T) -> &[StackOccurrence]) -> Vec<CombinedStack> {
    let lists: Vec<&[StackOccurrence]> = analyses.iter().map(|a| select(a)).collect();
    combine_category(&lists)
}

fn sorted_by_name<T>(results: &[(String, T)]) -> Vec<&(String, T)> {
    let mut sorted: Vec<&(String, T)> = results.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

fn with_confidence(
    mut stacks: Vec<CombinedStack>,
    succeeded: &[&BTreeSet<CallStack>],
) -> Vec<CombinedStack> {
    for combined in &mut stacks {
        let seen = succeeded.iter().any(|set| set.contains(&combined.stack));
        combined.confidence = Some(if seen {
            Confidence::Strong
        } else {
            Confidence::VeryStrong
        });
    }
    stacks
}

fn column_sums(stacks: &[CombinedStack], files: usize) -> Vec<u64> {
    let mut sums = vec![0; files];
    for combined in stacks {
        for (sum, count) in sums.iter_mut().zip(&combined.per_file) {
            *sum += count;
        }
    }
    sums
}

/// Combine allocator analyses keyed by file name
///
/// **Public** - used by the `combine` command
pub fn combine_allocation_results(results: &[(String, AllocationAnalysis)]) -> CombinedAllocationReport {
    let sorted = sorted_by_name(results);
    let analyses: Vec<&AllocationAnalysis> = sorted.iter().map(|(_, a)| a).collect();
    let files: Vec<String> = sorted.iter().map(|(name, _)| name.clone()).collect();

    let freed: Vec<&BTreeSet<CallStack>> =
        analyses.iter().map(|a| &a.successfully_freed_stacks).collect();
    let deallocated: Vec<&BTreeSet<CallStack>> = analyses
        .iter()
        .map(|a| &a.successfully_deallocated_stacks)
        .collect();

    let leaks = category(&analyses, |a| a.leak_candidates.as_slice());
    let pending_per_file = column_sums(&leaks, files.len());

    let report = CombinedAllocationReport {
        double_frees: category(&analyses, |a| a.double_frees.as_slice()),
        wrong_frees: category(&analyses, |a| a.wrong_frees.as_slice()),
        strong_wrong_frees: with_confidence(
            category(&analyses, |a| a.never_correctly_freed.as_slice()),
            &freed,
        ),
        strong_leaks: with_confidence(
            category(&analyses, |a| a.never_freed.as_slice()),
            &deallocated,
        ),
        leaks,
        pending_per_file,
        files,
    };

    debug!(
        "Combined {} files: {} leak stacks, {} wrong free stacks",
        report.files.len(),
        report.leaks.len(),
        report.wrong_frees.len()
    );
    report
}

/// Combine processed-file correlations keyed by file name
///
/// **Public** - used by the `correlate` command
pub fn combine_processed_results(results: &[(String, ProcessedAnalysis)]) -> CombinedProcessedReport {
    let sorted = sorted_by_name(results);
    let analyses: Vec<&ProcessedAnalysis> = sorted.iter().map(|(_, a)| a).collect();
    let files: Vec<String> = sorted.iter().map(|(name, _)| name.clone()).collect();

    let balance_per_file = analyses.iter().map(|a| a.balance()).collect();

    CombinedProcessedReport {
        allocations: category(&analyses, |a| a.allocations.as_slice()),
        unfreed_allocations: category(&analyses, |a| a.unfreed_allocations.as_slice()),
        deallocations: category(&analyses, |a| a.deallocations.as_slice()),
        unknown_deallocations: category(&analyses, |a| a.unknown_deallocations.as_slice()),
        balance_per_file,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(stack: &str, count: u64) -> StackOccurrence {
        StackOccurrence::new(CallStack::parse(stack), count)
    }

    #[test]
    fn test_combine_category_consumes_later_matches() {
        let first = vec![occ("A", 3), occ("B", 1)];
        let second = vec![occ("C", 2), occ("A", 5)];
        let third = vec![occ("B", 4)];

        let combined = combine_category(&[&first[..], &second[..], &third[..]]);
        let rows: Vec<(&str, Vec<u64>)> = combined
            .iter()
            .map(|c| (c.stack.as_str(), c.per_file.clone()))
            .collect();

        assert_eq!(
            rows,
            vec![
                ("A", vec![3, 5, 0]),
                ("B", vec![1, 0, 4]),
                ("C", vec![0, 2, 0]),
            ]
        );
    }

    #[test]
    fn test_format_vector() {
        assert_eq!(format_vector(&[3u64, 0]), "{0}=3, {1}=0");
        assert_eq!(format_vector::<u64>(&[]), "");
    }

    #[test]
    fn test_strong_leak_confidence() {
        let leaky = AllocationAnalysis {
            leak_candidates: vec![occ("L", 2), occ("M", 1)],
            never_freed: vec![occ("L", 2), occ("M", 1)],
            total_leak_suspects: 3,
            ..Default::default()
        };

        let mut other = AllocationAnalysis::default();
        other.successfully_deallocated_stacks.insert(CallStack::parse("M"));

        let report = combine_allocation_results(&[
            ("b.trace".to_string(), other),
            ("a.trace".to_string(), leaky),
        ]);

        assert_eq!(report.files, vec!["a.trace", "b.trace"]);
        assert_eq!(report.pending_per_file, vec![3, 0]);
        let confidence: Vec<(&str, Option<Confidence>)> = report
            .strong_leaks
            .iter()
            .map(|c| (c.stack.as_str(), c.confidence))
            .collect();
        assert_eq!(
            confidence,
            vec![
                ("L", Some(Confidence::VeryStrong)),
                ("M", Some(Confidence::Strong)),
            ]
        );
    }

    #[test]
    fn test_processed_balance_per_file() {
        let first = ProcessedAnalysis {
            allocations: vec![occ("A", 5)],
            deallocations: vec![occ("F", 2)],
            ..Default::default()
        };
        let second = ProcessedAnalysis {
            allocations: vec![occ("A", 1)],
            deallocations: vec![occ("F", 4)],
            ..Default::default()
        };
        let report = combine_processed_results(&[
            ("one".to_string(), first),
            ("two".to_string(), second),
        ]);
        assert_eq!(report.balance_per_file, vec![3, -3]);
        assert_eq!(report.allocations.len(), 1);
        assert_eq!(report.allocations[0].per_file, vec![5, 1]);
    }
}
