//! Plain-text report rendering.
//!
//! Reports are byte-stable for a given analysis: no timestamps, fixed
//! headings, lists in presentation order.

use crate::aggregator::{total_count, MergedStackTree, StackOccurrence};
use crate::correlate::{
    format_vector, CombinedAllocationReport, CombinedProcessedReport, CombinedStack, Confidence,
    ProcessedAnalysis,
};
use crate::ledger::{AllocationAnalysis, HeapAnalysis};
use crate::utils::error::FormatError;

/// Append `text` and a newline
fn line(out: &mut String, text: impl AsRef<str>) {
    out.push_str(text.as_ref());
    out.push('\n');
}

/// Heading line followed by the stack and a blank separator
fn stack_block(out: &mut String, heading: impl AsRef<str>, stack: impl std::fmt::Display) {
    line(out, heading);
    out.push_str(&format!("{}\n\n\n", stack));
}

fn merged_tree_if_several(stacks: &[StackOccurrence]) -> Result<Option<MergedStackTree>, FormatError> {
    if stacks.len() > 1 {
        MergedStackTree::build(stacks).map(Some)
    } else {
        Ok(None)
    }
}

/// Render the single-file allocator report
///
/// **Public** - written by the `memalloc` and `combine` commands
///
/// # Errors
/// * `FormatError::StackTooShort` - leak stacks cannot be merged into a tree
pub fn render_allocation_report(analysis: &AllocationAnalysis) -> Result<String, FormatError> {
    let stats = &analysis.statistics;
    let mut out = String::new();

    line(&mut out, "Call statistics");
    line(&mut out, format!("Found {} malloc calls", stats.malloc));
    line(&mut out, format!("Found {} calloc calls", stats.calloc));
    line(&mut out, format!("Found {} realloc calls", stats.realloc));
    line(&mut out, format!("Found {} free calls", stats.free));
    if stats.new_array > 0 || stats.delete_array > 0 {
        line(&mut out, format!("Found {} new[] markers", stats.new_array));
        line(&mut out, format!("Found {} delete[] markers", stats.delete_array));
    }

    line(&mut out, "\nDouble free issues");
    line(
        &mut out,
        format!("Found {} double free stacks in total", analysis.total_double_frees),
    );
    if analysis.total_double_frees > 0 {
        line(
            &mut out,
            format!("Found {} unique double free stacks", analysis.double_frees.len()),
        );
        for occ in &analysis.double_frees {
            line(
                &mut out,
                format!("Found double free stack {} times. Stack:\n{}\n", occ.count, occ.stack),
            );
        }
    }

    line(&mut out, "\nFree non-allocated memory issues (may also be potential memory leaks)");
    line(
        &mut out,
        format!(
            "Found {} stacks that freed memory that was not allocated during the period of the trace",
            analysis.total_wrong_frees
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} unique stacks that freed memory that was not allocated during the period of the trace",
            analysis.wrong_frees.len()
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} unique stacks that correctly freed memory",
            analysis.successfully_freed_stacks.len()
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} unique stacks that have never been found to correctly free memory",
            analysis.never_correctly_freed.len()
        ),
    );
    line(&mut out, "Suspected wrong free stacks\n");
    for occ in &analysis.wrong_frees {
        stack_block(
            &mut out,
            format!("Suspected wrong free stack found {} times", occ.count),
            &occ.stack,
        );
    }
    line(&mut out, "Strongly suspected wrong free stacks\n");
    for occ in &analysis.never_correctly_freed {
        stack_block(
            &mut out,
            format!("Strongly suspected wrong free stack found {} times", occ.count),
            &occ.stack,
        );
    }

    line(&mut out, "\nMemory leak issues");
    line(
        &mut out,
        format!("Found {} potential memory leaks in total", analysis.total_leak_suspects),
    );
    line(
        &mut out,
        format!(
            "Found {} unique potential memory leak stacks (suspects)",
            analysis.leak_candidates.len()
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} unique stacks that allocated memory that was correctly freed",
            analysis.successfully_deallocated_stacks.len()
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} unique stacks that were never correctly deleted/freed (strong suspects)\n",
            analysis.never_freed.len()
        ),
    );

    for occ in &analysis.leak_candidates {
        stack_block(&mut out, format!("Suspect leak stack found {} times", occ.count), &occ.stack);
    }
    for occ in &analysis.never_freed {
        stack_block(
            &mut out,
            format!("Strongly suspect leak stack found {} times", occ.count),
            &occ.stack,
        );
    }

    let counted = total_count(&analysis.leak_candidates);
    if counted != analysis.total_leak_suspects {
        line(
            &mut out,
            format!(
                "(Warn) Found mispatch in counting total memory allocations that were not deleted. From pre-processing: {} from each individual stack count:{}\n",
                analysis.total_leak_suspects, counted
            ),
        );
    }

    if let Some(tree) = merged_tree_if_several(&analysis.leak_candidates)? {
        line(&mut out, "Presenting memory leak suspects in a combined call stack\n");
        line(&mut out, tree.render());
    }
    if let Some(tree) = merged_tree_if_several(&analysis.never_freed)? {
        line(&mut out, "Presenting strong memory leak suspects in a combined call stack\n");
        line(&mut out, tree.render());
    }

    Ok(out)
}

/// Render the single-file heap-boundary report
///
/// **Public** - written by the `brk` command
pub fn render_heap_report(analysis: &HeapAnalysis) -> Result<String, FormatError> {
    let mut out = String::new();

    line(&mut out, "\nCall statistics\n");
    line(
        &mut out,
        format!(
            "Found {} brk calls that increased the process virtual memory",
            analysis.increases
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} brk calls that decreased the process virtual memory",
            analysis.decreases
        ),
    );
    line(
        &mut out,
        format!("Found {} brk calls that were neutral in terms of memory", analysis.neutral),
    );
    line(&mut out, format!("Found {} brk calls that failed", analysis.failed));
    line(
        &mut out,
        format!("Found in total {} unique brk stacks", analysis.unique_stacks.len()),
    );

    if analysis.failed > 0 {
        line(&mut out, "\n*** Failed brk calls (unsuccessful memory increase requests) ***\n");
        for occ in &analysis.unique_failed_stacks {
            stack_block(
                &mut out,
                format!(
                    "Failed brk stack found {} times, total size:{}",
                    occ.count,
                    occ.size.unwrap_or(0)
                ),
                &occ.stack,
            );
        }
    }

    line(&mut out, "\n*** Unique brk call stacks ***\n");
    for occ in &analysis.unique_stacks {
        stack_block(
            &mut out,
            format!(
                "Unique brk stack found {} times, total size:{}",
                occ.count,
                occ.size.unwrap_or(0)
            ),
            &occ.stack,
        );
    }

    if !analysis.unique_stacks.is_empty() {
        let tree = MergedStackTree::build(&analysis.unique_stacks)?;
        line(&mut out, "Presenting brk stacks in a combined call stack\n");
        line(&mut out, tree.render());
    }

    Ok(out)
}

/// Render the per-file summary of a correlated pre-processed file
pub fn render_processed_summary(analysis: &ProcessedAnalysis) -> String {
    let mut out = String::new();
    line(
        &mut out,
        format!("Found {} memory allocation calls", analysis.total_allocations()),
    );
    line(
        &mut out,
        format!(
            "Found {} unique memory allocation stacks",
            analysis.allocations.len()
        ),
    );
    line(
        &mut out,
        format!("Found {} memory de-allocation calls", analysis.total_deallocations()),
    );
    line(
        &mut out,
        format!(
            "Found {} unique memory de-allocation stacks",
            analysis.deallocations.len()
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} (unfreed) memory allocation calls from {} unique allocation stacks (suspect memory leaks)",
            analysis.total_unfreed(),
            analysis.unfreed_allocations.len()
        ),
    );
    line(
        &mut out,
        format!(
            "Found {} unknown free calls from {} unique free stacks",
            analysis.total_unknown(),
            analysis.unknown_deallocations.len()
        ),
    );
    line(
        &mut out,
        format!(
            "number of memory allocation calls - number of free calls = {}\n",
            analysis.balance()
        ),
    );
    out
}

fn file_legend(out: &mut String, title: &str, files: &[String]) {
    line(out, title);
    for (index, name) in files.iter().enumerate() {
        line(out, format!("{} {{{}}}", name, index));
    }
    line(out, "");
}

fn section(out: &mut String, heading: &str) {
    line(out, format!("\n\n{}\n\n", heading));
}

/// Render the combined allocator report
///
/// **Public** - written by the `combine` command
pub fn render_combined_allocation_report(report: &CombinedAllocationReport) -> String {
    let mut out = String::new();
    file_legend(&mut out, "Combined memory allocator analysis for files:", &report.files);

    section(&mut out, "*** Double free cases ***");
    for combined in &report.double_frees {
        line(
            &mut out,
            format!(
                "Found double free stack {} times. Stack:\n{}\n",
                combined.vector(),
                combined.stack
            ),
        );
    }

    section(
        &mut out,
        "*** Suspected wrong free cases (stacks that freed memory that was not allocated during the tracing)***",
    );
    for combined in &report.wrong_frees {
        stack_block(
            &mut out,
            format!("Suspected wrong free stack found {} times", combined.vector()),
            &combined.stack,
        );
    }

    section(
        &mut out,
        "*** Strongly suspected wrong free cases (the suspected call stacks freed memory that was not allocated during the tracing and have not been found to correctly free memory during the tracing) ***",
    );
    for combined in &report.strong_wrong_frees {
        let heading = tiered_heading(
            combined,
            "wrong free stack",
            "(it has never been found to correctly free memory for all trace files)",
        );
        stack_block(&mut out, heading, &combined.stack);
    }

    section(
        &mut out,
        "*** Suspected leaks (stacks that allocated memory that was not freed during the tracing)***",
    );
    for combined in &report.leaks {
        stack_block(
            &mut out,
            format!("Suspected leak stack found {} times", combined.vector()),
            &combined.stack,
        );
    }

    section(
        &mut out,
        "*** Strongly suspected leaks (stacks that allocated memory that was not freed during the tracing and have not been found to allocate memory that was freed during the tracing )***",
    );
    for combined in &report.strong_leaks {
        let heading = tiered_heading(
            combined,
            "leak stack",
            "(it has never allocated memory that has been deallocated for all trace files)",
        );
        stack_block(&mut out, heading, &combined.stack);
    }

    line(
        &mut out,
        format!(
            "\n\nTotal memory allocations that were not deleted per file :{}",
            format_vector(&report.pending_per_file)
        ),
    );
    out
}

fn tiered_heading(combined: &CombinedStack, subject: &str, never_note: &str) -> String {
    match combined.confidence {
        Some(Confidence::VeryStrong) => format!(
            "Very strongly suspected {} found {} times {}\n",
            subject,
            combined.vector(),
            never_note
        ),
        _ => format!("Strongly suspected {} found {} times", subject, combined.vector()),
    }
}

/// Render the combined pre-processed report
///
/// **Public** - written by the `correlate` command
///
/// `print_stacks` adds the full allocation and deallocation tables.
pub fn render_combined_processed_report(report: &CombinedProcessedReport, print_stacks: bool) -> String {
    let mut out = String::new();
    file_legend(
        &mut out,
        "Combined (short and long term) memory allocator analysis for files:",
        &report.files,
    );

    if print_stacks {
        section(&mut out, "*** Allocation Stacks ***");
        for combined in &report.allocations {
            stack_block(
                &mut out,
                format!("Allocation stack found {} times", combined.vector()),
                &combined.stack,
            );
        }
    }

    section(
        &mut out,
        "*** Suspect memory leak stacks (such memory allocations have never been found to be freed in the short term traces) ***",
    );
    for combined in &report.unfreed_allocations {
        stack_block(
            &mut out,
            format!("Suspect allocation stack found {} times", combined.vector()),
            &combined.stack,
        );
    }

    if print_stacks {
        section(&mut out, "*** Dellocation Stacks ***");
        for combined in &report.deallocations {
            stack_block(
                &mut out,
                format!("Deallocation stack found {} times", combined.vector()),
                &combined.stack,
            );
        }
    }

    section(
        &mut out,
        "*** Unknown free stacks (may potentially free memory from the suspect memory leaks reported here) ***",
    );
    for combined in &report.unknown_deallocations {
        stack_block(
            &mut out,
            format!("Unknown Deallocation stack found {} times", combined.vector()),
            &combined.stack,
        );
    }

    line(
        &mut out,
        format!(
            "\n\nMemory allocations - memory deallocations per file :{}",
            format_vector(&report.balance_per_file)
        ),
    );
    out
}
