//! Single-file analysis commands.
//!
//! `memalloc` and `brk` both:
//! 1. Replay the trace through the matching ledger
//! 2. Render the text report
//! 3. Write the report, and optionally a JSON summary and a flamegraph

use super::models::AnalyzeArgs;
use super::utils::report_path_for;
use crate::aggregator::StackOccurrence;
use crate::flamegraph::{generate_flamegraph, FlamegraphConfig};
use crate::ledger::{analyze_allocation_file, analyze_heap_file};
use crate::output::{
    render_allocation_report, render_heap_report, write_report, write_summary, write_svg,
    AnalysisSummary,
};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Execute the `memalloc` command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Input trace and output paths
///
/// # Errors
/// * Unreadable input file
/// * Format or consistency errors in the trace
/// * Report, summary or flamegraph write errors
pub fn execute_memalloc(args: AnalyzeArgs) -> Result<()> {
    let start_time = Instant::now();
    info!(
        "Started memory allocator analysis for file {} on: {}",
        args.input.display(),
        chrono::Local::now()
    );

    info!("Step 1/3: Replaying allocator trace...");
    let analysis = analyze_allocation_file(&args.input)
        .with_context(|| format!("Failed to analyze {}", args.input.display()))?;
    debug!("Call statistics: {:?}", analysis.statistics);
    if let Some(top) = analysis.leak_candidates.first() {
        debug!("Top leak suspect: {}", top.summary());
    }

    info!("Step 2/3: Rendering report...");
    let report = render_allocation_report(&analysis).context("Failed to build leak stack tree")?;

    info!("Step 3/3: Writing output files...");
    let output = report_output(&args);
    write_report(&report, &output).context("Failed to write report")?;
    info!("✓ Report written to: {}", output.display());

    write_extras(&args, &analysis, &analysis.leak_candidates, "allocations")?;

    info!(
        "Finished memory allocator analysis of {} in {:.2}s",
        args.input.display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Execute the `brk` command
///
/// **Public** - main entry point called from main.rs
pub fn execute_brk(args: AnalyzeArgs) -> Result<()> {
    let start_time = Instant::now();
    info!(
        "Started brk analysis for file {} on: {}",
        args.input.display(),
        chrono::Local::now()
    );

    info!("Step 1/3: Replaying heap-boundary trace...");
    let analysis = analyze_heap_file(&args.input)
        .with_context(|| format!("Failed to analyze {}", args.input.display()))?;

    if let Some(top) = analysis.unique_stacks.first() {
        debug!("Most frequent brk stack: {}", top.summary());
    }

    info!("Step 2/3: Rendering report...");
    let report = render_heap_report(&analysis).context("Failed to build brk stack tree")?;

    info!("Step 3/3: Writing output files...");
    let output = report_output(&args);
    write_report(&report, &output).context("Failed to write report")?;
    info!("✓ Report written to: {}", output.display());

    write_extras(&args, &analysis, &analysis.unique_stacks, "calls")?;

    info!(
        "Finished brk analysis of {} in {:.2}s",
        args.input.display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn report_output(args: &AnalyzeArgs) -> PathBuf {
    args.output
        .clone()
        .unwrap_or_else(|| report_path_for(&args.input))
}

/// JSON summary and flamegraph, when requested
fn write_extras<T: Serialize>(
    args: &AnalyzeArgs,
    analysis: &T,
    stacks: &[StackOccurrence],
    count_name: &str,
) -> Result<()> {
    if let Some(json_path) = &args.output_json {
        let summary = AnalysisSummary::new(vec![args.input.display().to_string()], analysis);
        write_summary(&summary, json_path).context("Failed to write JSON summary")?;
        info!("✓ Summary written to: {}", json_path.display());
    }

    if let Some(svg_path) = &args.output_svg {
        if stacks.is_empty() {
            warn!("No stacks to draw, skipping flamegraph");
            return Ok(());
        }
        let config = args
            .flamegraph_config
            .clone()
            .unwrap_or_else(FlamegraphConfig::new)
            .with_count_name(count_name);
        let svg = generate_flamegraph(stacks, Some(&config)).context("Failed to generate flamegraph")?;
        write_svg(&svg, svg_path).context("Failed to write flamegraph SVG")?;
        info!("✓ Flamegraph written to: {}", svg_path.display());
    }
    Ok(())
}

/// Validate single-file arguments
///
/// **Public** - can be called before execution for early validation
pub fn validate_analyze_args(args: &AnalyzeArgs) -> Result<()> {
    if args.input.as_os_str().is_empty() {
        anyhow::bail!("Input trace file cannot be empty");
    }
    if !args.input.is_file() {
        anyhow::bail!("Input trace file not found: {}", args.input.display());
    }
    if let Some(config) = &args.flamegraph_config {
        if config.width == 0 {
            anyhow::bail!("Flamegraph width must be greater than 0");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_missing_input() {
        let args = AnalyzeArgs {
            input: PathBuf::from("/definitely/not/here.trace"),
            ..Default::default()
        };
        assert!(validate_analyze_args(&args).is_err());
        assert!(validate_analyze_args(&AnalyzeArgs::default()).is_err());
    }

    #[test]
    fn test_validate_zero_width() {
        let file = NamedTempFile::new().unwrap();
        let args = AnalyzeArgs {
            input: file.path().to_path_buf(),
            flamegraph_config: Some(FlamegraphConfig::new().with_width(0)),
            ..Default::default()
        };
        assert!(validate_analyze_args(&args).is_err());
    }

    #[test]
    fn test_memalloc_default_report_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("run.trace");
        let mut file = std::fs::File::create(&input).unwrap();
        write!(file, "<__1;ts;1;malloc;0x30;8\nmalloc\nC__>\n").unwrap();

        execute_memalloc(AnalyzeArgs {
            input: input.clone(),
            ..Default::default()
        })
        .unwrap();

        let report = std::fs::read_to_string(dir.path().join("run.trace.report")).unwrap();
        assert!(report.contains("Found 1 potential memory leaks in total"));
    }
}
