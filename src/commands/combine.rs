//! `combine` command: analyze a directory of allocator traces and merge
//! the results into one report indexed by file.

use super::models::CombineArgs;
use super::utils::{file_label, list_trace_files, report_path_for, require_dir, worker_pool};
use crate::correlate::combine_allocation_results;
use crate::ledger::{analyze_allocation_file, AllocationAnalysis};
use crate::output::{
    render_allocation_report, render_combined_allocation_report, write_report, write_summary,
    AnalysisSummary,
};
use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Execute the `combine` command
///
/// **Public** - main entry point called from main.rs
///
/// Each trace gets its own `<file>.report`. A trace that fails to parse or
/// replay is logged and left out of the combined report.
///
/// # Errors
/// * Input directory cannot be listed or holds no traces
/// * No trace could be analyzed
/// * Combined report write errors
pub fn execute_combine(args: CombineArgs) -> Result<()> {
    let start_time = Instant::now();

    info!("Step 1/3: Listing traces in {}...", args.input_dir.display());
    let mut outputs = vec![args.output.as_path()];
    outputs.extend(args.output_json.as_deref());
    let files = list_trace_files(&args.input_dir, &outputs)?;
    if files.is_empty() {
        anyhow::bail!("No trace files found in {}", args.input_dir.display());
    }

    info!("Step 2/3: Analyzing {} trace files...", files.len());
    let pool = worker_pool(args.jobs)?;
    let outcomes: Vec<(PathBuf, Result<AllocationAnalysis>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| (path.clone(), analyze_and_report(path)))
            .collect()
    });

    let mut results = Vec::new();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(analysis) => results.push((file_label(&path), analysis)),
            Err(e) => warn!("Excluding {} from the combined report: {:#}", path.display(), e),
        }
    }
    if results.is_empty() {
        anyhow::bail!("None of the {} trace files could be analyzed", files.len());
    }

    info!("Step 3/3: Combining {} analyses...", results.len());
    let combined = combine_allocation_results(&results);
    write_report(&render_combined_allocation_report(&combined), &args.output)
        .context("Failed to write combined report")?;
    info!("✓ Combined report written to: {}", args.output.display());

    if let Some(json_path) = &args.output_json {
        let summary = AnalysisSummary::new(combined.files.clone(), &combined);
        write_summary(&summary, json_path).context("Failed to write JSON summary")?;
        info!("✓ Summary written to: {}", json_path.display());
    }

    info!("Combine completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// Analyze one trace and write its report next to it
fn analyze_and_report(path: &Path) -> Result<AllocationAnalysis> {
    info!(
        "Started memory allocator analysis for file {} on: {}",
        path.display(),
        chrono::Local::now()
    );
    let analysis = analyze_allocation_file(path)
        .with_context(|| format!("Failed to analyze {}", path.display()))?;
    let report = render_allocation_report(&analysis)?;
    write_report(&report, report_path_for(path))?;
    Ok(analysis)
}

/// Validate `combine` arguments
pub fn validate_combine_args(args: &CombineArgs) -> Result<()> {
    require_dir(&args.input_dir, "Input")?;
    if args.jobs == Some(0) {
        anyhow::bail!("jobs must be greater than 0");
    }
    Ok(())
}
