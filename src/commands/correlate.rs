//! `correlate` command.
//!
//! 1. Learn free/allocation stack relationships from full traces
//! 2. Correlate every pre-processed file against them
//! 3. Combine the per-file results

use super::models::CorrelateArgs;
use super::utils::{file_label, list_trace_files, report_path_for, require_dir, worker_pool};
use crate::correlate::{
    analyze_processed_file, combine_processed_results, learn_from_files, ProcessedAnalysis,
    StackRelationships,
};
use crate::output::{
    render_combined_processed_report, render_processed_summary, write_report, write_summary,
    AnalysisSummary,
};
use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Execute the `correlate` command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Either directory cannot be listed
/// * No pre-processed file could be correlated
/// * Report write errors
pub fn execute_correlate(args: CorrelateArgs) -> Result<()> {
    let start_time = Instant::now();
    let pool = worker_pool(args.jobs)?;

    info!("Step 1/3: Learning stack relationships from {}...", args.traces_dir.display());
    let mut outputs = vec![args.output.as_path()];
    outputs.extend(args.output_json.as_deref());
    let traces = list_trace_files(&args.traces_dir, &outputs)?;
    if traces.is_empty() {
        warn!(
            "No traces in {}, every deallocation will be reported as unknown",
            args.traces_dir.display()
        );
    }
    let relationships = pool.install(|| learn_from_files(&traces));
    if !traces.is_empty() && relationships.is_empty() {
        warn!(
            "No deallocation in {} could be matched to its allocation",
            args.traces_dir.display()
        );
    }

    info!("Step 2/3: Correlating pre-processed files in {}...", args.processed_dir.display());
    let files = list_trace_files(&args.processed_dir, &outputs)?;
    if files.is_empty() {
        anyhow::bail!("No pre-processed files found in {}", args.processed_dir.display());
    }
    let outcomes: Vec<(PathBuf, Result<ProcessedAnalysis>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| (path.clone(), correlate_and_report(path, &relationships)))
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
        anyhow::bail!("None of the {} pre-processed files could be analyzed", files.len());
    }

    info!("Step 3/3: Combining {} analyses...", results.len());
    let combined = combine_processed_results(&results);
    write_report(
        &render_combined_processed_report(&combined, args.print_stacks),
        &args.output,
    )
    .context("Failed to write combined report")?;
    info!("✓ Combined report written to: {}", args.output.display());

    if let Some(json_path) = &args.output_json {
        let summary = AnalysisSummary::new(combined.files.clone(), &combined);
        write_summary(&summary, json_path).context("Failed to write JSON summary")?;
        info!("✓ Summary written to: {}", json_path.display());
    }

    info!("Correlate completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn correlate_and_report(path: &Path, relationships: &StackRelationships) -> Result<ProcessedAnalysis> {
    let analysis = analyze_processed_file(path, relationships)
        .with_context(|| format!("Failed to correlate {}", path.display()))?;
    write_report(&render_processed_summary(&analysis), report_path_for(path))?;
    Ok(analysis)
}

/// Validate `correlate` arguments
pub fn validate_correlate_args(args: &CorrelateArgs) -> Result<()> {
    require_dir(&args.processed_dir, "Pre-processed")?;
    require_dir(&args.traces_dir, "Traces")?;
    if args.jobs == Some(0) {
        anyhow::bail!("jobs must be greater than 0");
    }
    Ok(())
}
