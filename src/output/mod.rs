//! Output writers for reports, summaries and flamegraphs.
//!
//! - Plain-text reports
//! - JSON summaries (pretty printed)
//! - SVG flamegraphs

pub mod json;
pub mod report;
pub mod svg;
pub mod text;

pub use json::{write_summary, AnalysisSummary};
pub use report::{
    render_allocation_report, render_combined_allocation_report, render_combined_processed_report,
    render_heap_report, render_processed_summary,
};
pub use svg::write_svg;
pub use text::write_report;

use crate::utils::error::OutputError;
use log::debug;
use std::path::Path;

/// Check that `path` can be written as a file
///
/// **Private** - shared by the writers in this module
pub(crate) fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Create the parent directories of `path` if missing
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_output_path_empty() {
        assert!(validate_output_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(temp_dir.path()).is_err());
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a/b/out.report");
        ensure_parent_dir(&nested).unwrap();
        assert!(temp_dir.path().join("a/b").is_dir());
    }
}
