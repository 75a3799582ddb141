//! Helpers shared by the commands.

use crate::utils::config::{REPORT_SUFFIX, SCHEMA_VERSION};
use anyhow::{Context, Result};
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};

/// Regular files in `dir` that are not reports, sorted by path
///
/// Files resolving to one of `exclude` (the command's own outputs) are
/// skipped as well, whatever their name.
pub fn list_trace_files(dir: &Path, exclude: &[&Path]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory {}", dir.display()))?;
    let excluded: Vec<PathBuf> = exclude
        .iter()
        .filter_map(|path| std::fs::canonicalize(path).ok())
        .collect();

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if file_label(&path).ends_with(REPORT_SUFFIX) {
            debug!("Skipping report file {}", path.display());
            continue;
        }
        if std::fs::canonicalize(&path).map_or(false, |resolved| excluded.contains(&resolved)) {
            debug!("Skipping output file {}", path.display());
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// `<path>.report`
pub fn report_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(REPORT_SUFFIX);
    PathBuf::from(name)
}

/// File name used in combined reports
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Dedicated pool for per-file work
pub fn worker_pool(jobs: Option<usize>) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("leak-trace-worker-{}", i));
    if let Some(jobs) = jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder.build().context("Failed to configure thread pool")?;
    debug!("Worker pool ready with {} threads", pool.current_num_threads());
    Ok(pool)
}

pub fn require_dir(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        anyhow::bail!("{} directory cannot be empty", what);
    }
    if !path.is_dir() {
        anyhow::bail!("{} is not a directory: {}", what, path.display());
    }
    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("Leak Trace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Memory leak and heap growth analysis for malloc/brk call traces.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_trace_files_skips_reports_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.trace"), "").unwrap();
        std::fs::write(dir.path().join("a.trace"), "").unwrap();
        std::fs::write(dir.path().join("a.trace.report"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names: Vec<String> = list_trace_files(dir.path(), &[])
            .unwrap()
            .iter()
            .map(|p| file_label(p))
            .collect();
        assert_eq!(names, vec!["a.trace", "b.trace"]);
    }

    #[test]
    fn test_list_trace_files_skips_excluded_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.trace"), "").unwrap();
        std::fs::write(dir.path().join("combined.txt"), "").unwrap();
        std::fs::write(dir.path().join("combined.json"), "").unwrap();
        let output = dir.path().join("./combined.txt");
        let missing = dir.path().join("not-written-yet.json");

        let names: Vec<String> = list_trace_files(dir.path(), &[&output, &missing])
            .unwrap()
            .iter()
            .map(|p| file_label(p))
            .collect();
        assert_eq!(names, vec!["a.trace", "combined.json"]);
    }

    #[test]
    fn test_report_path_for() {
        assert_eq!(
            report_path_for(Path::new("/tmp/run1.trace")),
            PathBuf::from("/tmp/run1.trace.report")
        );
    }

    #[test]
    fn test_worker_pool_respects_jobs() {
        let pool = worker_pool(Some(2)).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }

    #[test]
    fn test_require_dir_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(require_dir(file.path(), "Input").is_err());
        assert!(require_dir(Path::new(""), "Input").is_err());
    }
}
