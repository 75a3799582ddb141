//! JSON summary output.
//!
//! A summary wraps any serializable analysis result with the schema
//! version, the analyzed source and the generation time.

use super::{ensure_parent_dir, validate_output_path};
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::OutputError;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Envelope written by `--json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary<T> {
    pub version: String,

    /// Analyzed file, or the list of files for multi-file modes
    pub source: Vec<String>,

    /// RFC 3339 UTC timestamp
    pub generated_at: String,

    pub analysis: T,
}

impl<T> AnalysisSummary<T> {
    pub fn new(source: Vec<String>, analysis: T) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            source,
            generated_at: chrono::Utc::now().to_rfc3339(),
            analysis,
        }
    }
}

/// Write a summary as pretty-printed JSON
///
/// **Public** - used by every mode when `--json` is given
///
/// # Errors
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
pub fn write_summary<T: Serialize>(
    summary: &AnalysisSummary<T>,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Writing JSON summary to: {}", output_path.display());

    validate_output_path(output_path)?;
    ensure_parent_dir(output_path)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush()?;

    Ok(())
}
