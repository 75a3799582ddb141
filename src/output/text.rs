//! Plain-text report writer.

use super::{ensure_parent_dir, validate_output_path};
use crate::utils::error::OutputError;
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a rendered report to a file, replacing any previous content
///
/// **Public** - every analysis mode ends here
///
/// # Arguments
/// * `content` - Report text
/// * `output_path` - Destination file
///
/// # Errors
/// * `OutputError::InvalidPath` - empty path, a directory, or parent cannot be created
/// * `OutputError::WriteFailed` - I/O error during write
pub fn write_report(content: &str, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    validate_output_path(output_path)?;
    ensure_parent_dir(output_path)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;

    info!("Report written to {} ({} bytes)", output_path.display(), content.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_report_overwrites() {
        let temp_file = NamedTempFile::new().unwrap();
        write_report("first run\nwith two lines\n", temp_file.path()).unwrap();
        write_report("second\n", temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "second\n");
    }

    #[test]
    fn test_write_report_rejects_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = write_report("x", temp_dir.path());
        assert!(matches!(result, Err(OutputError::InvalidPath(_))));
    }
}
