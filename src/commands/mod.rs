//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the library components and own all file output.

pub mod analyze;
pub mod combine;
pub mod correlate;
pub mod models;
pub mod utils;

pub use analyze::{execute_brk, execute_memalloc, validate_analyze_args};
pub use combine::{execute_combine, validate_combine_args};
pub use correlate::{execute_correlate, validate_correlate_args};
pub use models::{AnalyzeArgs, CombineArgs, CorrelateArgs};
pub use utils::display_version;
