//! Argument structs for the analysis commands.

use crate::flamegraph::FlamegraphConfig;
use std::path::PathBuf;

/// Arguments for the single-file `memalloc` and `brk` commands
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Trace file to analyze
    pub input: PathBuf,

    /// Report path; `<input>.report` when not given
    pub output: Option<PathBuf>,

    /// Output path for the JSON summary (optional)
    pub output_json: Option<PathBuf>,

    /// Output path for the SVG flamegraph (optional)
    pub output_svg: Option<PathBuf>,

    pub flamegraph_config: Option<FlamegraphConfig>,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            output_json: None,
            output_svg: None,
            flamegraph_config: None,
        }
    }
}

/// Arguments for the `combine` command
#[derive(Debug, Clone)]
pub struct CombineArgs {
    /// Directory of allocator traces
    pub input_dir: PathBuf,

    /// Combined report path
    pub output: PathBuf,

    pub output_json: Option<PathBuf>,

    /// Worker threads; rayon's default when `None`
    pub jobs: Option<usize>,
}

impl Default for CombineArgs {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output: PathBuf::from("combined.report"),
            output_json: None,
            jobs: None,
        }
    }
}

/// Arguments for the `correlate` command
#[derive(Debug, Clone)]
pub struct CorrelateArgs {
    /// Directory of pre-processed (stack count) files
    pub processed_dir: PathBuf,

    /// Directory of full allocator traces to learn from
    pub traces_dir: PathBuf,

    pub output: PathBuf,
    pub output_json: Option<PathBuf>,

    /// Include full allocation and deallocation tables in the report
    pub print_stacks: bool,

    pub jobs: Option<usize>,
}

impl Default for CorrelateArgs {
    fn default() -> Self {
        Self {
            processed_dir: PathBuf::from("."),
            traces_dir: PathBuf::from("."),
            output: PathBuf::from("correlated.report"),
            output_json: None,
            print_stacks: false,
            jobs: None,
        }
    }
}
