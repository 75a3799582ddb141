//! Leak Trace Studio CLI
//!
//! Finds suspected memory leaks, wrong frees and heap growth in
//! malloc/brk call traces.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use leak_trace_studio::commands::{
    display_version, execute_brk, execute_combine, execute_correlate, execute_memalloc,
    validate_analyze_args, validate_combine_args, validate_correlate_args, AnalyzeArgs,
    CombineArgs, CorrelateArgs,
};
use leak_trace_studio::flamegraph::FlamegraphConfig;
use leak_trace_studio::utils::config::JOBS_ENV_VAR;

/// Leak Trace Studio - memory allocator trace analysis
#[derive(Parser, Debug)]
#[command(name = "leak-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Options shared by the single-file commands
#[derive(clap::Args, Debug)]
struct SingleFileOptions {
    /// Trace file to analyze
    input: PathBuf,

    /// Report path (defaults to <INPUT>.report)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a JSON summary
    #[arg(long)]
    json: Option<PathBuf>,

    /// Also write an SVG flamegraph
    #[arg(short, long)]
    flamegraph: Option<PathBuf>,

    /// Flamegraph title
    #[arg(long)]
    title: Option<String>,

    /// Flamegraph width in pixels
    #[arg(long, default_value = "1200")]
    width: usize,
}

impl SingleFileOptions {
    fn into_args(self) -> AnalyzeArgs {
        let flamegraph_config = self.flamegraph.as_ref().map(|_| {
            let mut config = FlamegraphConfig::new().with_width(self.width);
            if let Some(title) = &self.title {
                config = config.with_title(title.clone());
            }
            config
        });

        AnalyzeArgs {
            input: self.input,
            output: self.output,
            output_json: self.json,
            output_svg: self.flamegraph,
            flamegraph_config,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a malloc/calloc/realloc/free trace
    Memalloc(SingleFileOptions),

    /// Analyze a brk/sbrk trace
    Brk(SingleFileOptions),

    /// Analyze every allocator trace in a directory and combine the results
    Combine {
        /// Directory of allocator traces
        dir: PathBuf,

        /// Combined report path
        #[arg(short, long)]
        output: PathBuf,

        /// Also write a JSON summary
        #[arg(long)]
        json: Option<PathBuf>,

        /// Worker threads
        #[arg(short, long, env = JOBS_ENV_VAR)]
        jobs: Option<usize>,
    },

    /// Resolve leak suspects in pre-processed files using full traces
    Correlate {
        /// Directory of pre-processed stack count files
        #[arg(long)]
        processed: PathBuf,

        /// Directory of full allocator traces to learn from
        #[arg(long)]
        traces: PathBuf,

        /// Combined report path
        #[arg(short, long)]
        output: PathBuf,

        /// Also print all allocation and deallocation stacks
        #[arg(long)]
        print_stacks: bool,

        /// Also write a JSON summary
        #[arg(long)]
        json: Option<PathBuf>,

        /// Worker threads
        #[arg(short, long, env = JOBS_ENV_VAR)]
        jobs: Option<usize>,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Memalloc(options) => {
            let args = options.into_args();
            validate_analyze_args(&args)?;
            execute_memalloc(args)?;
        }

        Commands::Brk(options) => {
            let args = options.into_args();
            validate_analyze_args(&args)?;
            execute_brk(args)?;
        }

        Commands::Combine {
            dir,
            output,
            json,
            jobs,
        } => {
            let args = CombineArgs {
                input_dir: dir,
                output,
                output_json: json,
                jobs,
            };
            validate_combine_args(&args)?;
            execute_combine(args)?;
        }

        Commands::Correlate {
            processed,
            traces,
            output,
            print_stacks,
            json,
            jobs,
        } => {
            let args = CorrelateArgs {
                processed_dir: processed,
                traces_dir: traces,
                output,
                output_json: json,
                print_stacks,
                jobs,
            };
            validate_correlate_args(&args)?;
            execute_correlate(args)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
