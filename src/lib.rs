//! Leak Trace Studio
//!
//! Memory leak, wrong-free and heap growth analysis of malloc/brk call
//! traces captured with a DTrace-style probe script.
//!
//! This crate provides the core implementation for the
//! `leak-trace` CLI tool.
//!
//! ## Getting Started
//!
//! ```bash
//! leak-trace memalloc malloc.trace
//! leak-trace brk brk.trace --flamegraph brk.svg
//! leak-trace combine traces/ -o combined.report
//! leak-trace correlate --processed counts/ --traces traces/ -o correlated.report
//! ```
//!
//! ## Layout
//!
//! - [`parser`]: trace entry framing and decoding, pre-processed files
//! - [`ledger`]: allocation and heap-boundary replay
//! - [`aggregator`]: unique stack counting and merged stack trees
//! - [`correlate`]: cross-file relationships and combined views
//! - [`output`], [`flamegraph`]: reports, JSON summaries, SVG

pub mod aggregator;
pub mod commands;
pub mod correlate;
pub mod flamegraph;
pub mod ledger;
pub mod output;
pub mod parser;
pub mod utils;
