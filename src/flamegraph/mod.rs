//! Flamegraph generation using the inferno library.
//!
//! Turns unique leak-suspect or heap-boundary stacks into an SVG where
//! frame width is proportional to how often the stack was seen.

pub mod generator;

pub use generator::{collapsed_lines, generate_flamegraph, FlamegraphConfig};
