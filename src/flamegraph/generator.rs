//! SVG flamegraph of leak-suspect stacks, rendered by inferno.
//!
//! Each unique stack becomes one collapsed line, `root;...;leaf count`,
//! weighted by how often it was seen.

use crate::aggregator::StackOccurrence;
use crate::utils::config::{DEFAULT_FLAMEGRAPH_TITLE, DEFAULT_FLAMEGRAPH_WIDTH};
use crate::utils::error::FlamegraphError;
use inferno::flamegraph::{self, Options};
use log::{debug, info};

/// Flamegraph configuration
#[derive(Debug, Clone)]
pub struct FlamegraphConfig {
    pub title: String,
    pub width: usize,

    /// Unit shown in frame tooltips
    pub count_name: String,
}

impl Default for FlamegraphConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_FLAMEGRAPH_TITLE.to_string(),
            width: DEFAULT_FLAMEGRAPH_WIDTH,
            count_name: "allocations".to_string(),
        }
    }
}

impl FlamegraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_count_name(mut self, count_name: impl Into<String>) -> Self {
        self.count_name = count_name.into();
        self
    }
}

/// Collapsed-stack lines in the order given
///
/// A stack without frames is drawn as `<no stack>`.
pub fn collapsed_lines(stacks: &[StackOccurrence]) -> Vec<String> {
    stacks
        .iter()
        .map(|occ| {
            let collapsed = occ.stack.collapsed();
            let frames = if collapsed.is_empty() {
                "<no stack>".to_string()
            } else {
                collapsed
            };
            format!("{} {}", frames, occ.count)
        })
        .collect()
}

/// Generate an SVG flamegraph from unique stacks
///
/// **Public** - used by the `memalloc` and `brk` commands
///
/// # Arguments
/// * `stacks` - Unique stacks with their frequencies
/// * `config` - Title and width; defaults when `None`
///
/// # Returns
/// SVG document as a string
///
/// # Errors
/// * `FlamegraphError::EmptyStacks` - nothing to draw
/// * `FlamegraphError::RenderFailed` - inferno failed to render
pub fn generate_flamegraph(
    stacks: &[StackOccurrence],
    config: Option<&FlamegraphConfig>,
) -> Result<String, FlamegraphError> {
    if stacks.is_empty() {
        return Err(FlamegraphError::EmptyStacks);
    }

    let config = config.cloned().unwrap_or_default();
    info!("Generating flamegraph with {} stacks", stacks.len());

    let lines = collapsed_lines(stacks);
    debug!("First collapsed line: {}", lines[0]);

    let mut options = Options::default();
    options.title = config.title;
    options.count_name = config.count_name;
    options.image_width = Some(config.width);

    let mut svg = Vec::new();
    flamegraph::from_lines(&mut options, lines.iter().map(String::as_str), &mut svg)
        .map_err(|e| FlamegraphError::RenderFailed(e.to_string()))?;

    let svg = String::from_utf8_lossy(&svg).into_owned();
    info!("Flamegraph generated successfully ({} bytes)", svg.len());
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CallStack;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collapsed_lines_root_first() {
        let stacks = vec![
            StackOccurrence::new(CallStack::parse("malloc\nfoo\nmain"), 3),
            StackOccurrence::new(CallStack::default(), 1),
        ];
        assert_eq!(
            collapsed_lines(&stacks),
            vec!["main;foo;malloc 3".to_string(), "<no stack> 1".to_string()]
        );
    }

    #[test]
    fn test_empty_stacks_rejected() {
        let result = generate_flamegraph(&[], None);
        assert!(matches!(result, Err(FlamegraphError::EmptyStacks)));
    }

    #[test]
    fn test_render_failure_message() {
        let err = FlamegraphError::RenderFailed("bad frame".to_string());
        assert_eq!(err.to_string(), "Failed to render flamegraph: bad frame");
    }

    #[test]
    fn test_generate_svg() {
        let stacks = vec![StackOccurrence::new(CallStack::parse("malloc\nmain"), 2)];
        let config = FlamegraphConfig::new().with_title("Leaks in test");
        let svg = generate_flamegraph(&stacks, Some(&config)).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("Leaks in test"));
        assert!(svg.contains("malloc"));
    }
}
