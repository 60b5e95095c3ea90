use log::debug;

use crate::backend::Backend;
use crate::error::Result;
use crate::expr::ExpressionTree;

// Execution — handing a finished tree to the backend
//
// Building a tree never touches the device. The hand-off below is the single
// place where that happens; every assignment, staged copy and `swap` funnels
// through it.

/// Options forwarded with a tree to the execution interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionConfig {
    /// Index of the command queue to run on (default: 0).
    pub queue: usize,
    /// Optional program label, for backend-side caching and diagnostics.
    pub label: Option<String>,
    /// Allow the backend to autotune the generated kernels.
    pub tune: bool,
    /// Force regeneration even if a compiled program is cached.
    pub recompile: bool,
}

impl ExecutionConfig {
    /// Run on the command queue at `index`.
    pub fn with_queue(mut self, index: usize) -> Self {
        self.queue = index;
        self
    }

    /// Attach a program label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enable or disable autotuning.
    pub fn with_tune(mut self, tune: bool) -> Self {
        self.tune = tune;
        self
    }

    /// Force recompilation.
    pub fn with_recompile(mut self, recompile: bool) -> Self {
        self.recompile = recompile;
        self
    }
}

/// Execute a tree with the default configuration.
pub fn execute<B: Backend>(tree: &ExpressionTree<B>) -> Result<()> {
    execute_with(tree, &ExecutionConfig::default())
}

/// Execute a tree with explicit options.
pub fn execute_with<B: Backend>(tree: &ExpressionTree<B>, config: &ExecutionConfig) -> Result<()> {
    debug!(
        "executing {} ({} node(s), shape {}, dtype {}) on queue {}{}",
        tree.op(),
        tree.nodes().len(),
        tree.shape(),
        tree.dtype(),
        config.queue,
        config
            .label
            .as_deref()
            .map(|l| format!(" [{l}]"))
            .unwrap_or_default()
    );
    B::execute(tree, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let cfg = ExecutionConfig::default()
            .with_queue(2)
            .with_label("axpy")
            .with_tune(true);
        assert_eq!(cfg.queue, 2);
        assert_eq!(cfg.label.as_deref(), Some("axpy"));
        assert!(cfg.tune);
        assert!(!cfg.recompile);
        assert_eq!(ExecutionConfig::default().queue, 0);
    }
}
