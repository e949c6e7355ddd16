//! Kernel configuration.
//!
//! Settings are read from environment variables:
//! - `ARGUMENT_GRAPH_DEPTH`: hops loaded below a root for graph views (default: 5)
//! - `ARGUMENT_HISTORY_LIMIT`: maximum entries in an edit history (default: 50)

/// Tunables for [`ArgumentService`](crate::service::ArgumentService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// How many hops below the root a graph view includes.
    pub graph_depth: usize,
    /// Maximum number of bodies returned by an edit history.
    pub history_limit: usize,
}

impl KernelConfig {
    /// Default view depth.
    pub const DEFAULT_GRAPH_DEPTH: usize = 5;
    /// Default edit history length.
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;

    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            graph_depth: std::env::var("ARGUMENT_GRAPH_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Self::DEFAULT_GRAPH_DEPTH),
            history_limit: std::env::var("ARGUMENT_HISTORY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|limit| *limit > 0)
                .unwrap_or(Self::DEFAULT_HISTORY_LIMIT),
        }
    }

    /// Set the view depth.
    pub fn with_graph_depth(mut self, depth: usize) -> Self {
        self.graph_depth = depth;
        self
    }

    /// Set the edit history limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            graph_depth: Self::DEFAULT_GRAPH_DEPTH,
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = KernelConfig::default().with_graph_depth(2).with_history_limit(0);
        assert_eq!(config.graph_depth, 2);
        assert_eq!(config.history_limit, 1);
    }
}
