//! Pipeline configuration
//!
//! Settings are plain data so a host can load them alongside its own config.

use serde::{Deserialize, Serialize};
use tessera_dom::ObserverInit;

/// Configuration for a [`MutationPipeline`](crate::MutationPipeline)
///
/// # Example
///
/// ```
/// use tessera_core::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert!(config.observe.subtree);
/// assert!(config.teardown_removed_subtrees);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// What the platform observer reports
    ///
    /// Attribute classification relies on previous values, so turning
    /// `attribute_old_value` off makes every change look like an addition.
    pub observe: ObserverInit,
    /// Run every attribute cleanup of a removed element and its remaining
    /// descendants after the element-removed callbacks
    pub teardown_removed_subtrees: bool,
}

impl PipelineConfig {
    /// Same as default, with subtree teardown switched on or off
    pub fn with_subtree_teardown(mut self, enabled: bool) -> Self {
        self.teardown_removed_subtrees = enabled;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            observe: ObserverInit::all(),
            teardown_removed_subtrees: true,
        }
    }
}
