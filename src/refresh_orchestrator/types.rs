//! Refresh request types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default cool-down between passes
pub const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// Optional visibility restriction for a pass. `None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshScope {
    pub mv_indices: Option<BTreeSet<u32>>,
    pub inputs: Option<BTreeSet<u32>>,
    pub outputs: Option<BTreeSet<u32>>,
}

impl RefreshScope {
    /// Unrestricted scope
    pub fn full() -> Self {
        Self::default()
    }

    pub fn allows_mv(&self, nexx_index: u32) -> bool {
        self.mv_indices
            .as_ref()
            .map_or(true, |set| set.contains(&nexx_index))
    }

    /// Router inputs `1..=max` visible in this scope
    pub fn inputs_within(&self, max: u32) -> Vec<u32> {
        Self::within(self.inputs.as_ref(), max)
    }

    /// Router outputs `1..=max` visible in this scope
    pub fn outputs_within(&self, max: u32) -> Vec<u32> {
        Self::within(self.outputs.as_ref(), max)
    }

    fn within(set: Option<&BTreeSet<u32>>, max: u32) -> Vec<u32> {
        match set {
            _ if max == 0 => Vec::new(),
            Some(set) => set.range(1..=max).copied().collect(),
            None => (1..=max).collect(),
        }
    }
}

/// A request to run one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub started_by: String,
    pub scope: RefreshScope,
}

impl RefreshRequest {
    pub fn new(started_by: impl Into<String>) -> Self {
        Self {
            started_by: started_by.into(),
            scope: RefreshScope::full(),
        }
    }

    pub fn with_scope(mut self, scope: RefreshScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    pub cooldown: chrono::Duration,
    /// Running locks older than this may be taken over; `None` never expires
    pub stale_after: Option<chrono::Duration>,
    pub quartz_workers: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            cooldown: chrono::Duration::seconds(DEFAULT_COOLDOWN_SECS),
            stale_after: None,
            quartz_workers: crate::fetch_scheduler::DEFAULT_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scope_covers_range() {
        let scope = RefreshScope::full();
        assert!(scope.allows_mv(119));
        assert_eq!(scope.inputs_within(3), vec![1, 2, 3]);
        assert!(scope.outputs_within(0).is_empty());
    }

    #[test]
    fn test_restricted_scope_is_clamped_to_device_range() {
        let scope = RefreshScope {
            mv_indices: Some([0, 5].into_iter().collect()),
            inputs: Some([0, 2, 4, 1000].into_iter().collect()),
            outputs: Some(BTreeSet::new()),
        };
        assert!(scope.allows_mv(5));
        assert!(!scope.allows_mv(1));
        assert_eq!(scope.inputs_within(960), vec![2, 4]);
        assert!(scope.outputs_within(960).is_empty());
    }
}
