//! Tri-state status of exclusion tree nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregated status of an exclusion node.
///
/// Leaves are only ever `Enabled` or `Disabled`; `PartlyEnabled` appears
/// on inner nodes whose children disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExclusionState {
    /// Every leaf below is enabled
    Enabled,
    /// Every leaf below is disabled
    Disabled,
    /// Mixed leaves
    PartlyEnabled,
}

impl ExclusionState {
    /// Map a leaf's enabled flag.
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            ExclusionState::Enabled
        } else {
            ExclusionState::Disabled
        }
    }

    /// Aggregate child states.
    ///
    /// `Enabled` iff every child is enabled, `Disabled` iff every child is
    /// disabled, `PartlyEnabled` otherwise. The result does not depend on
    /// order. A node without children counts as `Disabled`.
    pub fn aggregate<I>(states: I) -> Self
    where
        I: IntoIterator<Item = ExclusionState>,
    {
        let mut all_enabled = true;
        let mut all_disabled = true;

        for state in states {
            match state {
                ExclusionState::Enabled => all_disabled = false,
                ExclusionState::Disabled => all_enabled = false,
                ExclusionState::PartlyEnabled => return ExclusionState::PartlyEnabled,
            }
            if !all_enabled && !all_disabled {
                return ExclusionState::PartlyEnabled;
            }
        }

        if all_disabled {
            ExclusionState::Disabled
        } else {
            ExclusionState::Enabled
        }
    }

    /// Leaf value a toggle applies to every leaf below a node in this state.
    ///
    /// Only a fully disabled node gets switched on; enabled and partly
    /// enabled nodes are switched off entirely.
    pub fn toggle_target(self) -> bool {
        self == ExclusionState::Disabled
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionState::Enabled => "enabled",
            ExclusionState::Disabled => "disabled",
            ExclusionState::PartlyEnabled => "partly_enabled",
        }
    }
}

impl fmt::Display for ExclusionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExclusionState::*;

    #[test]
    fn test_aggregate_uniform() {
        assert_eq!(ExclusionState::aggregate([Enabled, Enabled]), Enabled);
        assert_eq!(ExclusionState::aggregate([Disabled, Disabled]), Disabled);
        assert_eq!(ExclusionState::aggregate([Enabled]), Enabled);
    }

    #[test]
    fn test_aggregate_mixed() {
        assert_eq!(ExclusionState::aggregate([Enabled, Disabled]), PartlyEnabled);
        assert_eq!(ExclusionState::aggregate([Enabled, PartlyEnabled]), PartlyEnabled);
        assert_eq!(ExclusionState::aggregate([PartlyEnabled]), PartlyEnabled);
    }

    #[test]
    fn test_aggregate_order_independent() {
        let states = [Enabled, Disabled, Enabled, Disabled];
        let mut reversed = states;
        reversed.reverse();
        assert_eq!(
            ExclusionState::aggregate(states),
            ExclusionState::aggregate(reversed)
        );

        // Grouping does not matter either
        let left = ExclusionState::aggregate([
            ExclusionState::aggregate([Enabled, Enabled]),
            Disabled,
        ]);
        let flat = ExclusionState::aggregate([Enabled, Enabled, Disabled]);
        assert_eq!(left, flat);
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(ExclusionState::aggregate(std::iter::empty()), Disabled);
    }

    #[test]
    fn test_toggle_target() {
        assert!(Disabled.toggle_target());
        assert!(!Enabled.toggle_target());
        assert!(!PartlyEnabled.toggle_target());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&PartlyEnabled).unwrap(), "\"partlyEnabled\"");
        let state: ExclusionState = serde_json::from_str("\"enabled\"").unwrap();
        assert_eq!(state, Enabled);
    }
}
