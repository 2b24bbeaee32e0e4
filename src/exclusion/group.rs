//! Hostname exclusions and their registrable-domain groups.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use super::ExclusionState;
use crate::hostname::to_wildcard;

/// Generate a fresh opaque node id.
fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single hostname exclusion, the leaf of the exclusions tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub id: String,
    pub hostname: String,
    pub enabled: bool,
}

impl Exclusion {
    /// Create an exclusion with a fresh id.
    pub fn new(hostname: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: new_id(),
            hostname: hostname.into(),
            enabled,
        }
    }

    /// Leaf state.
    pub fn state(&self) -> ExclusionState {
        ExclusionState::from_enabled(self.enabled)
    }
}

/// Exclusions sharing one registrable domain (or one service domain).
///
/// The group owns its exclusions. Its state is always derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionsGroup {
    pub id: String,
    pub hostname: String,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
}

impl ExclusionsGroup {
    /// Create a group with its two default children, `hostname` and
    /// `*.hostname`, both at the given state.
    pub fn new(hostname: impl Into<String>, enabled: bool) -> Self {
        let mut group = Self::empty(hostname);
        group.insert_defaults(enabled);
        group
    }

    /// Create a group without children. Callers fill it right away.
    pub(crate) fn empty(hostname: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            hostname: hostname.into(),
            exclusions: Vec::new(),
        }
    }

    /// Aggregated state of the group.
    pub fn state(&self) -> ExclusionState {
        ExclusionState::aggregate(self.exclusions.iter().map(Exclusion::state))
    }

    /// Number of exclusions in the group.
    pub fn len(&self) -> usize {
        self.exclusions.len()
    }

    /// Check if the group has no exclusions.
    pub fn is_empty(&self) -> bool {
        self.exclusions.is_empty()
    }

    /// Find an exclusion by hostname.
    pub fn find(&self, hostname: &str) -> Option<&Exclusion> {
        self.exclusions.iter().find(|e| e.hostname == hostname)
    }

    /// Find an exclusion by hostname, mutably.
    pub fn find_mut(&mut self, hostname: &str) -> Option<&mut Exclusion> {
        self.exclusions.iter_mut().find(|e| e.hostname == hostname)
    }

    /// Add the bare domain and its wildcard if they are missing.
    ///
    /// Returns the number of exclusions inserted.
    pub fn insert_defaults(&mut self, enabled: bool) -> usize {
        let hostname = self.hostname.clone();
        let wildcard = to_wildcard(&hostname);
        usize::from(self.insert_missing(Exclusion::new(hostname, enabled)))
            + usize::from(self.insert_missing(Exclusion::new(wildcard, enabled)))
    }

    /// Append an exclusion unless its hostname is already present.
    ///
    /// Existing entries are left untouched. Returns whether it was inserted.
    pub fn insert_missing(&mut self, exclusion: Exclusion) -> bool {
        if self.find(&exclusion.hostname).is_some() {
            return false;
        }
        self.exclusions.push(exclusion);
        true
    }

    /// Merge exclusions into the group.
    ///
    /// A hostname already present only gets its state overwritten, keeping
    /// its id; a new hostname is appended. Returns the number appended.
    pub fn merge(&mut self, exclusions: Vec<Exclusion>) -> usize {
        let mut inserted = 0;
        for exclusion in exclusions {
            match self.find_mut(&exclusion.hostname) {
                Some(existing) => existing.enabled = exclusion.enabled,
                None => {
                    self.exclusions.push(exclusion);
                    inserted += 1;
                }
            }
        }
        inserted
    }

    /// Remove exclusions with the given ids. Returns the number removed.
    pub fn remove_ids(&mut self, ids: &AHashSet<&str>) -> usize {
        let before = self.exclusions.len();
        self.exclusions.retain(|e| !ids.contains(e.id.as_str()));
        before - self.exclusions.len()
    }

    /// Set the enabled flag of exclusions with the given ids.
    ///
    /// Returns the number of exclusions matched.
    pub fn set_enabled(&mut self, ids: &AHashSet<&str>, enabled: bool) -> usize {
        let mut matched = 0;
        for exclusion in self.exclusions.iter_mut() {
            if ids.contains(exclusion.id.as_str()) {
                exclusion.enabled = enabled;
                matched += 1;
            }
        }
        matched
    }
}
