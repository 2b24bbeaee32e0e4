//! Excluded services: catalog bundles spanning several domains.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use super::{ExclusionState, ExclusionsGroup};
use crate::hostname::is_same_or_subdomain;
use crate::services::{ServiceCategory, ServiceDto};

/// A catalog service added to the exclusions, with one group per domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub service_id: String,
    pub service_name: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub categories: Vec<ServiceCategory>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub exclusions_groups: Vec<ExclusionsGroup>,
}

impl Service {
    /// Create a service without groups.
    pub fn new(dto: &ServiceDto) -> Self {
        Self {
            service_id: dto.service_id.clone(),
            service_name: dto.service_name.clone(),
            icon_url: dto.icon_url.clone(),
            categories: dto.categories.clone(),
            domains: dto.domains.clone(),
            exclusions_groups: Vec::new(),
        }
    }

    /// Create a service with every domain (and its wildcard) at the given state.
    pub fn from_dto(dto: &ServiceDto, enabled: bool) -> Self {
        let mut service = Self::new(dto);
        service.ensure_domains(enabled);
        service
    }

    /// Catalog view of this service.
    pub fn to_dto(&self) -> ServiceDto {
        ServiceDto {
            service_id: self.service_id.clone(),
            service_name: self.service_name.clone(),
            icon_url: self.icon_url.clone(),
            categories: self.categories.clone(),
            domains: self.domains.clone(),
        }
    }

    /// Adopt the catalog's metadata and domain list, keeping groups.
    pub fn update_from(&mut self, dto: &ServiceDto) {
        self.service_name = dto.service_name.clone();
        self.icon_url = dto.icon_url.clone();
        self.categories = dto.categories.clone();
        for domain in &dto.domains {
            if !self.domains.contains(domain) {
                self.domains.push(domain.clone());
            }
        }
    }

    /// Aggregated state of the service.
    pub fn state(&self) -> ExclusionState {
        ExclusionState::aggregate(self.exclusions_groups.iter().map(ExclusionsGroup::state))
    }

    /// Total number of exclusions across groups.
    pub fn leaf_count(&self) -> usize {
        self.exclusions_groups.iter().map(ExclusionsGroup::len).sum()
    }

    /// Whether the hostname falls under one of the service's domains.
    pub fn owns_hostname(&self, hostname: &str) -> bool {
        self.domains.iter().any(|d| is_same_or_subdomain(hostname, d))
    }

    /// Find the group of a domain.
    pub fn group(&self, domain: &str) -> Option<&ExclusionsGroup> {
        self.exclusions_groups.iter().find(|g| g.hostname == domain)
    }

    /// Find the group a hostname belongs to, preferring the longest domain.
    pub fn group_for_hostname_mut(&mut self, hostname: &str) -> Option<&mut ExclusionsGroup> {
        self.exclusions_groups
            .iter_mut()
            .filter(|g| is_same_or_subdomain(hostname, &g.hostname))
            .max_by_key(|g| g.hostname.len())
    }

    /// Make sure every domain has a group with its two default children.
    ///
    /// Missing groups and children are added at `enabled`; existing ones
    /// keep their state. Returns the number of exclusions inserted.
    pub fn ensure_domains(&mut self, enabled: bool) -> usize {
        let mut inserted = 0;
        for domain in self.domains.clone() {
            match self.exclusions_groups.iter_mut().find(|g| g.hostname == domain) {
                Some(group) => inserted += group.insert_defaults(enabled),
                None => {
                    let group = ExclusionsGroup::new(domain, enabled);
                    inserted += group.len();
                    self.exclusions_groups.push(group);
                }
            }
        }
        inserted
    }

    /// Take over a standalone group for one of the service's domains.
    ///
    /// When the service already has a group for that domain, only the
    /// hostnames it lacks are carried over.
    pub fn absorb_group(&mut self, group: ExclusionsGroup) {
        match self
            .exclusions_groups
            .iter_mut()
            .find(|g| g.hostname == group.hostname)
        {
            Some(existing) => {
                for exclusion in group.exclusions {
                    existing.insert_missing(exclusion);
                }
            }
            None => self.exclusions_groups.push(group),
        }
    }

    /// Remove exclusions by id, dropping groups left empty.
    pub fn remove_ids(&mut self, ids: &AHashSet<&str>) -> usize {
        let removed: usize = self
            .exclusions_groups
            .iter_mut()
            .map(|g| g.remove_ids(ids))
            .sum();
        self.exclusions_groups.retain(|g| !g.is_empty());
        removed
    }
}
