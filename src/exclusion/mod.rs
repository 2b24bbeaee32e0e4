//! Exclusion entities and the flat collections they are persisted in.

mod group;
mod service;
mod state;

pub use group::{Exclusion, ExclusionsGroup};
pub use service::Service;
pub use state::ExclusionState;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::hostname::matches_hostname;
use crate::services::ServiceDto;

/// Flat exclusion collections of one mode.
///
/// This is the persisted form; the tree is derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExclusionsData {
    pub excluded_services: Vec<Service>,
    pub exclusions_groups: Vec<ExclusionsGroup>,
    pub excluded_ips: Vec<Exclusion>,
}

impl ExclusionsData {
    /// Create empty collections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether there are no exclusions at all.
    pub fn is_empty(&self) -> bool {
        self.excluded_services.is_empty()
            && self.exclusions_groups.is_empty()
            && self.excluded_ips.is_empty()
    }

    /// Drop every exclusion.
    pub fn clear(&mut self) {
        self.excluded_services.clear();
        self.exclusions_groups.clear();
        self.excluded_ips.clear();
    }

    /// Iterate over every leaf exclusion.
    pub fn exclusions(&self) -> impl Iterator<Item = &Exclusion> {
        self.excluded_services
            .iter()
            .flat_map(|s| s.exclusions_groups.iter())
            .chain(self.exclusions_groups.iter())
            .flat_map(|g| g.exclusions.iter())
            .chain(self.excluded_ips.iter())
    }

    /// Iterate mutably over every leaf exclusion.
    pub fn exclusions_mut(&mut self) -> impl Iterator<Item = &mut Exclusion> {
        self.excluded_services
            .iter_mut()
            .flat_map(|s| s.exclusions_groups.iter_mut())
            .chain(self.exclusions_groups.iter_mut())
            .flat_map(|g| g.exclusions.iter_mut())
            .chain(self.excluded_ips.iter_mut())
    }

    /// Total number of leaf exclusions.
    pub fn leaf_count(&self) -> usize {
        self.exclusions().count()
    }

    /// Find a leaf by exact hostname.
    pub fn find_by_hostname_mut(&mut self, hostname: &str) -> Option<&mut Exclusion> {
        self.exclusions_mut().find(|e| e.hostname == hostname)
    }

    /// Find an added service by id.
    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.excluded_services
            .iter()
            .find(|s| s.service_id == service_id)
    }

    /// Find the added service owning a hostname.
    pub fn service_for_hostname(&self, hostname: &str) -> Option<&Service> {
        self.excluded_services
            .iter()
            .find(|s| s.owns_hostname(hostname))
    }

    /// Add a service, or complete an already added one.
    ///
    /// Missing domains are added with their wildcard at `enabled`; existing
    /// exclusions keep their state. Standalone groups for one of the
    /// service's domains move into the service. Returns the index of the
    /// service in `excluded_services`.
    pub fn ensure_service(&mut self, dto: &ServiceDto, enabled: bool) -> usize {
        let index = match self
            .excluded_services
            .iter()
            .position(|s| s.service_id == dto.service_id)
        {
            Some(index) => {
                self.excluded_services[index].update_from(dto);
                index
            }
            None => {
                self.excluded_services.push(Service::new(dto));
                self.excluded_services.len() - 1
            }
        };

        let (absorbed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.exclusions_groups)
            .into_iter()
            .partition(|g| dto.domains.contains(&g.hostname));
        self.exclusions_groups = kept;

        let service = &mut self.excluded_services[index];
        for group in absorbed {
            service.absorb_group(group);
        }
        service.ensure_domains(enabled);

        index
    }

    /// Replace a service with its canonical form at `enabled`.
    pub fn reset_service(&mut self, dto: &ServiceDto, enabled: bool) {
        let fresh = Service::from_dto(dto, enabled);
        self.exclusions_groups
            .retain(|g| !dto.domains.contains(&g.hostname));

        match self
            .excluded_services
            .iter_mut()
            .find(|s| s.service_id == dto.service_id)
        {
            Some(existing) => *existing = fresh,
            None => self.excluded_services.push(fresh),
        }
    }

    /// Remove leaves by id, then drop groups and services left empty.
    ///
    /// Returns the number of leaves removed.
    pub fn remove_ids(&mut self, ids: &AHashSet<&str>) -> usize {
        let mut removed = 0;

        for service in self.excluded_services.iter_mut() {
            removed += service.remove_ids(ids);
        }
        self.excluded_services
            .retain(|s| !s.exclusions_groups.is_empty());

        for group in self.exclusions_groups.iter_mut() {
            removed += group.remove_ids(ids);
        }
        self.exclusions_groups.retain(|g| !g.is_empty());

        let before = self.excluded_ips.len();
        self.excluded_ips.retain(|e| !ids.contains(e.id.as_str()));
        removed += before - self.excluded_ips.len();

        removed
    }

    /// Remove a whole group by id, wherever it lives.
    ///
    /// Returns the number of leaves removed, `None` if the id is unknown.
    pub fn remove_group(&mut self, group_id: &str) -> Option<usize> {
        if let Some(pos) = self.exclusions_groups.iter().position(|g| g.id == group_id) {
            return Some(self.exclusions_groups.remove(pos).len());
        }

        for service in self.excluded_services.iter_mut() {
            if let Some(pos) = service.exclusions_groups.iter().position(|g| g.id == group_id) {
                let removed = service.exclusions_groups.remove(pos).len();
                self.excluded_services
                    .retain(|s| !s.exclusions_groups.is_empty());
                return Some(removed);
            }
        }

        None
    }

    /// Remove a whole service by id.
    ///
    /// Returns the number of leaves removed, `None` if the id is unknown.
    pub fn remove_service(&mut self, service_id: &str) -> Option<usize> {
        let pos = self
            .excluded_services
            .iter()
            .position(|s| s.service_id == service_id)?;
        Some(self.excluded_services.remove(pos).leaf_count())
    }

    /// Set the enabled flag of leaves by id. Returns the number matched.
    pub fn set_enabled(&mut self, ids: &AHashSet<&str>, enabled: bool) -> usize {
        let mut matched = 0;
        for exclusion in self.exclusions_mut() {
            if ids.contains(exclusion.id.as_str()) {
                exclusion.enabled = enabled;
                matched += 1;
            }
        }
        matched
    }

    /// Disable every enabled leaf covering the hostname.
    ///
    /// Returns the number of leaves switched off.
    pub fn disable_matching(&mut self, hostname: &str) -> usize {
        let mut disabled = 0;
        for exclusion in self.exclusions_mut() {
            if exclusion.enabled && matches_hostname(&exclusion.hostname, hostname) {
                exclusion.enabled = false;
                disabled += 1;
            }
        }
        disabled
    }

    /// Whether an enabled leaf covers the hostname.
    pub fn is_excluded(&self, hostname: &str) -> bool {
        self.exclusions()
            .any(|e| e.enabled && matches_hostname(&e.hostname, hostname))
    }
}

/// Persisted exclusions document: both modes plus the inversion flag.
///
/// `inverted` selects the selective collections as current.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedExclusions {
    pub inverted: bool,
    pub regular: ExclusionsData,
    pub selective: ExclusionsData,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_dto() -> ServiceDto {
        ServiceDto::new("video", "Video", vec!["a.com".to_string(), "b.com".to_string()])
    }

    fn ids_of<'a>(data: &'a ExclusionsData, hostname: &str) -> Vec<&'a str> {
        data.exclusions()
            .filter(|e| e.hostname == hostname)
            .map(|e| e.id.as_str())
            .collect()
    }

    #[test]
    fn test_leaf_iteration() {
        let mut data = ExclusionsData::new();
        data.exclusions_groups.push(ExclusionsGroup::new("example.com", true));
        data.excluded_ips.push(Exclusion::new("10.0.0.1", true));
        data.ensure_service(&service_dto(), false);

        assert_eq!(data.leaf_count(), 7);
        assert!(!data.is_empty());

        data.clear();
        assert!(data.is_empty());
        assert_eq!(data.leaf_count(), 0);
    }

    #[test]
    fn test_ensure_service_absorbs_groups() {
        let mut data = ExclusionsData::new();
        data.exclusions_groups.push(ExclusionsGroup::new("a.com", true));
        data.exclusions_groups.push(ExclusionsGroup::new("other.com", true));

        data.ensure_service(&service_dto(), false);

        assert_eq!(data.exclusions_groups.len(), 1);
        assert_eq!(data.exclusions_groups[0].hostname, "other.com");
        let service = data.service("video").unwrap();
        assert_eq!(service.group("a.com").unwrap().state(), ExclusionState::Enabled);
        assert_eq!(service.group("b.com").unwrap().state(), ExclusionState::Disabled);
    }

    #[test]
    fn test_ensure_service_twice() {
        let mut data = ExclusionsData::new();
        data.ensure_service(&service_dto(), false);
        data.ensure_service(&service_dto(), true);

        assert_eq!(data.excluded_services.len(), 1);
        assert_eq!(data.leaf_count(), 4);
        assert_eq!(data.service("video").unwrap().state(), ExclusionState::Disabled);
    }

    #[test]
    fn test_remove_ids_cleans_up() {
        let mut data = ExclusionsData::new();
        data.exclusions_groups.push(ExclusionsGroup::new("example.com", true));

        let ids: Vec<String> = data.exclusions().map(|e| e.id.clone()).collect();
        let ids: AHashSet<&str> = ids.iter().map(String::as_str).collect();

        assert_eq!(data.remove_ids(&ids), 2);
        assert!(data.exclusions_groups.is_empty());
    }

    #[test]
    fn test_remove_group_inside_service() {
        let mut data = ExclusionsData::new();
        data.ensure_service(&service_dto(), false);
        let group_id = data.service("video").unwrap().group("a.com").unwrap().id.clone();

        assert_eq!(data.remove_group(&group_id), Some(2));
        assert_eq!(data.service("video").unwrap().exclusions_groups.len(), 1);
        assert_eq!(data.remove_group("missing"), None);
    }

    #[test]
    fn test_disable_matching() {
        let mut data = ExclusionsData::new();
        let mut group = ExclusionsGroup::new("example.com", true);
        group.merge(vec![Exclusion::new("mail.example.com", true)]);
        data.exclusions_groups.push(group);

        assert!(data.is_excluded("mail.example.com"));
        assert!(data.is_excluded("example.com"));

        // The wildcard and the exact entry both cover mail.example.com
        assert_eq!(data.disable_matching("mail.example.com"), 2);
        assert!(!data.is_excluded("mail.example.com"));
        assert!(data.is_excluded("example.com"));
        assert_eq!(ids_of(&data, "example.com").len(), 1);
    }

    #[test]
    fn test_persisted_json_shape() {
        let mut persisted = PersistedExclusions::default();
        persisted.inverted = true;
        persisted.selective.excluded_ips.push(Exclusion::new("10.0.0.1", true));

        let json = serde_json::to_value(&persisted).unwrap();
        assert_eq!(json["inverted"], true);
        assert!(json["regular"]["excludedServices"].is_array());
        assert_eq!(json["selective"]["excludedIps"][0]["hostname"], "10.0.0.1");

        let back: PersistedExclusions = serde_json::from_value(json).unwrap();
        assert_eq!(back, persisted);
    }

    #[test]
    fn test_persisted_missing_fields_default() {
        let back: PersistedExclusions = serde_json::from_str(r#"{"inverted":false}"#).unwrap();
        assert!(back.regular.is_empty());
        assert!(back.selective.is_empty());
    }
}
