//! Per-mode exclusions handler: flat collections plus their derived tree.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::complement::{apply_to_groups, apply_to_service};
use crate::error::{Error, Result};
use crate::exclusion::{Exclusion, ExclusionState, ExclusionsData};
use crate::hostname::{get_hostname, is_ip, is_main_domain};
use crate::services::{ServiceDto, ServicesProvider};
use crate::tree::{ExclusionDto, ExclusionsTree, NodeKind};

/// Leaf counts changed by a services toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleServicesResult {
    pub added: usize,
    pub deleted: usize,
}

/// Exclusions of one mode.
///
/// Every mutation updates the flat collections and then rebuilds the tree,
/// so the tree always reflects the data.
pub struct ExclusionsHandler {
    data: ExclusionsData,
    tree: ExclusionsTree,
    services: Arc<dyn ServicesProvider>,
}

impl ExclusionsHandler {
    /// Create a handler over existing collections.
    pub fn new(data: ExclusionsData, services: Arc<dyn ServicesProvider>) -> Self {
        let tree = ExclusionsTree::from_data(&data, services.as_ref());
        Self {
            data,
            tree,
            services,
        }
    }

    /// The flat collections.
    pub fn data(&self) -> &ExclusionsData {
        &self.data
    }

    /// The current tree.
    pub fn tree(&self) -> &ExclusionsTree {
        &self.tree
    }

    /// Serialized tree.
    pub fn get_exclusions(&self) -> ExclusionDto {
        self.tree.serialize()
    }

    /// Rebuild the tree from the collections, e.g. after a catalog refresh.
    pub fn rebuild(&mut self) {
        self.tree = ExclusionsTree::from_data(&self.data, self.services.as_ref());
    }

    /// Add a URL or hostname.
    ///
    /// - An existing exact exclusion is re-enabled, nothing is added.
    /// - A hostname of a known service adds the service (disabled) and
    ///   enables the touched hostname within it.
    /// - An IP is added as a single leaf.
    /// - Anything else goes through the complement generator.
    ///
    /// Returns the number of exclusions added.
    pub fn add_url_to_exclusions(&mut self, url: &str) -> Result<usize> {
        let hostname = get_hostname(url).ok_or_else(|| Error::InvalidHostname(url.to_string()))?;

        if let Some(existing) = self.data.find_by_hostname_mut(&hostname) {
            existing.enabled = true;
            self.rebuild();
            return Ok(0);
        }

        let added = if let Some(dto) = self.service_for_hostname(&hostname) {
            let before = self.data.leaf_count();
            let index = self.data.ensure_service(&dto, false);
            apply_to_service(&mut self.data.excluded_services[index], &hostname, true);
            self.data.leaf_count().saturating_sub(before)
        } else if is_ip(&hostname) {
            self.data.excluded_ips.push(Exclusion::new(hostname, true));
            1
        } else {
            apply_to_groups(&mut self.data.exclusions_groups, &hostname, true)?
        };

        self.rebuild();
        Ok(added)
    }

    /// Add services by id, every domain and its wildcard disabled.
    ///
    /// Already added services only get their missing domains. Unknown ids
    /// fail before anything is changed. Returns the number of exclusions
    /// added.
    pub fn add_services(&mut self, service_ids: &[String]) -> Result<usize> {
        let dtos = self.resolve_services(service_ids)?;

        let before = self.data.leaf_count();
        for dto in &dtos {
            self.data.ensure_service(dto, false);
        }
        let added = self.data.leaf_count().saturating_sub(before);

        self.rebuild();
        Ok(added)
    }

    /// Remove a node and every leaf below it.
    ///
    /// Removing the main domain leaf of a group removes the whole group.
    /// Returns the number of leaves removed.
    pub fn remove_exclusion(&mut self, id: &str) -> Result<usize> {
        let node = self
            .tree
            .get_exclusion_node(id)
            .ok_or_else(|| Error::UnknownId(id.to_string()))?;

        let target = match node.kind {
            NodeKind::Exclusion if is_main_domain(&node.hostname) => self
                .tree
                .get_parent_exclusion_node(id)
                .filter(|p| p.kind == NodeKind::Group)
                .unwrap_or(node),
            _ => node,
        };

        let ids = target.leaf_ids();
        let ids: AHashSet<&str> = ids.iter().map(String::as_str).collect();
        let removed = self.data.remove_ids(&ids);

        self.rebuild();
        Ok(removed)
    }

    /// Toggle a node.
    ///
    /// A disabled node gets every leaf below enabled; an enabled or partly
    /// enabled one gets every leaf disabled. Returns the new state.
    pub fn toggle_exclusion_state(&mut self, id: &str) -> Result<ExclusionState> {
        let node = self
            .tree
            .get_exclusion_node(id)
            .ok_or_else(|| Error::UnknownId(id.to_string()))?;

        let enabled = node.state.toggle_target();
        let ids = node.leaf_ids();
        let ids: AHashSet<&str> = ids.iter().map(String::as_str).collect();
        self.data.set_enabled(&ids, enabled);

        self.rebuild();
        self.tree
            .get_exclusion_state(id)
            .ok_or_else(|| Error::UnknownId(id.to_string()))
    }

    /// Remove the listed services that are present, add the others.
    pub fn toggle_services(&mut self, service_ids: &[String]) -> Result<ToggleServicesResult> {
        let (present, absent): (Vec<String>, Vec<String>) = service_ids
            .iter()
            .cloned()
            .partition(|id| self.data.service(id).is_some());
        let to_add = self.resolve_services(&absent)?;

        let mut result = ToggleServicesResult::default();
        for id in &present {
            result.deleted += self.data.remove_service(id).unwrap_or(0);
        }

        let before = self.data.leaf_count();
        for dto in &to_add {
            self.data.ensure_service(dto, false);
        }
        result.added = self.data.leaf_count().saturating_sub(before);

        self.rebuild();
        Ok(result)
    }

    /// Disable every enabled exclusion covering the URL's hostname.
    ///
    /// Returns the number of exclusions disabled.
    pub fn disable_by_hostname(&mut self, url: &str) -> Result<usize> {
        let hostname = get_hostname(url).ok_or_else(|| Error::InvalidHostname(url.to_string()))?;
        let disabled = self.data.disable_matching(&hostname);
        self.rebuild();
        Ok(disabled)
    }

    /// Whether an enabled exclusion covers the URL's hostname.
    ///
    /// Unparsable input is never excluded.
    pub fn is_excluded(&self, url: &str) -> bool {
        match get_hostname(url) {
            Some(hostname) => self.data.is_excluded(&hostname),
            None => false,
        }
    }

    /// Replace a service with the catalog's definition, every domain enabled.
    pub fn reset_service_data(&mut self, service_id: &str) -> Result<()> {
        let dto = self
            .services
            .get_service(service_id)
            .ok_or_else(|| Error::UnknownService(service_id.to_string()))?;
        self.data.reset_service(&dto, true);
        self.rebuild();
        Ok(())
    }

    /// Drop every exclusion.
    pub fn clear(&mut self) {
        self.data.clear();
        self.rebuild();
    }

    /// Enabled hostnames, deduplicated. This is the bypass list.
    pub fn enabled_hostnames(&self) -> Vec<String> {
        self.tree.enabled_hostnames()
    }

    /// Enabled hostnames, one per line.
    pub fn export(&self) -> String {
        self.enabled_hostnames().join("\n")
    }

    /// Add every hostname of a newline separated list.
    ///
    /// Blank lines and `#` comments are skipped; invalid lines are logged
    /// and skipped. Returns the number of exclusions added.
    pub fn import(&mut self, text: &str) -> usize {
        let mut added = 0;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match self.add_url_to_exclusions(line) {
                Ok(count) => added += count,
                Err(e) => log::error!("Skipping imported entry {:?}: {}", line, e),
            }
        }
        added
    }

    /// Aggregated state of an added service.
    pub fn service_state(&self, service_id: &str) -> Option<ExclusionState> {
        self.data.service(service_id).map(|_| {
            self.tree
                .get_exclusion_state(service_id)
                .unwrap_or(ExclusionState::Disabled)
        })
    }

    fn service_for_hostname(&self, hostname: &str) -> Option<ServiceDto> {
        self.data
            .service_for_hostname(hostname)
            .map(|s| s.to_dto())
            .or_else(|| self.services.find_service_by_hostname(hostname))
    }

    fn resolve_services(&self, service_ids: &[String]) -> Result<Vec<ServiceDto>> {
        service_ids
            .iter()
            .map(|id| {
                self.services
                    .get_service(id)
                    .or_else(|| self.data.service(id).map(|s| s.to_dto()))
                    .ok_or_else(|| Error::UnknownService(id.clone()))
            })
            .collect()
    }
}
