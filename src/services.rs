//! Service catalog: named bundles of domains provided by a remote source.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::hostname::is_same_or_subdomain;

/// Category a service is listed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCategory {
    pub id: String,
    pub name: String,
}

/// A catalog entry: service metadata plus the domains it spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDto {
    pub service_id: String,
    pub service_name: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub categories: Vec<ServiceCategory>,
    pub domains: Vec<String>,
}

impl ServiceDto {
    /// Create an uncategorized service without an icon.
    pub fn new(
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        domains: Vec<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            icon_url: String::new(),
            categories: Vec::new(),
            domains,
        }
    }

    /// Whether the hostname is one of the service's domains or below one.
    pub fn owns_hostname(&self, hostname: &str) -> bool {
        self.domains.iter().any(|d| is_same_or_subdomain(hostname, d))
    }
}

/// Source of service definitions.
pub trait ServicesProvider: Send + Sync {
    /// Every known service.
    fn get_services(&self) -> Vec<ServiceDto>;

    /// A single service by id.
    fn get_service(&self, service_id: &str) -> Option<ServiceDto>;

    /// The service owning a hostname, if any.
    fn find_service_by_hostname(&self, hostname: &str) -> Option<ServiceDto> {
        self.get_services()
            .into_iter()
            .find(|s| s.owns_hostname(hostname))
    }
}

/// On-disk catalog: either a bare list or `{ services: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<ServiceDto>),
    Wrapped { services: Vec<ServiceDto> },
}

impl CatalogFile {
    fn into_services(self) -> Vec<ServiceDto> {
        match self {
            CatalogFile::List(services) => services,
            CatalogFile::Wrapped { services } => services,
        }
    }
}

/// In-memory service catalog that can be refreshed while in use.
///
/// Readers always see a complete snapshot.
pub struct ServicesCatalog {
    services: ArcSwap<Vec<ServiceDto>>,
}

impl ServicesCatalog {
    /// Create a catalog from a list of services.
    pub fn new(services: Vec<ServiceDto>) -> Self {
        Self {
            services: ArcSwap::from_pointee(services),
        }
    }

    /// Create an empty catalog.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Parse a JSON catalog.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Ok(Self::new(file.into_services()))
    }

    /// Parse a YAML catalog.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        Ok(Self::new(file.into_services()))
    }

    /// Load a catalog file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let catalog = if is_yaml(path) {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };
        log::info!(
            "Loaded {} services from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Swap in a new list of services.
    pub fn replace(&self, services: Vec<ServiceDto>) {
        log::debug!("Replacing service catalog with {} services", services.len());
        self.services.store(Arc::new(services));
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.load().len()
    }

    /// Check if the catalog has no services.
    pub fn is_empty(&self) -> bool {
        self.services.load().is_empty()
    }
}

impl Default for ServicesCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl ServicesProvider for ServicesCatalog {
    fn get_services(&self) -> Vec<ServiceDto> {
        Vec::clone(&self.services.load())
    }

    fn get_service(&self, service_id: &str) -> Option<ServiceDto> {
        self.services
            .load()
            .iter()
            .find(|s| s.service_id == service_id)
            .cloned()
    }

    fn find_service_by_hostname(&self, hostname: &str) -> Option<ServiceDto> {
        self.services
            .load()
            .iter()
            .find(|s| s.owns_hostname(hostname))
            .cloned()
    }
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CATALOG_JSON: &str = r#"[
        {
            "serviceId": "video",
            "serviceName": "Video",
            "iconUrl": "https://icons.test/video.png",
            "categories": [{"id": "media", "name": "Media"}],
            "domains": ["video.com", "videocdn.net"]
        },
        {
            "serviceId": "chat",
            "serviceName": "Chat",
            "domains": ["chat.org"]
        }
    ]"#;

    #[test]
    fn test_from_json_list() {
        let catalog = ServicesCatalog::from_json(CATALOG_JSON).unwrap();
        assert_eq!(catalog.len(), 2);

        let video = catalog.get_service("video").unwrap();
        assert_eq!(video.categories[0].name, "Media");
        assert_eq!(video.domains.len(), 2);

        let chat = catalog.get_service("chat").unwrap();
        assert!(chat.icon_url.is_empty());
        assert!(catalog.get_service("missing").is_none());
    }

    #[test]
    fn test_from_yaml_wrapped() {
        let yaml = r#"
services:
  - serviceId: video
    serviceName: Video
    domains:
      - video.com
"#;
        let catalog = ServicesCatalog::from_yaml(yaml).unwrap();
        assert_eq!(catalog.get_services().len(), 1);
    }

    #[test]
    fn test_find_by_hostname() {
        let catalog = ServicesCatalog::from_json(CATALOG_JSON).unwrap();
        let found = catalog.find_service_by_hostname("img.videocdn.net").unwrap();
        assert_eq!(found.service_id, "video");
        assert!(catalog.find_service_by_hostname("example.com").is_none());
    }

    #[test]
    fn test_replace() {
        let catalog = ServicesCatalog::from_json(CATALOG_JSON).unwrap();
        catalog.replace(vec![ServiceDto::new("mail", "Mail", vec!["mail.net".to_string()])]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get_service("video").is_none());
        assert!(catalog.get_service("mail").is_some());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("services.json");
        fs::write(&json_path, CATALOG_JSON).unwrap();
        assert_eq!(ServicesCatalog::load(&json_path).unwrap().len(), 2);

        let yaml_path = dir.path().join("services.yml");
        fs::write(&yaml_path, "- serviceId: a\n  serviceName: A\n  domains: [a.com]\n").unwrap();
        assert_eq!(ServicesCatalog::load(&yaml_path).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_json() {
        assert!(ServicesCatalog::from_json("{not json").is_err());
    }
}
