//! Exclusions manager: both modes, the inversion flag and the publish step.
//!
//! Every mutation runs synchronously under the state lock, then the lock is
//! released and the result is published: the bypass list goes to the proxy
//! first, then the whole document goes to the settings store. A failed
//! publish keeps the in-memory change; calling [`ExclusionsManager::publish`]
//! or repeating the mutation retries it.
//!
//! Concurrent mutations are not queued. Callers serialize them if they
//! care about the order of publishes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::exclusion::{ExclusionState, PersistedExclusions};
use crate::handler::{ExclusionsHandler, ToggleServicesResult};
use crate::mode::ExclusionsMode;
use crate::proxy::ProxyBypass;
use crate::services::{ServiceDto, ServicesProvider};
use crate::storage::SettingsStore;
use crate::tree::ExclusionDto;

/// A catalog service and its state in the current mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(flatten)]
    pub service: ServiceDto,
    /// `None` when the service is not added
    pub state: Option<ExclusionState>,
}

struct ModeState {
    regular: ExclusionsHandler,
    selective: ExclusionsHandler,
    inverted: bool,
}

impl ModeState {
    fn load(persisted: PersistedExclusions, services: &Arc<dyn ServicesProvider>) -> Self {
        Self {
            regular: ExclusionsHandler::new(persisted.regular, services.clone()),
            selective: ExclusionsHandler::new(persisted.selective, services.clone()),
            inverted: persisted.inverted,
        }
    }

    fn mode(&self) -> ExclusionsMode {
        ExclusionsMode::from_inverted(self.inverted)
    }

    fn handler(&self, mode: ExclusionsMode) -> &ExclusionsHandler {
        match mode {
            ExclusionsMode::Regular => &self.regular,
            ExclusionsMode::Selective => &self.selective,
        }
    }

    fn handler_mut(&mut self, mode: ExclusionsMode) -> &mut ExclusionsHandler {
        match mode {
            ExclusionsMode::Regular => &mut self.regular,
            ExclusionsMode::Selective => &mut self.selective,
        }
    }

    fn current(&self) -> &ExclusionsHandler {
        self.handler(self.mode())
    }

    fn current_mut(&mut self) -> &mut ExclusionsHandler {
        self.handler_mut(self.mode())
    }

    fn publication(&self) -> Publication {
        Publication {
            hostnames: self.current().enabled_hostnames(),
            inverted: self.inverted,
            persisted: PersistedExclusions {
                inverted: self.inverted,
                regular: self.regular.data().clone(),
                selective: self.selective.data().clone(),
            },
        }
    }
}

/// Snapshot handed to the collaborators after a mutation.
struct Publication {
    hostnames: Vec<String>,
    inverted: bool,
    persisted: PersistedExclusions,
}

/// Owns the exclusions of both modes and publishes every change.
///
/// Construct one per application and share it by reference.
pub struct ExclusionsManager {
    state: RwLock<Option<ModeState>>,
    services: Arc<dyn ServicesProvider>,
    settings: Arc<dyn SettingsStore>,
    proxy: Arc<dyn ProxyBypass>,
}

impl ExclusionsManager {
    /// Create a manager. Nothing is loaded until [`init`](Self::init) or
    /// the first call that needs the state.
    pub fn new(
        services: Arc<dyn ServicesProvider>,
        settings: Arc<dyn SettingsStore>,
        proxy: Arc<dyn ProxyBypass>,
    ) -> Self {
        Self {
            state: RwLock::new(None),
            services,
            settings,
            proxy,
        }
    }

    /// Load the persisted exclusions and push the bypass list to the proxy.
    ///
    /// Calling it again reloads from the settings store.
    pub async fn init(&self) -> Result<()> {
        let persisted = self.settings.get_exclusions().await?.unwrap_or_default();
        let state = ModeState::load(persisted, &self.services);
        let (hostnames, inverted, mode) = (
            state.current().enabled_hostnames(),
            state.inverted,
            state.mode(),
        );
        *self.state.write() = Some(state);

        log::info!(
            "Exclusions manager initialized in {} mode with {} bypass hostnames",
            mode,
            hostnames.len()
        );
        self.proxy.set_bypass_list(&hostnames, inverted).await
    }

    /// Whether the state has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let persisted = self.settings.get_exclusions().await?.unwrap_or_default();
        let mut guard = self.state.write();
        if guard.is_none() {
            *guard = Some(ModeState::load(persisted, &self.services));
            log::debug!("Exclusions manager loaded lazily");
        }
        Ok(())
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ModeState) -> T + Send,
    {
        self.ensure_initialized().await?;
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(Error::NotInitialized)?;
        Ok(f(state))
    }

    /// Apply a mutation and publish its result.
    ///
    /// A failing mutation publishes nothing.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ModeState) -> Result<T> + Send,
        T: Send,
    {
        self.ensure_initialized().await?;

        let (value, publication) = {
            let mut guard = self.state.write();
            let state = guard.as_mut().ok_or(Error::NotInitialized)?;
            let value = f(state)?;
            (value, state.publication())
        };

        self.push(publication).await?;
        Ok(value)
    }

    async fn push(&self, publication: Publication) -> Result<()> {
        log::debug!(
            "Publishing {} bypass hostnames (inverted: {})",
            publication.hostnames.len(),
            publication.inverted
        );

        if let Err(e) = self
            .proxy
            .set_bypass_list(&publication.hostnames, publication.inverted)
            .await
        {
            log::error!("Failed to push bypass list: {}", e);
            return Err(e);
        }

        if let Err(e) = self.settings.set_exclusions(&publication.persisted).await {
            log::error!("Failed to persist exclusions: {}", e);
            return Err(e);
        }

        Ok(())
    }

    /// Publish the current state again without changing it.
    pub async fn publish(&self) -> Result<()> {
        self.mutate(|_| Ok(())).await
    }

    /// Serialized tree of the current mode.
    pub async fn get_exclusions(&self) -> Result<ExclusionDto> {
        self.read(|state| state.current().get_exclusions()).await
    }

    /// Current mode; `Regular` before initialization.
    pub fn current_mode(&self) -> ExclusionsMode {
        self.state
            .read()
            .as_ref()
            .map(ModeState::mode)
            .unwrap_or_default()
    }

    /// Whether the bypass list is inverted.
    pub fn is_inverted(&self) -> bool {
        self.current_mode().is_inverted()
    }

    /// Switch the current mode and republish.
    pub async fn set_mode(&self, mode: ExclusionsMode) -> Result<()> {
        self.mutate(|state| {
            state.inverted = mode.is_inverted();
            Ok(())
        })
        .await?;
        log::info!("Exclusions mode set to {}", mode);
        Ok(())
    }

    /// Switch mode by name; unknown names fail with [`Error::UnknownMode`].
    pub async fn set_mode_by_name(&self, name: &str) -> Result<()> {
        let mode: ExclusionsMode = name.parse()?;
        self.set_mode(mode).await
    }

    /// Add a URL or hostname to the current mode.
    ///
    /// Unparsable input is logged and adds nothing. Returns the number of
    /// exclusions added.
    pub async fn add_url_to_exclusions(&self, url: &str) -> Result<usize> {
        let result = self
            .mutate(|state| state.current_mut().add_url_to_exclusions(url))
            .await;
        let added = recover_invalid_hostname(result)?;
        log::debug!("Added {} exclusions for {:?}", added, url);
        Ok(added)
    }

    /// Add services to the current mode, disabled. Returns exclusions added.
    pub async fn add_services(&self, service_ids: &[String]) -> Result<usize> {
        let added = self
            .mutate(|state| state.current_mut().add_services(service_ids))
            .await?;
        log::debug!("Added {} exclusions for {} services", added, service_ids.len());
        Ok(added)
    }

    /// Remove a node. Returns the number of leaves removed.
    pub async fn remove_exclusion(&self, id: &str) -> Result<usize> {
        let removed = self
            .mutate(|state| state.current_mut().remove_exclusion(id))
            .await?;
        log::debug!("Removed {} exclusions under {}", removed, id);
        Ok(removed)
    }

    /// Toggle a node. Returns its new state.
    pub async fn toggle_exclusion_state(&self, id: &str) -> Result<ExclusionState> {
        let state = self
            .mutate(|state| state.current_mut().toggle_exclusion_state(id))
            .await?;
        log::debug!("Toggled {} to {}", id, state);
        Ok(state)
    }

    /// Remove the listed services that are present and add the others.
    pub async fn toggle_services(&self, service_ids: &[String]) -> Result<ToggleServicesResult> {
        let result = self
            .mutate(|state| state.current_mut().toggle_services(service_ids))
            .await?;
        log::debug!(
            "Toggled services: {} exclusions added, {} deleted",
            result.added,
            result.deleted
        );
        Ok(result)
    }

    /// Whether traffic to the URL goes through the VPN.
    ///
    /// Returns `true` before initialization.
    pub fn is_vpn_enabled_by_url(&self, url: &str) -> bool {
        let guard = self.state.read();
        match guard.as_ref() {
            Some(state) => {
                let excluded = state.current().is_excluded(url);
                if state.inverted {
                    excluded
                } else {
                    !excluded
                }
            }
            None => true,
        }
    }

    /// Route the URL through the VPN.
    ///
    /// Adds it to the selective list, or disables the regular exclusions
    /// covering it. Returns the number of exclusions changed.
    pub async fn enable_vpn_by_url(&self, url: &str) -> Result<usize> {
        self.ensure_initialized().await?;
        if self.is_inverted() {
            self.add_url_to_exclusions(url).await
        } else {
            self.disable_exclusions_for(url).await
        }
    }

    /// Route the URL around the VPN; the mirror of [`enable_vpn_by_url`](Self::enable_vpn_by_url).
    pub async fn disable_vpn_by_url(&self, url: &str) -> Result<usize> {
        self.ensure_initialized().await?;
        if self.is_inverted() {
            self.disable_exclusions_for(url).await
        } else {
            self.add_url_to_exclusions(url).await
        }
    }

    async fn disable_exclusions_for(&self, url: &str) -> Result<usize> {
        let result = self
            .mutate(|state| state.current_mut().disable_by_hostname(url))
            .await;
        let disabled = recover_invalid_hostname(result)?;
        log::debug!("Disabled {} exclusions for {:?}", disabled, url);
        Ok(disabled)
    }

    /// Restore a service to the catalog's definition, fully enabled.
    pub async fn reset_service_data(&self, service_id: &str) -> Result<()> {
        self.mutate(|state| state.current_mut().reset_service_data(service_id))
            .await?;
        log::debug!("Reset service {}", service_id);
        Ok(())
    }

    /// Empty both modes.
    pub async fn clear_exclusions_data(&self) -> Result<()> {
        self.mutate(|state| {
            state.regular.clear();
            state.selective.clear();
            Ok(())
        })
        .await?;
        log::info!("Cleared all exclusions");
        Ok(())
    }

    /// Enabled hostnames of the regular list, one per line.
    pub async fn get_regular_exclusions(&self) -> Result<String> {
        self.read(|state| state.regular.export()).await
    }

    /// Enabled hostnames of the selective list, one per line.
    pub async fn get_selective_exclusions(&self) -> Result<String> {
        self.read(|state| state.selective.export()).await
    }

    /// Add a newline separated hostname list to a mode.
    ///
    /// Returns the number of exclusions added.
    pub async fn import_exclusions(&self, mode: ExclusionsMode, text: &str) -> Result<usize> {
        let added = self
            .mutate(|state| Ok(state.handler_mut(mode).import(text)))
            .await?;
        log::info!("Imported {} exclusions into {} mode", added, mode);
        Ok(added)
    }

    /// Every catalog service with its state in the current mode.
    pub async fn get_services(&self) -> Result<Vec<ServiceStatus>> {
        let services = self.services.get_services();
        self.read(move |state| {
            services
                .into_iter()
                .map(|service| {
                    let status = state.current().service_state(&service.service_id);
                    ServiceStatus {
                        service,
                        state: status,
                    }
                })
                .collect()
        })
        .await
    }

    /// Bypass list of the current mode.
    pub async fn bypass_list(&self) -> Result<Vec<String>> {
        self.read(|state| state.current().enabled_hostnames()).await
    }

    /// Rebuild both trees, e.g. after the catalog was replaced.
    pub fn rebuild_trees(&self) {
        if let Some(state) = self.state.write().as_mut() {
            state.regular.rebuild();
            state.selective.rebuild();
        }
    }
}

/// Turn an invalid hostname into a logged zero result.
fn recover_invalid_hostname(result: Result<usize>) -> Result<usize> {
    match result {
        Err(Error::InvalidHostname(input)) => {
            log::error!("Invalid hostname: {:?}", input);
            Ok(0)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::MemoryProxyBypass;
    use crate::services::ServicesCatalog;
    use crate::storage::MemorySettingsStore;

    struct Fixture {
        manager: ExclusionsManager,
        settings: Arc<MemorySettingsStore>,
        proxy: Arc<MemoryProxyBypass>,
    }

    fn fixture() -> Fixture {
        let services = Arc::new(ServicesCatalog::new(vec![ServiceDto::new(
            "video",
            "Video",
            vec!["a.com".to_string(), "b.com".to_string()],
        )]));
        let settings = Arc::new(MemorySettingsStore::new());
        let proxy = Arc::new(MemoryProxyBypass::new());
        let manager = ExclusionsManager::new(services, settings.clone(), proxy.clone());
        Fixture {
            manager,
            settings,
            proxy,
        }
    }

    #[tokio::test]
    async fn test_vpn_enabled_before_init() {
        let f = fixture();
        assert!(!f.manager.is_initialized());
        assert!(f.manager.is_vpn_enabled_by_url("example.com"));
        assert_eq!(f.manager.current_mode(), ExclusionsMode::Regular);
    }

    #[tokio::test]
    async fn test_init_pushes_bypass_list() {
        let f = fixture();
        f.manager.init().await.unwrap();
        assert!(f.manager.is_initialized());
        assert_eq!(f.proxy.calls(), 1);
        assert!(f.proxy.last().unwrap().hostnames.is_empty());
    }

    #[tokio::test]
    async fn test_mutation_publishes() {
        let f = fixture();
        assert_eq!(f.manager.add_url_to_exclusions("mail.example.com").await.unwrap(), 3);

        let last = f.proxy.last().unwrap();
        assert_eq!(last.hostnames, vec!["mail.example.com".to_string()]);
        assert!(!last.inverted);

        let persisted = f.settings.snapshot().unwrap();
        assert_eq!(persisted.regular.leaf_count(), 3);
        assert!(persisted.selective.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_hostname_is_noop() {
        let f = fixture();
        f.manager.init().await.unwrap();
        assert_eq!(f.manager.add_url_to_exclusions("not a host").await.unwrap(), 0);
        assert_eq!(f.proxy.calls(), 1);
        assert!(f.settings.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_propagates() {
        let f = fixture();
        assert!(matches!(
            f.manager.remove_exclusion("stale").await,
            Err(Error::UnknownId(_))
        ));
        assert!(matches!(
            f.manager.toggle_exclusion_state("stale").await,
            Err(Error::UnknownId(_))
        ));
    }

    #[tokio::test]
    async fn test_modes_are_independent() {
        let f = fixture();
        f.manager.add_url_to_exclusions("regular.com").await.unwrap();
        f.manager.set_mode(ExclusionsMode::Selective).await.unwrap();
        f.manager.add_url_to_exclusions("selective.com").await.unwrap();

        assert!(f.manager.is_inverted());
        assert_eq!(f.manager.get_regular_exclusions().await.unwrap(), "regular.com");
        assert_eq!(f.manager.get_selective_exclusions().await.unwrap(), "selective.com");
        assert_eq!(f.proxy.last().unwrap().hostnames, vec!["selective.com".to_string()]);
        assert!(f.settings.snapshot().unwrap().inverted);
    }

    #[tokio::test]
    async fn test_set_mode_by_name() {
        let f = fixture();
        assert!(matches!(
            f.manager.set_mode_by_name("split").await,
            Err(Error::UnknownMode(_))
        ));
        f.manager.set_mode_by_name("selective").await.unwrap();
        assert_eq!(f.manager.current_mode(), ExclusionsMode::Selective);
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_memory() {
        let f = fixture();
        f.settings.set_fail_writes(true);

        let err = f.manager.add_url_to_exclusions("example.com").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.manager.bypass_list().await.unwrap(), vec!["example.com".to_string()]);
        assert!(f.settings.snapshot().is_none());

        f.settings.set_fail_writes(false);
        f.manager.publish().await.unwrap();
        assert_eq!(f.settings.snapshot().unwrap().regular.leaf_count(), 2);
    }

    #[tokio::test]
    async fn test_enable_disable_vpn() {
        let f = fixture();
        f.manager.disable_vpn_by_url("https://example.com/").await.unwrap();
        assert!(!f.manager.is_vpn_enabled_by_url("example.com"));

        assert_eq!(f.manager.enable_vpn_by_url("example.com").await.unwrap(), 1);
        assert!(f.manager.is_vpn_enabled_by_url("example.com"));

        f.manager.set_mode(ExclusionsMode::Selective).await.unwrap();
        assert!(!f.manager.is_vpn_enabled_by_url("example.com"));
        f.manager.enable_vpn_by_url("example.com").await.unwrap();
        assert!(f.manager.is_vpn_enabled_by_url("example.com"));
        f.manager.disable_vpn_by_url("example.com").await.unwrap();
        assert!(!f.manager.is_vpn_enabled_by_url("example.com"));
    }

    #[tokio::test]
    async fn test_get_services() {
        let f = fixture();
        let before = f.manager.get_services().await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].state, None);

        f.manager.add_services(&["video".to_string()]).await.unwrap();
        let after = f.manager.get_services().await.unwrap();
        assert_eq!(after[0].state, Some(ExclusionState::Disabled));
    }

    #[tokio::test]
    async fn test_clear_and_import() {
        let f = fixture();
        f.manager.add_url_to_exclusions("example.com").await.unwrap();
        assert_eq!(
            f.manager
                .import_exclusions(ExclusionsMode::Selective, "one.com\ntwo.com\n")
                .await
                .unwrap(),
            4
        );

        f.manager.clear_exclusions_data().await.unwrap();
        let persisted = f.settings.snapshot().unwrap();
        assert!(persisted.regular.is_empty());
        assert!(persisted.selective.is_empty());
    }
}
