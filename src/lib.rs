//! K2Bypass - VPN exclusion lists with hierarchical state.
//!
//! This crate turns user actions (add a URL, add a service, toggle a node)
//! into a three-level exclusions tree and a flat bypass list for the proxy
//! layer.
//!
//! # Features
//!
//! - **Hostname handling**: URL parsing, wildcards, IP literals and eTLD+1
//!   lookup against the public suffix list
//! - **Complements**: adding `mail.example.com` also records `example.com`
//!   and `*.example.com` so toggling a parent never flips the subdomain
//! - **Tri-state tree**: service → domain group → hostname, with
//!   Enabled / Disabled / PartlyEnabled aggregation
//! - **Two modes**: regular (listed hosts bypass the VPN) and selective
//!   (only listed hosts use it), each with its own list
//! - **Pluggable collaborators**: settings store, proxy and service catalog
//!   are traits with in-memory and file-backed implementations
//!
//! # Quick Start
//!
//! ```ignore
//! use k2bypass::{ExclusionsManager, MemoryProxyBypass, MemorySettingsStore, ServicesCatalog};
//! use std::sync::Arc;
//!
//! let manager = ExclusionsManager::new(
//!     Arc::new(ServicesCatalog::empty()),
//!     Arc::new(MemorySettingsStore::new()),
//!     Arc::new(MemoryProxyBypass::new()),
//! );
//! manager.init().await?;
//!
//! // Adds mail.example.com (enabled), example.com and *.example.com (disabled)
//! let added = manager.add_url_to_exclusions("https://mail.example.com/").await?;
//! assert_eq!(added, 3);
//! assert!(!manager.is_vpn_enabled_by_url("mail.example.com"));
//! ```
//!
//! # Modes
//!
//! - **Regular**: the bypass list holds the hosts that skip the VPN
//! - **Selective**: the list is inverted, listed hosts are the only ones
//!   routed through the VPN

mod error;

pub mod complement;
pub mod config;
pub mod exclusion;
pub mod handler;
pub mod hostname;
pub mod manager;
pub mod mode;
pub mod proxy;
pub mod services;
pub mod storage;
pub mod tree;

// Re-export core types
pub use error::{Error, Result};
pub use exclusion::{
    Exclusion, ExclusionState, ExclusionsData, ExclusionsGroup, PersistedExclusions, Service,
};
pub use mode::ExclusionsMode;

// Re-export the engine
pub use complement::complement;
pub use handler::{ExclusionsHandler, ToggleServicesResult};
pub use manager::{ExclusionsManager, ServiceStatus};
pub use tree::{ExclusionDto, ExclusionNode, ExclusionsTree, NodeKind, NodeType, ROOT_ID};

// Re-export collaborators
pub use config::ManagerConfig;
pub use proxy::{BypassList, BypassListFile, MemoryProxyBypass, ProxyBypass};
pub use services::{ServiceCategory, ServiceDto, ServicesCatalog, ServicesProvider};
pub use storage::{JsonFileSettingsStore, MemorySettingsStore, SettingsStore};

// Re-export hostname helpers
pub use hostname::{get_etld, get_hostname, init_public_suffix_list, is_ip};
