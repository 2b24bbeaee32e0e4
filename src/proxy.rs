//! Proxy bypass collaborator: receives the flattened hostname list.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Error, Result};

/// Configures traffic routing from a bypass list.
///
/// With `inverted == false` the hostnames bypass the VPN; with
/// `inverted == true` only the hostnames go through it.
#[async_trait]
pub trait ProxyBypass: Send + Sync {
    async fn set_bypass_list(&self, hostnames: &[String], inverted: bool) -> Result<()>;
}

/// A bypass list as last handed to the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassList {
    pub hostnames: Vec<String>,
    pub inverted: bool,
}

/// Proxy stand-in that records what it receives.
#[derive(Default)]
pub struct MemoryProxyBypass {
    last: Mutex<Option<BypassList>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryProxyBypass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted bypass list.
    pub fn last(&self) -> Option<BypassList> {
        self.last.lock().clone()
    }

    /// Number of accepted calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Reject every following call while set.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProxyBypass for MemoryProxyBypass {
    async fn set_bypass_list(&self, hostnames: &[String], inverted: bool) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Proxy("proxy rejected the bypass list".to_string()));
        }
        *self.last.lock() = Some(BypassList {
            hostnames: hostnames.to_vec(),
            inverted,
        });
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const INVERTED_HEADER: &str = "# mode: selective";
const REGULAR_HEADER: &str = "# mode: regular";

/// Writes the bypass list to a text file, one hostname per line.
///
/// The first line records whether the list is inverted.
pub struct BypassListFile {
    path: PathBuf,
}

impl BypassListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the bypass list file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render a bypass list in file form.
    pub fn render(hostnames: &[String], inverted: bool) -> String {
        let header = if inverted {
            INVERTED_HEADER
        } else {
            REGULAR_HEADER
        };
        let mut out = String::from(header);
        out.push('\n');
        for hostname in hostnames {
            out.push_str(hostname);
            out.push('\n');
        }
        out
    }

    /// Parse a bypass list written by [`BypassListFile`].
    pub fn parse(content: &str) -> BypassList {
        let mut list = BypassList::default();
        for line in content.lines().map(str::trim) {
            if line == INVERTED_HEADER {
                list.inverted = true;
            } else if !line.is_empty() && !line.starts_with('#') {
                list.hostnames.push(line.to_string());
            }
        }
        list
    }

    /// Read the file back.
    pub async fn read(&self) -> Result<BypassList> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(Self::parse(&content))
    }
}

#[async_trait]
impl ProxyBypass for BypassListFile {
    async fn set_bypass_list(&self, hostnames: &[String], inverted: bool) -> Result<()> {
        let content = Self::render(hostnames, inverted);
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| Error::Proxy(format!("{}: {}", self.path.display(), e)))?;
        log::debug!(
            "Wrote {} bypass hostnames to {}",
            hostnames.len(),
            self.path.display()
        );
        Ok(())
    }
}
