//! Public suffix lookups for eTLD+1 extraction.
//!
//! A subset of the Public Suffix List is compiled into the crate and parsed
//! on first use. Applications that ship the full list install it once at
//! startup with [`init_public_suffix_list`] or
//! [`init_public_suffix_list_from_file`].
//!
//! # Examples
//!
//! ```
//! use k2bypass::hostname::get_etld;
//!
//! assert_eq!(get_etld("mail.example.com").as_deref(), Some("example.com"));
//! assert_eq!(get_etld("sub.example.co.uk").as_deref(), Some("example.co.uk"));
//! assert_eq!(get_etld("8.8.8.8").as_deref(), Some("8.8.8.8"));
//! ```

use once_cell::sync::{Lazy, OnceCell};
use publicsuffix::{List, Psl};
use std::path::Path;

use super::{is_ip, WILDCARD_PREFIX};
use crate::error::{Error, Result};

const BUNDLED_LIST: &str = include_str!("../../data/public_suffix_list.dat");

/// Suffix list compiled into the crate.
static BUNDLED: Lazy<List> = Lazy::new(|| {
    BUNDLED_LIST
        .parse()
        .expect("bundled public suffix list must parse")
});

/// Full list installed by the application, takes precedence over the bundled one.
static INSTALLED: OnceCell<List> = OnceCell::new();

fn list() -> &'static List {
    INSTALLED.get().unwrap_or(&BUNDLED)
}

/// Install a full public suffix list from its text form.
///
/// This should be called once at startup, before the first lookup that
/// needs it.
pub fn init_public_suffix_list(text: &str) -> Result<()> {
    let parsed: List = text
        .parse()
        .map_err(|e| Error::SuffixList(format!("{:?}", e)))?;

    INSTALLED
        .set(parsed)
        .map_err(|_| Error::SuffixList("public suffix list already initialized".to_string()))?;

    log::info!("Installed public suffix list ({} bytes)", text.len());
    Ok(())
}

/// Install a full public suffix list from a `public_suffix_list.dat` file.
pub fn init_public_suffix_list_from_file(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    init_public_suffix_list(&text)
}

/// Whether a full list has been installed.
pub fn is_public_suffix_list_installed() -> bool {
    INSTALLED.get().is_some()
}

fn normalize(hostname: &str) -> Option<String> {
    let host = hostname.trim().trim_end_matches('.').to_lowercase();
    if host.is_empty() || host.split('.').any(|label| label.is_empty()) {
        return None;
    }
    Some(host)
}

/// Whether the hostname is itself a listed public suffix (`com`, `co.uk`).
pub fn is_public_suffix(hostname: &str) -> bool {
    let host = match normalize(hostname) {
        Some(h) => h,
        None => return false,
    };

    match list().suffix(host.as_bytes()) {
        Some(suffix) => suffix.is_known() && suffix.as_bytes() == host.as_bytes(),
        None => false,
    }
}

/// Get the public suffix part of a hostname (`co.uk` for `a.example.co.uk`).
pub fn get_public_suffix(hostname: &str) -> Option<String> {
    let host = normalize(hostname)?;
    let suffix = list().suffix(host.as_bytes())?;
    std::str::from_utf8(suffix.as_bytes()).ok().map(str::to_string)
}

/// Get the eTLD+1 (registrable domain) for a hostname.
///
/// - IP literals are returned unchanged.
/// - A hostname that is itself a public suffix is returned unchanged.
/// - A wildcard is resolved on the hostname it covers, so `*.com` gives
///   `com` and `*.example.com` gives `example.com`.
/// - Otherwise the trailing labels are tried one more at a time until they
///   form a registrable domain.
///
/// Returns `None` when no registrable domain exists (`localhost`).
pub fn get_etld(hostname: &str) -> Option<String> {
    if is_ip(hostname) {
        return Some(hostname.to_string());
    }

    let host = normalize(hostname)?;
    let host = if host.starts_with(WILDCARD_PREFIX) {
        host[WILDCARD_PREFIX.len()..].to_string()
    } else {
        host
    };
    if is_public_suffix(&host) {
        return Some(host);
    }

    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();
    for count in 1..=n {
        let candidate = labels[n - count..].join(".");
        if let Some(domain) = list().domain(candidate.as_bytes()) {
            if let Ok(domain) = std::str::from_utf8(domain.as_bytes()) {
                return Some(domain.to_string());
            }
        }
    }

    None
}
