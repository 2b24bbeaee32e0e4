//! Complement generation: the sibling exclusions added with every hostname.
//!
//! Touching `mail.example.com` also records `example.com` and
//! `*.example.com` (disabled), so that toggling the parent domain later
//! never silently flips the subdomain the user set explicitly, and the
//! other way round.

use crate::error::{Error, Result};
use crate::exclusion::{Exclusion, ExclusionsGroup, Service};
use crate::hostname::{get_etld, get_subdomain, is_ip, is_wildcard, to_wildcard};

/// Derive the exclusions one hostname change implies.
///
/// The first entry is always `hostname` at `enabled`; the siblings are
/// disabled:
///
/// - IP literal: just the IP
/// - `example.com`: plus `*.example.com`
/// - `*.example.com`: plus `example.com`
/// - `mail.example.com`: plus `example.com` and `*.example.com`
///
/// Fails with [`Error::InvalidHostname`] when no eTLD can be determined.
pub fn complement(hostname: &str, enabled: bool) -> Result<Vec<Exclusion>> {
    if is_ip(hostname) {
        return Ok(vec![Exclusion::new(hostname, enabled)]);
    }

    let etld = get_etld(hostname).ok_or_else(|| Error::InvalidHostname(hostname.to_string()))?;
    Ok(complement_within(hostname, &etld, enabled))
}

/// Same as [`complement`], relative to a known base domain.
///
/// Service groups are keyed by the service's domain rather than by the
/// hostname's eTLD, so the base is given instead of computed.
pub fn complement_within(hostname: &str, base: &str, enabled: bool) -> Vec<Exclusion> {
    if is_ip(hostname) {
        return vec![Exclusion::new(hostname, enabled)];
    }

    let subdomain = get_subdomain(hostname, base);
    let touched = Exclusion::new(hostname, enabled);

    if subdomain.is_empty() {
        vec![touched, Exclusion::new(to_wildcard(base), false)]
    } else if is_wildcard(&subdomain) {
        vec![touched, Exclusion::new(base, false)]
    } else {
        vec![
            touched,
            Exclusion::new(base, false),
            Exclusion::new(to_wildcard(base), false),
        ]
    }
}

/// Merge the complement of `hostname` into the standalone group of its eTLD.
///
/// The group is created when missing. Nothing is touched when the
/// complement cannot be computed. Returns the number of exclusions added.
pub fn apply_to_groups(
    groups: &mut Vec<ExclusionsGroup>,
    hostname: &str,
    enabled: bool,
) -> Result<usize> {
    let exclusions = complement(hostname, enabled)?;
    let etld = get_etld(hostname).ok_or_else(|| Error::InvalidHostname(hostname.to_string()))?;

    match groups.iter_mut().find(|g| g.hostname == etld) {
        Some(group) => Ok(group.merge(exclusions)),
        None => {
            let mut group = ExclusionsGroup::empty(etld);
            let inserted = group.merge(exclusions);
            groups.push(group);
            Ok(inserted)
        }
    }
}

/// Apply a hostname change to a service.
///
/// Every domain of the service is first pre-populated disabled (existing
/// exclusions keep their state), then the complement of `hostname`
/// relative to its service domain is merged into that domain's group.
/// Returns the number of exclusions added.
pub fn apply_to_service(service: &mut Service, hostname: &str, enabled: bool) -> usize {
    let before = service.leaf_count();
    service.ensure_domains(false);

    if let Some(group) = service.group_for_hostname_mut(hostname) {
        let base = group.hostname.clone();
        group.merge(complement_within(hostname, &base, enabled));
    }

    service.leaf_count() - before
}
