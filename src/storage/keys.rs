//! Key-space layout.
//!
//! | Entity | Key |
//! |---|---|
//! | Zone | `ZONE_KEY_PREFIX` + zone |
//! | Domain | `DOMAIN_KEY_PREFIX` + zone + `/` + label |
//! | DNS record | dns root + reversed(zone) + `/` + label + `/x` + index |
//!
//! The record layout is shared with the DNS server and must not change.

use crate::config::types::DEFAULT_DNS_ROOT;

pub const ZONE_KEY_PREFIX: &str = "/dancer/zones/";
pub const DOMAIN_KEY_PREFIX: &str = "/dancer/domains/";

/// Separator in front of the positional index of a record key.
pub const RECORD_INDEX_MARKER: char = 'x';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    dns_root: String,
}

impl KeyLayout {
    /// `dns_root` is normalized to end with exactly one `/`; empty means the default root.
    pub fn new(dns_root: &str) -> Self {
        let trimmed = dns_root.trim().trim_end_matches('/');
        let root = if trimmed.is_empty() {
            DEFAULT_DNS_ROOT.trim_end_matches('/')
        } else {
            trimmed
        };

        Self {
            dns_root: format!("{}/", root),
        }
    }

    pub fn dns_root(&self) -> &str {
        &self.dns_root
    }

    pub fn zone_key(&self, zone: &str) -> String {
        format!("{}{}", ZONE_KEY_PREFIX, zone)
    }

    pub fn domain_key(&self, zone: &str, label: &str) -> String {
        format!("{}{}/{}", DOMAIN_KEY_PREFIX, zone, label)
    }

    /// Prefix of every domain key of `zone`, trailing slash included.
    pub fn domain_prefix(&self, zone: &str) -> String {
        format!("{}{}/", DOMAIN_KEY_PREFIX, zone)
    }

    /// Prefix of the DNS records of one domain, trailing slash included.
    pub fn record_prefix(&self, zone: &str, label: &str) -> String {
        format!("{}{}/{}/", self.dns_root, reverse_zone(zone), label)
    }

    pub fn record_key(&self, zone: &str, label: &str, index: u64) -> String {
        format!(
            "{}{}{}",
            self.record_prefix(zone, label),
            RECORD_INDEX_MARKER,
            index
        )
    }

    /// Whether `key` sits directly under `prefix`. Deeper keys belong to other names that
    /// share the path, such as a child zone.
    pub fn is_direct_child(&self, prefix: &str, key: &str) -> bool {
        key.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    }

    /// Positional index of a record key sitting directly under `prefix`.
    ///
    /// Deeper keys, `x0` and direct children not shaped `x<digits>` yield `None`.
    pub fn record_index(&self, prefix: &str, key: &str) -> Option<u64> {
        let digits = key
            .strip_prefix(prefix)?
            .strip_prefix(RECORD_INDEX_MARKER)?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        digits.parse().ok().filter(|index| *index > 0)
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_ROOT)
    }
}

/// Zone names and domain labels become key segments: they must be non-empty and
/// must not contain `/`.
pub fn is_valid_segment(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('/')
}

/// `example.com` -> `com/example`. Empty labels (a trailing dot) are dropped.
pub fn reverse_zone(zone: &str) -> String {
    zone.split('.')
        .filter(|label| !label.is_empty())
        .rev()
        .collect::<Vec<_>>()
        .join("/")
}
