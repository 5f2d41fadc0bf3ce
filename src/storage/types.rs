use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A DNS zone as stored in the management key space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub zone: String,
    /// Number of domains in the zone, recomputed after every domain create/delete.
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Zone {
    pub fn new(zone: &str) -> Self {
        let now = now_secs();
        Self {
            zone: zone.to_string(),
            record_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A named host inside a zone, mapping to a set of IP addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub zone: String,
    /// Label relative to the zone, e.g. `www`.
    pub domain: String,
    /// Fully-qualified name, `label.zone`.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub ttl: u32,
    /// Mirrors `ips.len()`.
    #[serde(default)]
    pub record_count: usize,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Domain {
    pub fn new(zone: &str, label: &str, ips: Vec<String>, ttl: u32) -> Self {
        let now = now_secs();
        Self {
            zone: zone.to_string(),
            domain: label.to_string(),
            name: full_name(label, zone),
            record_count: ips.len(),
            ips,
            ttl,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the IP set and TTL, keeping identity and creation time.
    pub fn revise(&self, ips: Vec<String>, ttl: u32) -> Self {
        Self {
            zone: self.zone.clone(),
            domain: self.domain.clone(),
            name: full_name(&self.domain, &self.zone),
            record_count: ips.len(),
            ips,
            ttl,
            created_at: self.created_at,
            updated_at: now_secs(),
        }
    }
}

/// One entry in the DNS server's key space. Unknown fields are ignored on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub host: String,
    #[serde(default)]
    pub ttl: u32,
}

impl ExternalRecord {
    pub fn new(host: &str, ttl: u32) -> Self {
        Self {
            host: host.to_string(),
            ttl,
        }
    }
}

/// What one synchronization pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Stale or duplicate record keys removed.
    pub deleted: Vec<String>,
    /// Record keys created for hosts that were missing.
    pub written: Vec<String>,
    /// Record keys rewritten in place because their TTL changed.
    pub refreshed: Vec<String>,
    /// Record keys left as they were.
    pub unchanged: usize,
}

impl SyncReport {
    /// True when the pass issued no writes or deletes.
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.written.is_empty() && self.refreshed.is_empty()
    }

    pub fn absorb(&mut self, other: SyncReport) {
        self.deleted.extend(other.deleted);
        self.written.extend(other.written);
        self.refreshed.extend(other.refreshed);
        self.unchanged += other.unchanged;
    }
}

/// Outcome of re-synchronizing every stored domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub domains: usize,
    pub failed: usize,
    pub changes: SyncReport,
}

pub fn full_name(label: &str, zone: &str) -> String {
    format!("{}.{}", label, zone)
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
