//! Record Synchronizer
//!
//! Converges the DNS-server records under one domain's prefix onto the domain's IP set
//! with the fewest writes: only stale entries are deleted, only missing hosts are
//! written, and matching entries keep their keys.
//!
//! ## Core Concepts
//! - **Projection**: Every entry directly under the domain's record prefix. Entries keyed
//!   `x<index>` are ordered by index; any other direct child still takes part in pruning.
//!   Deeper keys belong to other names and are never touched.
//! - **Positional allocation**: A missing host at position `i` of the desired list gets
//!   the lowest free index starting at `i + 1`. A candidate is free only when it is
//!   absent both from the keys this pass knows about and from a live read, so keys
//!   written by a concurrent writer (or held by unreadable values) are never overwritten.
//! - **Idempotence**: A second pass with the same IP set and TTL issues no writes.

use super::codec::write_json;
use super::error::StoreResult;
use super::keys::KeyLayout;
use super::types::{Domain, ExternalRecord, SyncReport};
use crate::kv::client::KvClient;

use std::collections::HashSet;
use tracing::{debug, warn};

/// A record this pass found under the domain's prefix.
#[derive(Debug)]
struct Existing {
    key: String,
    /// `None` for direct children not keyed `x<index>`.
    index: Option<u64>,
    record: ExternalRecord,
}

#[derive(Debug, Clone)]
pub struct RecordSynchronizer {
    layout: KeyLayout,
}

impl RecordSynchronizer {
    pub fn new(layout: KeyLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Runs one pass for `domain`. Errors abort the pass; whatever was already applied
    /// stays applied and the next pass picks up from there.
    pub async fn sync(&self, client: &dyn KvClient, domain: &Domain) -> StoreResult<SyncReport> {
        let prefix = self.layout.record_prefix(&domain.zone, &domain.domain);
        let existing = self.load_existing(client, &prefix).await?;
        let desired: HashSet<&str> = domain.ips.iter().map(String::as_str).collect();
        let mut report = SyncReport::default();

        // Prune: hosts no longer wanted, then repeats of a host already kept at a lower index.
        let mut kept = Vec::with_capacity(existing.len());
        let mut kept_hosts = HashSet::new();
        for entry in existing {
            let stale = !desired.contains(entry.record.host.as_str());
            if stale || !kept_hosts.insert(entry.record.host.clone()) {
                client.delete(&entry.key).await?;
                debug!(
                    "Deleted {} record {} (host {})",
                    if stale { "stale" } else { "duplicate" },
                    entry.key,
                    entry.record.host
                );
                report.deleted.push(entry.key);
            } else {
                kept.push(entry);
            }
        }

        // Entries whose host survives keep their key; only the TTL may need a rewrite.
        for entry in &kept {
            if entry.record.ttl == domain.ttl {
                report.unchanged += 1;
                continue;
            }
            let record = ExternalRecord::new(&entry.record.host, domain.ttl);
            write_json(client, &entry.key, &record).await?;
            debug!(
                "Refreshed TTL of {} from {} to {}",
                entry.key, entry.record.ttl, domain.ttl
            );
            report.refreshed.push(entry.key.clone());
        }

        let mut occupied: HashSet<String> = kept.iter().map(|entry| entry.key.clone()).collect();
        for (position, host) in domain.ips.iter().enumerate() {
            if kept_hosts.contains(host) {
                continue;
            }
            let key = self
                .allocate(client, domain, position as u64 + 1, &occupied)
                .await?;
            write_json(client, &key, &ExternalRecord::new(host, domain.ttl)).await?;
            debug!("Wrote record {} -> {}", key, host);

            occupied.insert(key.clone());
            kept_hosts.insert(host.clone());
            report.written.push(key);
        }

        if !report.is_noop() {
            debug!(
                "Synchronized {}: {} deleted, {} written, {} refreshed",
                domain.name,
                report.deleted.len(),
                report.written.len(),
                report.refreshed.len()
            );
        }

        Ok(report)
    }

    /// Lists the projection of one domain, ordered by index; unindexed entries come last.
    ///
    /// Keys deeper than the direct children are ignored. Entries that do not
    /// decode are skipped with a warning; their keys stay occupied because allocation
    /// double-checks every candidate against the store.
    pub async fn list_records(
        &self,
        client: &dyn KvClient,
        zone: &str,
        label: &str,
    ) -> StoreResult<Vec<(String, ExternalRecord)>> {
        let prefix = self.layout.record_prefix(zone, label);
        let existing = self.load_existing(client, &prefix).await?;
        Ok(existing
            .into_iter()
            .map(|entry| (entry.key, entry.record))
            .collect())
    }

    async fn load_existing(&self, client: &dyn KvClient, prefix: &str) -> StoreResult<Vec<Existing>> {
        let mut existing = Vec::new();
        for pair in client.list_prefix(prefix).await? {
            if !self.layout.is_direct_child(prefix, &pair.key) {
                continue;
            }
            let index = self.layout.record_index(prefix, &pair.key);
            match serde_json::from_str::<ExternalRecord>(&pair.value) {
                Ok(record) => existing.push(Existing {
                    key: pair.key,
                    index,
                    record,
                }),
                Err(e) => warn!("Ignoring unreadable record at {}: {}", pair.key, e),
            }
        }
        existing.sort_by_key(|entry| entry.index.unwrap_or(u64::MAX));
        Ok(existing)
    }

    async fn allocate(
        &self,
        client: &dyn KvClient,
        domain: &Domain,
        start: u64,
        occupied: &HashSet<String>,
    ) -> StoreResult<String> {
        let mut index = start;
        loop {
            let key = self.layout.record_key(&domain.zone, &domain.domain, index);
            if !occupied.contains(&key) && client.get(&key).await?.is_none() {
                return Ok(key);
            }
            index += 1;
        }
    }
}
