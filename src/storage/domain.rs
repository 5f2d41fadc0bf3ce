use super::codec::{decode_listing, read_json, write_json};
use super::error::{StoreError, StoreResult};
use super::keys::{DOMAIN_KEY_PREFIX, KeyLayout, is_valid_segment};
use super::sync::RecordSynchronizer;
use super::types::{Domain, ExternalRecord, ResyncSummary, SyncReport, Zone, full_name};
use crate::connection::manager::ConnectionManager;
use crate::kv::client::KvClient;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an operation waits for a store connection before giving up.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Domain metadata plus the DNS-server records projected from it.
pub struct DomainStorage {
    connection: Arc<ConnectionManager>,
    layout: KeyLayout,
    synchronizer: RecordSynchronizer,
    wait_timeout: Duration,
}

impl DomainStorage {
    pub fn new(connection: Arc<ConnectionManager>, layout: KeyLayout) -> Self {
        Self {
            connection,
            synchronizer: RecordSynchronizer::new(layout.clone()),
            layout,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Domains of `zone`. Entries that fail to decode are skipped.
    pub async fn list_domains_by_zone(&self, zone: &str) -> StoreResult<Vec<Domain>> {
        let client = self.client().await?;
        let pairs = client.list_prefix(&self.layout.domain_prefix(zone)).await?;
        Ok(decode_listing(pairs))
    }

    pub async fn get_domain(&self, zone: &str, label: &str) -> StoreResult<Domain> {
        let client = self.client().await?;
        self.load_domain(client.as_ref(), zone, label).await
    }

    pub async fn domain_exists(&self, zone: &str, label: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let found = client.get(&self.layout.domain_key(zone, label)).await?;
        Ok(found.is_some())
    }

    pub async fn domain_count_by_zone(&self, zone: &str) -> StoreResult<u64> {
        let client = self.client().await?;
        Ok(client.count_prefix(&self.layout.domain_prefix(zone)).await?)
    }

    /// Creates a domain in an existing zone and projects its records.
    pub async fn create_domain(
        &self,
        zone: &str,
        label: &str,
        ips: Vec<String>,
        ttl: u32,
    ) -> StoreResult<Domain> {
        validate_names(zone, label)?;
        let client = self.client().await?;
        self.require_zone(client.as_ref(), zone).await?;

        let key = self.layout.domain_key(zone, label);
        if client.get(&key).await?.is_some() {
            return Err(StoreError::DomainExists(full_name(label, zone)));
        }

        let domain = Domain::new(zone, label, ips, ttl);
        write_json(client.as_ref(), &key, &domain).await?;
        self.synchronizer.sync(client.as_ref(), &domain).await?;
        self.refresh_record_count(client.as_ref(), zone).await;

        info!("Created domain {} with {} address(es)", domain.name, domain.ips.len());
        Ok(domain)
    }

    /// Replaces the IP set. A missing or zero `ttl` keeps the stored TTL.
    pub async fn update_domain(
        &self,
        zone: &str,
        label: &str,
        ips: Vec<String>,
        ttl: Option<u32>,
    ) -> StoreResult<Domain> {
        validate_names(zone, label)?;
        let client = self.client().await?;
        self.require_zone(client.as_ref(), zone).await?;

        let current = self.load_domain(client.as_ref(), zone, label).await?;
        let ttl = ttl.filter(|ttl| *ttl > 0).unwrap_or(current.ttl);
        let domain = current.revise(ips, ttl);

        write_json(client.as_ref(), &self.layout.domain_key(zone, label), &domain).await?;
        let report = self.synchronizer.sync(client.as_ref(), &domain).await?;

        info!(
            "Updated domain {} ({} deleted, {} written, {} refreshed)",
            domain.name,
            report.deleted.len(),
            report.written.len(),
            report.refreshed.len()
        );
        Ok(domain)
    }

    /// Deletes a domain together with every record under its prefix.
    pub async fn delete_domain(&self, zone: &str, label: &str) -> StoreResult<()> {
        validate_names(zone, label)?;
        let client = self.client().await?;
        self.require_zone(client.as_ref(), zone).await?;

        let key = self.layout.domain_key(zone, label);
        if client.get(&key).await?.is_none() {
            return Err(StoreError::DomainNotFound(full_name(label, zone)));
        }

        let records = client
            .delete_prefix(&self.layout.record_prefix(zone, label))
            .await?;
        client.delete(&key).await?;
        self.refresh_record_count(client.as_ref(), zone).await;

        info!("Deleted domain {} and {} record(s)", full_name(label, zone), records);
        Ok(())
    }

    /// Deletes every domain of `zone` and their records. Returns the number of domains.
    ///
    /// Domain keys go first, then the records of every label listed beforehand. Labels
    /// come from the keys, so domains whose metadata no longer decodes still get their
    /// records removed.
    pub async fn delete_domains_by_zone(&self, zone: &str) -> StoreResult<usize> {
        let client = self.client().await?;
        let removed = self.purge_zone(client.as_ref(), zone).await?;
        self.refresh_record_count(client.as_ref(), zone).await;
        Ok(removed)
    }

    /// The DNS-server records currently projected for one domain.
    pub async fn list_records(&self, zone: &str, label: &str) -> StoreResult<Vec<(String, ExternalRecord)>> {
        let client = self.client().await?;
        self.synchronizer.list_records(client.as_ref(), zone, label).await
    }

    /// Re-runs synchronization for one stored domain.
    pub async fn resync_domain(&self, zone: &str, label: &str) -> StoreResult<SyncReport> {
        let client = self.client().await?;
        let domain = self.load_domain(client.as_ref(), zone, label).await?;
        self.synchronizer.sync(client.as_ref(), &domain).await
    }

    /// Re-runs synchronization for every stored domain.
    ///
    /// A domain that fails to sync is logged and counted; the pass moves on to the next.
    pub async fn resync_all(&self) -> StoreResult<ResyncSummary> {
        let client = self.client().await?;
        let domains: Vec<Domain> = decode_listing(client.list_prefix(DOMAIN_KEY_PREFIX).await?);

        let mut summary = ResyncSummary::default();
        for domain in domains {
            match self.synchronizer.sync(client.as_ref(), &domain).await {
                Ok(report) => {
                    summary.domains += 1;
                    summary.changes.absorb(report);
                }
                Err(e) => {
                    warn!("Failed to resync domain {}: {}", domain.name, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Resynced {} domain(s): {} deleted, {} written, {} refreshed, {} failed",
            summary.domains,
            summary.changes.deleted.len(),
            summary.changes.written.len(),
            summary.changes.refreshed.len(),
            summary.failed
        );
        Ok(summary)
    }

    pub(crate) async fn client(&self) -> StoreResult<Arc<dyn KvClient>> {
        Ok(self.connection.ready_client(self.wait_timeout).await?)
    }

    pub(crate) async fn purge_zone(&self, client: &dyn KvClient, zone: &str) -> StoreResult<usize> {
        let prefix = self.layout.domain_prefix(zone);
        let labels: Vec<String> = client
            .list_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|pair| pair.key.strip_prefix(&prefix).map(str::to_string))
            .collect();

        client.delete_prefix(&prefix).await?;
        for label in &labels {
            client
                .delete_prefix(&self.layout.record_prefix(zone, label))
                .await?;
        }

        debug!("Purged {} domain(s) of zone {}", labels.len(), zone);
        Ok(labels.len())
    }

    async fn load_domain(&self, client: &dyn KvClient, zone: &str, label: &str) -> StoreResult<Domain> {
        read_json(client, &self.layout.domain_key(zone, label))
            .await?
            .ok_or_else(|| StoreError::DomainNotFound(full_name(label, zone)))
    }

    async fn require_zone(&self, client: &dyn KvClient, zone: &str) -> StoreResult<()> {
        match client.get(&self.layout.zone_key(zone)).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::ZoneNotFound(zone.to_string())),
        }
    }

    /// Stores the current domain count on the zone. Failures are logged, not returned:
    /// the domain change they follow has already been applied.
    async fn refresh_record_count(&self, client: &dyn KvClient, zone: &str) {
        if let Err(e) = self.store_record_count(client, zone).await {
            warn!("Failed to update record count of zone {}: {}", zone, e);
        }
    }

    async fn store_record_count(&self, client: &dyn KvClient, zone: &str) -> StoreResult<()> {
        let count = client.count_prefix(&self.layout.domain_prefix(zone)).await?;
        let key = self.layout.zone_key(zone);
        let Some(mut stored) = read_json::<Zone>(client, &key).await? else {
            return Ok(());
        };
        if stored.record_count != count {
            stored.record_count = count;
            write_json(client, &key, &stored).await?;
        }
        Ok(())
    }
}

fn validate_names(zone: &str, label: &str) -> StoreResult<()> {
    for name in [zone, label] {
        if !is_valid_segment(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
    }
    Ok(())
}
