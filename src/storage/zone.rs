use super::codec::{decode_listing, read_json, write_json};
use super::domain::DomainStorage;
use super::error::{StoreError, StoreResult};
use super::keys::{ZONE_KEY_PREFIX, is_valid_segment};
use super::types::{Zone, now_secs};
use crate::kv::client::KvClient;

use std::sync::Arc;
use tracing::info;

/// Zone metadata. Deleting a zone cascades through `DomainStorage`.
pub struct ZoneStorage {
    domains: Arc<DomainStorage>,
}

impl ZoneStorage {
    pub fn new(domains: Arc<DomainStorage>) -> Self {
        Self { domains }
    }

    pub fn domains(&self) -> &Arc<DomainStorage> {
        &self.domains
    }

    /// All zones. Entries that fail to decode are skipped.
    pub async fn list_zones(&self) -> StoreResult<Vec<Zone>> {
        let client = self.domains.client().await?;
        Ok(decode_listing(client.list_prefix(ZONE_KEY_PREFIX).await?))
    }

    pub async fn get_zone(&self, zone: &str) -> StoreResult<Zone> {
        let client = self.domains.client().await?;
        self.load_zone(client.as_ref(), zone).await
    }

    pub async fn zone_exists(&self, zone: &str) -> StoreResult<bool> {
        let client = self.domains.client().await?;
        let found = client.get(&self.domains.layout().zone_key(zone)).await?;
        Ok(found.is_some())
    }

    pub async fn create_zone(&self, zone: &str) -> StoreResult<Zone> {
        if !is_valid_segment(zone) {
            return Err(StoreError::InvalidName(zone.to_string()));
        }
        let client = self.domains.client().await?;

        let key = self.domains.layout().zone_key(zone);
        if client.get(&key).await?.is_some() {
            return Err(StoreError::ZoneExists(zone.to_string()));
        }

        let created = Zone::new(zone);
        write_json(client.as_ref(), &key, &created).await?;

        info!("Created zone {}", zone);
        Ok(created)
    }

    /// Touches `updated_at`. The name itself is immutable.
    pub async fn update_zone(&self, zone: &str) -> StoreResult<Zone> {
        let client = self.domains.client().await?;
        let mut stored = self.load_zone(client.as_ref(), zone).await?;
        stored.updated_at = now_secs();
        write_json(client.as_ref(), &self.domains.layout().zone_key(zone), &stored).await?;
        Ok(stored)
    }

    /// Overwrites the cached domain count of a zone.
    pub async fn set_record_count(&self, zone: &str, count: u64) -> StoreResult<Zone> {
        let client = self.domains.client().await?;
        let mut stored = self.load_zone(client.as_ref(), zone).await?;
        stored.record_count = count;
        write_json(client.as_ref(), &self.domains.layout().zone_key(zone), &stored).await?;
        Ok(stored)
    }

    /// Deletes the zone key, then every domain of the zone with its records.
    pub async fn delete_zone(&self, zone: &str) -> StoreResult<()> {
        let client = self.domains.client().await?;
        let key = self.domains.layout().zone_key(zone);
        if client.get(&key).await?.is_none() {
            return Err(StoreError::ZoneNotFound(zone.to_string()));
        }

        client.delete(&key).await?;
        let domains = self.domains.purge_zone(client.as_ref(), zone).await?;

        info!("Deleted zone {} with {} domain(s)", zone, domains);
        Ok(())
    }

    async fn load_zone(&self, client: &dyn KvClient, zone: &str) -> StoreResult<Zone> {
        read_json(client, &self.domains.layout().zone_key(zone))
            .await?
            .ok_or_else(|| StoreError::ZoneNotFound(zone.to_string()))
    }
}
