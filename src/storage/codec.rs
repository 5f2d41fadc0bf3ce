//! JSON helpers shared by the zone, domain and sync code.

use super::error::StoreResult;
use crate::kv::client::{KeyValue, KvClient};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

pub async fn read_json<T: DeserializeOwned>(
    client: &dyn KvClient,
    key: &str,
) -> StoreResult<Option<T>> {
    match client.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn write_json<T: Serialize>(client: &dyn KvClient, key: &str, value: &T) -> StoreResult<()> {
    let raw = serde_json::to_string(value)?;
    client.put(key, &raw).await?;
    Ok(())
}

/// Decodes a prefix listing, skipping entries that fail to parse.
pub fn decode_listing<T: DeserializeOwned>(pairs: Vec<KeyValue>) -> Vec<T> {
    pairs
        .into_iter()
        .filter_map(|pair| match serde_json::from_str(&pair.value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping unreadable entry at {}: {}", pair.key, e);
                None
            }
        })
        .collect()
}
