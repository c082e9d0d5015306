use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const VALIDATION_TTL: Duration = Duration::from_secs(3600);
pub const PROBLEMS_LIST_TTL: Duration = Duration::from_secs(300);

const PROBLEMS_LIST_PREFIX: &str = "problems_list:";

pub fn key_validation(id: Uuid) -> String {
    format!("validation:{id}")
}

pub fn key_problems_list(limit: i64) -> String {
    format!("{PROBLEMS_LIST_PREFIX}{limit}")
}

struct Entry {
    value: JsonValue,
    expires_at: Instant,
}

/// In-process key/value cache with a TTL per entry. Expired entries read as
/// absent; they are dropped when read and on every write.
#[derive(Default)]
pub struct TtlCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<JsonValue> {
        let now = Instant::now();
        {
            let map = self.entries.read().await;
            match map.get(key) {
                Some(e) if e.expires_at > now => return Some(e.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // expired
        let mut map = self.entries.write().await;
        if map.get(key).is_some_and(|e| e.expires_at <= now) {
            map.remove(key);
        }
        None
    }

    /// Inserts `value` and sweeps every expired entry, so keys that are never
    /// read again do not pile up.
    pub async fn set(&self, key: impl Into<String>, value: JsonValue, ttl: Duration) {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        map.retain(|_, e| e.expires_at > now);
        map.insert(key.into(), Entry { value, expires_at: now + ttl });
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn delete_prefix(&self, prefix: &str) -> usize {
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|k, _| !k.starts_with(prefix));
        before - map.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drops the cached status for `id` and every cached problem listing.
    pub async fn invalidate_problem(&self, id: Uuid) {
        self.delete(&key_validation(id)).await;
        self.invalidate_lists().await;
    }

    pub async fn invalidate_lists(&self) {
        self.delete_prefix(PROBLEMS_LIST_PREFIX).await;
    }
}
