//! Fast-tier key/value cache (C4's cache half): session tokens and
//! per-user session-id sets live here with a TTL, backed by Redis in
//! production and an in-process map in tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use pf_errors::Error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

/// The operations the session and import-queue layers need from a
/// key/value store: get/set with TTL, delete, and set-membership helpers
/// for the per-user session index.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;
    async fn delete(&self, key: &str) -> Result<(), Error>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), Error>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Error>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, Error>;
}

#[async_trait]
impl<T: KeyValueCache + ?Sized> KeyValueCache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        (**self).get(key).await
    }
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        (**self).set_with_ttl(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<(), Error> {
        (**self).delete(key).await
    }
    async fn set_add(&self, key: &str, member: &str) -> Result<(), Error> {
        (**self).set_add(key, member).await
    }
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Error> {
        (**self).set_remove(key, member).await
    }
    async fn set_members(&self, key: &str) -> Result<Vec<String>, Error> {
        (**self).set_members(key).await
    }
}

/// Redis-backed cache using a multiplexed [`ConnectionManager`], which
/// auto-reconnects on connection loss the way a long-lived session
/// store needs to survive a Redis restart mid-process.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::internal(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::internal(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| Error::internal(format!("cache get({key}): {e}")))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| Error::internal(format!("cache set({key}): {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::internal(format!("cache del({key}): {e}")))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| Error::internal(format!("cache sadd({key}): {e}")))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| Error::internal(format!("cache srem({key}): {e}")))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.conn.clone();
        conn.smembers(key)
            .await
            .map_err(|e| Error::internal(format!("cache smembers({key}): {e}")))
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process stand-in for [`RedisCache`] used by tests — a plain
/// `HashMap` with lazily-checked expiry, plus a second map of string
/// sets for the `set_*` family.
#[derive(Default)]
pub struct InMemoryCache {
    values: Mutex<HashMap<String, Entry>>,
    sets: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        match values.get(key) {
            Some(entry) if entry.expires_at.map_or(true, |at| Instant::now() < at) => {
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), Error> {
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        let members = sets.entry(key.to_string()).or_default();
        if !members.iter().any(|m| m == member) {
            members.push(member.to_string());
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Error> {
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(members) = sets.get_mut(key) {
            members.retain(|m| m != member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .sets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("k", "v", Duration::from_millis(10)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_add_is_idempotent() {
        let cache = InMemoryCache::new();
        cache.set_add("sessions:user1", "s1").await.unwrap();
        cache.set_add("sessions:user1", "s1").await.unwrap();
        cache.set_add("sessions:user1", "s2").await.unwrap();
        let mut members = cache.set_members("sessions:user1").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["s1".to_string(), "s2".to_string()]);
    }
}
