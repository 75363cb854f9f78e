//! The `SessionStore` façade (§4.4): the operations C5 calls, each one
//! coordinating the durable tier and the fast cache.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_cache::KeyValueCache;
use pf_errors::Error;
use pf_primitives::SessionId;
use tracing::warn;

use crate::model::{NewSession, Session};

#[async_trait]
pub trait DurableSessionRepository: Send + Sync {
    async fn insert(&self, session: NewSession) -> Result<Session, Error>;
    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>, Error>;
    async fn revoke(&self, session_id: SessionId) -> Result<(), Error>;
    async fn touch_last_active(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), Error>;

    /// Rows whose `expires_at` is already in the past — the sweeper's feed.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Session>, Error>;
    async fn delete(&self, session_id: SessionId) -> Result<(), Error>;
}

#[async_trait]
impl<T: DurableSessionRepository + ?Sized> DurableSessionRepository for Arc<T> {
    async fn insert(&self, session: NewSession) -> Result<Session, Error> {
        (**self).insert(session).await
    }
    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>, Error> {
        (**self).find_by_id(session_id).await
    }
    async fn revoke(&self, session_id: SessionId) -> Result<(), Error> {
        (**self).revoke(session_id).await
    }
    async fn touch_last_active(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), Error> {
        (**self).touch_last_active(session_id, at).await
    }
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Session>, Error> {
        (**self).find_expired(now).await
    }
    async fn delete(&self, session_id: SessionId) -> Result<(), Error> {
        (**self).delete(session_id).await
    }
}

fn token_key(session_id: SessionId) -> String {
    format!("session:{session_id}")
}

fn user_sessions_key(user_email: &str) -> String {
    format!("user_sessions:{user_email}")
}

/// Coordinates a [`DurableSessionRepository`] (source of truth) with a
/// [`KeyValueCache`] (latency tier). Every write goes to the durable
/// tier first; the cache is best-effort and a miss always falls through.
pub struct SessionStore<R, C> {
    durable: R,
    cache: C,
}

impl<R, C> SessionStore<R, C>
where
    R: DurableSessionRepository,
    C: KeyValueCache,
{
    pub fn new(durable: R, cache: C) -> Self {
        Self { durable, cache }
    }

    /// Durable write first, then best-effort cache population — if the
    /// cache write fails the session is still valid because the durable
    /// tier is the source of truth (§4.4).
    pub async fn add_session(
        &self,
        user_email: &str,
        new_session: NewSession,
    ) -> Result<Session, Error> {
        let session = self.durable.insert(new_session).await?;
        let ttl = (session.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        if let Err(e) = self
            .cache
            .set_with_ttl(&token_key(session.session_id), &session.token, ttl)
            .await
        {
            warn!(session_id = %session.session_id, error = %e, "session cache write failed, durable tier remains authoritative");
        }
        if let Err(e) = self
            .cache
            .set_add(&user_sessions_key(user_email), &session.session_id.to_string())
            .await
        {
            warn!(session_id = %session.session_id, error = %e, "user_sessions cache write failed");
        }

        Ok(session)
    }

    /// Consults the cache first; on miss, falls through to the durable
    /// tier and repopulates the cache.
    pub async fn session_exists(&self, session_id: SessionId) -> Result<bool, Error> {
        if self.cache.get(&token_key(session_id)).await?.is_some() {
            return Ok(true);
        }

        let Some(session) = self.durable.find_by_id(session_id).await? else {
            return Ok(false);
        };
        if session.revoked || session.expires_at <= Utc::now() {
            return Ok(false);
        }

        let ttl = (session.expires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let _ = self
            .cache
            .set_with_ttl(&token_key(session.session_id), &session.token, ttl)
            .await;
        Ok(true)
    }

    pub async fn get_session_token(&self, session_id: SessionId) -> Result<Option<String>, Error> {
        if let Some(token) = self.cache.get(&token_key(session_id)).await? {
            return Ok(Some(token));
        }
        Ok(self
            .durable
            .find_by_id(session_id)
            .await?
            .filter(|s| !s.revoked && s.expires_at > Utc::now())
            .map(|s| s.token))
    }

    pub async fn remove_session(&self, user_email: &str, session_id: SessionId) -> Result<(), Error> {
        self.durable.revoke(session_id).await?;
        let _ = self.cache.delete(&token_key(session_id)).await;
        let _ = self
            .cache
            .set_remove(&user_sessions_key(user_email), &session_id.to_string())
            .await;
        Ok(())
    }

    /// Best-effort: failures are logged, never surfaced (§4.4).
    pub async fn update_session_activity(&self, session_id: SessionId) {
        if let Err(e) = self.durable.touch_last_active(session_id, Utc::now()).await {
            warn!(session_id = %session_id, error = %e, "failed to update session last_active_at");
        }
    }

    pub fn durable(&self) -> &R {
        &self.durable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_cache::InMemoryCache;
    use pf_primitives::UserId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDurable {
        sessions: Mutex<Vec<Session>>,
    }

    #[async_trait]
    impl DurableSessionRepository for FakeDurable {
        async fn insert(&self, new_session: NewSession) -> Result<Session, Error> {
            let session = Session {
                session_id: new_session.session_id,
                user_id: new_session.user_id,
                token: new_session.token,
                device_name: new_session.device_name,
                device_type: new_session.device_type,
                ip_address: new_session.ip_address,
                user_agent: new_session.user_agent,
                created_at: Utc::now(),
                last_active_at: Utc::now(),
                expires_at: new_session.expires_at,
                revoked: false,
            };
            self.sessions.lock().unwrap().push(session.clone());
            Ok(session)
        }

        async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>, Error> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.session_id == session_id)
                .cloned())
        }

        async fn revoke(&self, session_id: SessionId) -> Result<(), Error> {
            if let Some(s) = self.sessions.lock().unwrap().iter_mut().find(|s| s.session_id == session_id) {
                s.revoked = true;
            }
            Ok(())
        }

        async fn touch_last_active(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), Error> {
            if let Some(s) = self.sessions.lock().unwrap().iter_mut().find(|s| s.session_id == session_id) {
                s.last_active_at = at;
            }
            Ok(())
        }

        async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Session>, Error> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.expires_at < now)
                .cloned()
                .collect())
        }

        async fn delete(&self, session_id: SessionId) -> Result<(), Error> {
            self.sessions.lock().unwrap().retain(|s| s.session_id != session_id);
            Ok(())
        }
    }

    fn new_session(user_id: UserId) -> NewSession {
        NewSession {
            session_id: SessionId::new(),
            user_id,
            token: "tok-abc".into(),
            device_name: "iPhone".into(),
            device_type: "mobile".into(),
            ip_address: None,
            user_agent: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn multi_device_login_and_single_logout() {
        let store = SessionStore::new(FakeDurable::default(), InMemoryCache::new());
        let user_id = UserId::new();

        let a = store.add_session("u@x.com", new_session(user_id)).await.unwrap();
        let b = store.add_session("u@x.com", new_session(user_id)).await.unwrap();

        assert!(store.session_exists(a.session_id).await.unwrap());
        assert!(store.session_exists(b.session_id).await.unwrap());

        store.remove_session("u@x.com", a.session_id).await.unwrap();

        assert!(!store.session_exists(a.session_id).await.unwrap());
        assert!(store.session_exists(b.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn cache_miss_falls_through_to_durable_tier() {
        let store = SessionStore::new(FakeDurable::default(), InMemoryCache::new());
        let user_id = UserId::new();
        let session = store.add_session("u@x.com", new_session(user_id)).await.unwrap();

        // Simulate an evicted cache entry: a fresh store sharing the durable tier.
        let durable = store.durable();
        let fresh_cache = SessionStore::new(
            FakeDurableRef(durable),
            InMemoryCache::new(),
        );
        assert!(fresh_cache.session_exists(session.session_id).await.unwrap());
    }

    struct FakeDurableRef<'a>(&'a FakeDurable);

    #[async_trait]
    impl<'a> DurableSessionRepository for FakeDurableRef<'a> {
        async fn insert(&self, new_session: NewSession) -> Result<Session, Error> {
            self.0.insert(new_session).await
        }
        async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>, Error> {
            self.0.find_by_id(session_id).await
        }
        async fn revoke(&self, session_id: SessionId) -> Result<(), Error> {
            self.0.revoke(session_id).await
        }
        async fn touch_last_active(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), Error> {
            self.0.touch_last_active(session_id, at).await
        }
        async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Session>, Error> {
            self.0.find_expired(now).await
        }
        async fn delete(&self, session_id: SessionId) -> Result<(), Error> {
            self.0.delete(session_id).await
        }
    }
}
