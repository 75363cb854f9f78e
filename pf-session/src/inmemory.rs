//! In-memory durable session repository — a test double for
//! [`DurableSessionRepository`], used the same way the other subsystem
//! crates keep an `InMemory*` alongside their Postgres-backed store.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::SessionId;

use crate::{
    model::{NewSession, Session},
    store::DurableSessionRepository,
};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<Vec<Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableSessionRepository for InMemorySessionRepository {
    async fn insert(&self, new_session: NewSession) -> Result<Session, Error> {
        let now = Utc::now();
        let session = Session {
            session_id: new_session.session_id,
            user_id: new_session.user_id,
            token: new_session.token,
            device_name: new_session.device_name,
            device_type: new_session.device_type,
            ip_address: new_session.ip_address,
            user_agent: new_session.user_agent,
            created_at: now,
            last_active_at: now,
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
        if let Some(s) = self
            .sessions
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
            s.revoked = true;
        }
        Ok(())
    }

    async fn touch_last_active(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), Error> {
        if let Some(s) = self
            .sessions
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
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
