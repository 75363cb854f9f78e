//! Postgres-backed durable session record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::SessionId;
use sqlx::PgPool;

use crate::{
    model::{NewSession, Session},
    store::DurableSessionRepository,
};

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: uuid::Uuid,
    user_id: uuid::Uuid,
    token: String,
    device_name: String,
    device_type: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            session_id: row.session_id.into(),
            user_id: row.user_id.into(),
            token: row.token,
            device_name: row.device_name,
            device_type: row.device_type,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            last_active_at: row.last_active_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
        }
    }
}

const COLUMNS: &str = "session_id, user_id, token, device_name, device_type, ip_address, \
     user_agent, created_at, last_active_at, expires_at, revoked";

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableSessionRepository for PgSessionRepository {
    async fn insert(&self, new_session: NewSession) -> Result<Session, Error> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "INSERT INTO sessions \
             (session_id, user_id, token, device_name, device_type, ip_address, user_agent, \
              created_at, last_active_at, expires_at, revoked) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now(), $8, false) \
             RETURNING {COLUMNS}"
        ))
        .bind(new_session.session_id.as_uuid())
        .bind(new_session.user_id.as_uuid())
        .bind(&new_session.token)
        .bind(&new_session.device_name)
        .bind(&new_session.device_type)
        .bind(&new_session.ip_address)
        .bind(&new_session.user_agent)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("insert session: {e}")))?;

        Ok(row.into())
    }

    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>, Error> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("find session: {e}")))?;

        Ok(row.map(Session::from))
    }

    async fn revoke(&self, session_id: SessionId) -> Result<(), Error> {
        sqlx::query("UPDATE sessions SET revoked = true WHERE session_id = $1")
            .bind(session_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("revoke session: {e}")))?;
        Ok(())
    }

    async fn touch_last_active(&self, session_id: SessionId, at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE sessions SET last_active_at = $1 WHERE session_id = $2")
            .bind(at)
            .bind(session_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("touch session activity: {e}")))?;
        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Session>, Error> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {COLUMNS} FROM sessions WHERE expires_at < $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("find expired sessions: {e}")))?;

        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn delete(&self, session_id: SessionId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("delete session: {e}")))?;
        Ok(())
    }
}
