//! The durable session record (§3 DATA MODEL, Session).

use chrono::{DateTime, Utc};
use pf_primitives::{SessionId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub device_name: String,
    pub device_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    /// A token validates against this row iff it matches exactly and the
    /// row is neither revoked nor past its expiry (§8 property 4).
    pub fn is_valid_for(&self, presented_token: &str, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at && self.token == presented_token
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub device_name: String,
    pub device_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}
