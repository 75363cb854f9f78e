//! Auth server (C5): verifies an external identity assertion, mints and
//! revokes per-device sessions, and checks presented tokens against the
//! session store.

pub mod identity;
pub mod token;

pub use identity::HttpIdentityVerifier;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pf_errors::Error;
use pf_primitives::{SessionId, UserId};
use pf_session::{store::DurableSessionRepository, NewSession, SessionStore};
use pf_store::{CategoryRepository, User, UserRepository};
use tracing::{info, warn};

use token::{TokenClaims, TokenSigner};

/// What the external identity provider hands back once an assertion
/// checks out (§6 EXTERNAL INTERFACES).
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, Error>;
}

/// Per-device metadata captured when a session is minted.
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    pub device_name: String,
    pub device_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct AuthServer<UR, CR, DR, KC, IV> {
    users: UR,
    categories: CR,
    sessions: SessionStore<DR, KC>,
    identity: IV,
    signer: TokenSigner,
    session_ttl_hours: i64,
}

impl<UR, CR, DR, KC, IV> AuthServer<UR, CR, DR, KC, IV>
where
    UR: UserRepository,
    CR: CategoryRepository,
    DR: DurableSessionRepository,
    KC: pf_cache::KeyValueCache,
    IV: IdentityVerifier,
{
    /// `session_ttl_hours` is the configured session lifetime (§3
    /// Session.expires_at) — callers own the config value, this crate
    /// doesn't hardcode one.
    pub fn new(
        users: UR,
        categories: CR,
        sessions: SessionStore<DR, KC>,
        identity: IV,
        signer: TokenSigner,
        session_ttl_hours: i64,
    ) -> Self {
        Self {
            users,
            categories,
            sessions,
            identity,
            signer,
            session_ttl_hours,
        }
    }

    /// Register/Login (§4.5 op 1): verify the assertion, find-or-create
    /// the user, seed defaults on first login, then mint a session.
    pub async fn register_or_login(
        &self,
        assertion: &str,
        device: DeviceMetadata,
    ) -> Result<(User, String), Error> {
        let claims = self.identity.verify(assertion).await?;

        let user = match self.users.find_by_email(&claims.email).await? {
            Some(existing) => existing,
            None => {
                let created = self
                    .users
                    .create(&claims.email, &claims.name, claims.picture_url.as_deref(), pf_primitives::Currency::Usd)
                    .await?;
                self.categories.seed_defaults(created.id).await?;
                info!(user_id = %created.id, "created user on first login");
                created
            }
        };

        let token = self.mint_session(&user, device).await?;
        Ok((user, token))
    }

    async fn mint_session(&self, user: &User, device: DeviceMetadata) -> Result<String, Error> {
        let session_id = SessionId::new();
        let exp = Utc::now() + Duration::hours(self.session_ttl_hours);

        let claims = TokenClaims {
            user_id: user.id,
            email: user.email.clone(),
            session_id,
            exp,
        };
        let token = self.signer.mint(&claims)?;

        self.sessions
            .add_session(
                &user.email,
                NewSession {
                    session_id,
                    user_id: user.id,
                    token: token.clone(),
                    device_name: device.device_name,
                    device_type: device.device_type,
                    ip_address: device.ip_address,
                    user_agent: device.user_agent,
                    expires_at: exp,
                },
            )
            .await?;

        Ok(token)
    }

    /// `VerifyAuth` (§4.5 op 2). Every failure path surfaces as
    /// unauthenticated to the caller; the distinct causes are only in
    /// the server log (§7 propagation policy).
    pub async fn verify_auth(&self, token: &str) -> Result<UserId, Error> {
        let claims = self.signer.verify(token).map_err(|e| {
            warn!(error = %e, "token parse/signature/expiry failure (TokenInvalid)");
            Error::unauthenticated("invalid or expired token")
        })?;

        if !self.sessions.session_exists(claims.session_id).await? {
            warn!(session_id = %claims.session_id, "session not found (SessionExpired)");
            return Err(Error::unauthenticated("session no longer exists"));
        }

        let stored_token = self
            .sessions
            .get_session_token(claims.session_id)
            .await?
            .ok_or_else(|| Error::unauthenticated("session no longer exists"))?;

        if stored_token != token {
            warn!(session_id = %claims.session_id, "token/session mismatch (TokenRevoked)");
            return Err(Error::unauthenticated("token has been revoked"));
        }

        self.sessions.update_session_activity(claims.session_id).await;
        Ok(claims.user_id)
    }

    /// `Logout` (§4.5 op 3): parse the token, remove the session from
    /// both tiers, mark the durable row revoked.
    pub async fn logout(&self, token: &str) -> Result<(), Error> {
        let claims = self
            .signer
            .verify(token)
            .map_err(|_| Error::unauthenticated("invalid or expired token"))?;
        self.sessions.remove_session(&claims.email, claims.session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pf_cache::InMemoryCache;
    use pf_store::{Category, InMemoryStore};
    use std::sync::Mutex;

    struct FakeIdentity {
        email: String,
    }

    #[async_trait]
    impl IdentityVerifier for FakeIdentity {
        async fn verify(&self, _assertion: &str) -> Result<IdentityClaims, Error> {
            Ok(IdentityClaims {
                email: self.email.clone(),
                name: "Ada".into(),
                picture_url: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeDurable {
        sessions: Mutex<Vec<pf_session::Session>>,
    }

    #[async_trait]
    impl DurableSessionRepository for FakeDurable {
        async fn insert(&self, new_session: NewSession) -> Result<pf_session::Session, Error> {
            let session = pf_session::Session {
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

        async fn find_by_id(&self, session_id: SessionId) -> Result<Option<pf_session::Session>, Error> {
            Ok(self.sessions.lock().unwrap().iter().find(|s| s.session_id == session_id).cloned())
        }

        async fn revoke(&self, session_id: SessionId) -> Result<(), Error> {
            if let Some(s) = self.sessions.lock().unwrap().iter_mut().find(|s| s.session_id == session_id) {
                s.revoked = true;
            }
            Ok(())
        }

        async fn touch_last_active(&self, session_id: SessionId, at: chrono::DateTime<Utc>) -> Result<(), Error> {
            if let Some(s) = self.sessions.lock().unwrap().iter_mut().find(|s| s.session_id == session_id) {
                s.last_active_at = at;
            }
            Ok(())
        }

        async fn find_expired(&self, now: chrono::DateTime<Utc>) -> Result<Vec<pf_session::Session>, Error> {
            Ok(self.sessions.lock().unwrap().iter().filter(|s| s.expires_at < now).cloned().collect())
        }

        async fn delete(&self, session_id: SessionId) -> Result<(), Error> {
            self.sessions.lock().unwrap().retain(|s| s.session_id != session_id);
            Ok(())
        }
    }

    fn server(email: &str) -> AuthServer<InMemoryStore, InMemoryStore, FakeDurable, InMemoryCache, FakeIdentity> {
        let store = InMemoryStore::new();
        AuthServer::new(
            store,
            InMemoryStore::new(),
            SessionStore::new(FakeDurable::default(), InMemoryCache::new()),
            FakeIdentity { email: email.to_string() },
            TokenSigner::new(b"test-secret".to_vec()),
            24 * 30,
        )
    }

    #[tokio::test]
    async fn login_from_two_devices_then_logout_one() {
        let auth = server("multi@device.com");

        let (_user, token_a) = auth
            .register_or_login("assertion", DeviceMetadata { device_name: "iPhone".into(), device_type: "mobile".into(), ..Default::default() })
            .await
            .unwrap();
        let (_user, token_b) = auth
            .register_or_login("assertion", DeviceMetadata { device_name: "Chrome".into(), device_type: "web".into(), ..Default::default() })
            .await
            .unwrap();

        assert!(auth.verify_auth(&token_a).await.is_ok());
        assert!(auth.verify_auth(&token_b).await.is_ok());

        auth.logout(&token_a).await.unwrap();

        assert!(auth.verify_auth(&token_a).await.is_err());
        assert!(auth.verify_auth(&token_b).await.is_ok());
    }

    #[tokio::test]
    async fn first_login_seeds_default_categories() {
        let auth = server("new@user.com");
        let (user, _token) = auth.register_or_login("assertion", DeviceMetadata::default()).await.unwrap();
        let categories: Vec<Category> = auth.categories.list_for_user(user.id).await.unwrap();
        assert!(!categories.is_empty());
    }
}
