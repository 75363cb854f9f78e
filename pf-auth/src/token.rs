//! HMAC-SHA256 session tokens binding `(user_id, email, session_id, exp)`.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use pf_errors::Error;
use pf_primitives::{SessionId, UserId};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub email: String,
    pub session_id: SessionId,
    pub exp: DateTime<Utc>,
}

/// Mints and verifies tokens with a shared secret. The wire format is
/// deliberately plain — `payload.signature`, both hex/ASCII — since the
/// only consumer is this service's own `VerifyAuth` path.
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// `email` is last and unbounded on purpose: it is attacker-supplied
    /// (sourced from an external identity provider we don't control) and
    /// may itself contain `|`. `splitn` below caps at 4 parts, so any
    /// extra `|` inside the email stays folded into this final field
    /// instead of shifting the fixed `user_id`/`session_id`/`exp` fields.
    fn payload_string(claims: &TokenClaims) -> String {
        format!(
            "{}|{}|{}|{}",
            claims.user_id.as_uuid(),
            claims.session_id.as_uuid(),
            claims.exp.timestamp(),
            claims.email,
        )
    }

    fn sign(&self, payload: &str) -> Result<String, Error> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::internal(format!("invalid hmac key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn mint(&self, claims: &TokenClaims) -> Result<String, Error> {
        let payload = Self::payload_string(claims);
        let signature = self.sign(&payload)?;
        Ok(format!("{payload}.{signature}"))
    }

    /// Parses and checks the signature and expiry. Any failure here is
    /// surfaced by the caller as `TokenInvalid` (§4.5).
    pub fn verify(&self, token: &str) -> Result<TokenClaims, Error> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| Error::unauthenticated("malformed token"))?;

        let expected = self.sign(payload)?;
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(Error::unauthenticated("token signature mismatch"));
        }

        let mut parts = payload.splitn(4, '|');
        let (Some(user_id), Some(session_id), Some(exp), Some(email)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::unauthenticated("malformed token payload"));
        };

        let user_id = user_id
            .parse::<uuid::Uuid>()
            .map_err(|_| Error::unauthenticated("malformed user id in token"))?;
        let session_id = session_id
            .parse::<uuid::Uuid>()
            .map_err(|_| Error::unauthenticated("malformed session id in token"))?;
        let exp_unix = exp
            .parse::<i64>()
            .map_err(|_| Error::unauthenticated("malformed expiry in token"))?;
        let exp = Utc
            .timestamp_opt(exp_unix, 0)
            .single()
            .ok_or_else(|| Error::unauthenticated("malformed expiry in token"))?;

        let claims = TokenClaims {
            user_id: user_id.into(),
            email: email.to_string(),
            session_id: session_id.into(),
            exp,
        };

        if claims.exp <= Utc::now() {
            return Err(Error::unauthenticated("token expired"));
        }

        Ok(claims)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_roundtrips() {
        let signer = TokenSigner::new(b"shared-secret".to_vec());
        let claims = TokenClaims {
            user_id: UserId::new(),
            email: "a@b.com".into(),
            session_id: SessionId::new(),
            exp: Utc::now() + chrono::Duration::hours(1),
        };
        let token = signer.mint(&claims).unwrap();
        let parsed = signer.verify(&token).unwrap();
        assert_eq!(parsed, claims);
    }

    #[test]
    fn email_containing_a_pipe_still_roundtrips() {
        let signer = TokenSigner::new(b"shared-secret".to_vec());
        let claims = TokenClaims {
            user_id: UserId::new(),
            email: "\"a|b\"@example.com".into(),
            session_id: SessionId::new(),
            exp: Utc::now() + chrono::Duration::hours(1),
        };
        let token = signer.mint(&claims).unwrap();
        let parsed = signer.verify(&token).unwrap();
        assert_eq!(parsed, claims);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = TokenSigner::new(b"shared-secret".to_vec());
        let claims = TokenClaims {
            user_id: UserId::new(),
            email: "a@b.com".into(),
            session_id: SessionId::new(),
            exp: Utc::now() + chrono::Duration::hours(1),
        };
        let mut token = signer.mint(&claims).unwrap();
        token.push('0');
        assert!(signer.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new(b"shared-secret".to_vec());
        let claims = TokenClaims {
            user_id: UserId::new(),
            email: "a@b.com".into(),
            session_id: SessionId::new(),
            exp: Utc::now() - chrono::Duration::seconds(1),
        };
        let token = signer.mint(&claims).unwrap();
        assert!(signer.verify(&token).is_err());
    }
}
