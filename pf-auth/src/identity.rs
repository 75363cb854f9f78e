//! HTTP collaborator for [`IdentityVerifier`] (§6 EXTERNAL INTERFACES):
//! posts the opaque assertion to a configured verification endpoint and
//! expects back `{email, name, picture}` or a failure. Same shape as
//! `pf_fx::HttpRateProvider` and `pf_gold::HttpMarketPriceProvider` — a
//! thin `reqwest` client against one base URL.

use async_trait::async_trait;
use pf_errors::Error;

use crate::{IdentityClaims, IdentityVerifier};

pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpIdentityVerifier {
    pub fn new(verify_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url: verify_url.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct VerifyRequest<'a> {
    assertion: &'a str,
}

#[derive(serde::Deserialize)]
struct VerifyResponse {
    email: String,
    name: String,
    picture: Option<String>,
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, Error> {
        let resp = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest { assertion })
            .send()
            .await
            .map_err(|e| Error::external_unavailable(format!("identity provider unreachable: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::unauthenticated("identity assertion rejected by provider"));
        }
        if !resp.status().is_success() {
            return Err(Error::external_unavailable(format!(
                "identity provider returned {}",
                resp.status()
            )));
        }

        let body: VerifyResponse = resp
            .json()
            .await
            .map_err(|e| Error::external_unavailable(format!("identity provider returned bad json: {e}")))?;

        Ok(IdentityClaims {
            email: body.email,
            name: body.name,
            picture_url: body.picture,
        })
    }
}
