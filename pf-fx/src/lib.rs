//! FX rate fetch + TTL cache (C2).
//!
//! [`FxService`] caches rates fetched from a [`RateProvider`] collaborator
//! for a configurable TTL. A single `tokio::sync::Mutex` guards the cache
//! map and is held across the fetch on a miss, so concurrent callers for
//! the same pair naturally single-flight instead of stampeding the
//! provider — the second caller just waits for the first to populate the
//! entry rather than issuing its own request.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{currency::Currency, money::round_half_to_even_i64, money::Money};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

/// External collaborator contract: return the current rate to convert
/// one unit of `from` into `to`. Implementations talk to the HTTP
/// provider named in the external-interfaces section; this crate only
/// depends on the trait.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error>;
}

/// `GetRate`/`ConvertAmount` contract exposed to the rest of the backend.
#[async_trait]
pub trait FxConverter: Send + Sync {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error>;
    async fn convert_amount(&self, amount: Money, to: Currency) -> Result<Money, Error>;
}

#[derive(Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    fetched_at: DateTime<Utc>,
}

pub struct FxService {
    provider: Arc<dyn RateProvider>,
    ttl: Duration,
    cache: Mutex<HashMap<(Currency, Currency), CachedRate>>,
}

impl FxService {
    pub fn new(provider: Arc<dyn RateProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, cached: &CachedRate, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(cached.fetched_at);
        age.to_std().map(|age| age <= self.ttl).unwrap_or(false)
    }
}

#[async_trait]
impl FxConverter for FxService {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        let now = Utc::now();
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(&(from, to)) {
            if self.is_fresh(cached, now) {
                return Ok(cached.rate);
            }
        }

        let rate = self.provider.fetch_rate(from, to).await?;
        cache.insert(
            (from, to),
            CachedRate {
                rate,
                fetched_at: now,
            },
        );
        Ok(rate)
    }

    async fn convert_amount(&self, amount: Money, to: Currency) -> Result<Money, Error> {
        if amount.currency == to {
            return Ok(amount);
        }

        let rate = self.get_rate(amount.currency, to).await?;
        let src_mult = Decimal::from(amount.currency.minor_unit_multiplier());
        let dst_mult = Decimal::from(to.minor_unit_multiplier());
        let exact = Decimal::from(amount.amount_minor) * rate * dst_mult / src_mult;
        let amount_minor = round_half_to_even_i64(exact)?;
        Ok(Money::new(amount_minor, to))
    }
}

/// HTTP collaborator: fetches `{buy, sell, currency, unit, updated_at_unix}`
/// JSON from an external FX provider and derives a mid rate.
pub struct HttpRateProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct RateResponse {
    buy: Decimal,
    sell: Decimal,
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error> {
        let url = format!("{}/rates/{}/{}", self.base_url, from.code(), to.code());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::external_unavailable(format!("fx provider unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::external_unavailable(format!(
                "fx provider returned {}",
                resp.status()
            )));
        }

        let body: RateResponse = resp
            .json()
            .await
            .map_err(|e| Error::external_unavailable(format!("fx provider returned bad json: {e}")))?;

        Ok((body.buy + body.sell) / Decimal::TWO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        rate: Decimal,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateProvider for FixedProvider {
        async fn fetch_rate(&self, _from: Currency, _to: Currency) -> Result<Decimal, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rate)
        }
    }

    #[tokio::test]
    async fn identity_conversion_skips_provider() {
        let provider = Arc::new(FixedProvider {
            rate: dec!(25000),
            calls: AtomicUsize::new(0),
        });
        let fx = FxService::new(provider.clone(), Duration::from_secs(60));

        let rate = fx.get_rate(Currency::Usd, Currency::Usd).await.unwrap();
        assert_eq!(rate, Decimal::ONE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let amount = Money::new(500, Currency::Usd);
        let converted = fx.convert_amount(amount, Currency::Usd).await.unwrap();
        assert_eq!(converted.amount_minor, 500);
    }

    #[tokio::test]
    async fn caches_rate_within_ttl() {
        let provider = Arc::new(FixedProvider {
            rate: dec!(25000),
            calls: AtomicUsize::new(0),
        });
        let fx = FxService::new(provider.clone(), Duration::from_secs(60));

        fx.get_rate(Currency::Usd, Currency::Vnd).await.unwrap();
        fx.get_rate(Currency::Usd, Currency::Vnd).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn convert_amount_scales_by_minor_units() {
        // 1 USD = 25000 VND. $10.00 (1000 minor) -> 250,000 VND (minor=dong).
        let provider = Arc::new(FixedProvider {
            rate: dec!(25000),
            calls: AtomicUsize::new(0),
        });
        let fx = FxService::new(provider, Duration::from_secs(60));

        let usd = Money::new(1000, Currency::Usd);
        let vnd = fx.convert_amount(usd, Currency::Vnd).await.unwrap();
        assert_eq!(vnd.amount_minor, 250_000);
        assert_eq!(vnd.currency, Currency::Vnd);
    }
}
