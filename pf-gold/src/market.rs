//! Market-price collaborator (§6): gold prices arrive from an external
//! feed as `{buy, sell, currency, unit, updated_at_unix}` JSON, quoted in
//! the gold type's conventional display unit and native currency. This
//! mirrors [`pf_fx::HttpRateProvider`]'s shape one level up the stack —
//! the engine normalizes whatever the feed hands back through the same
//! two layers used for a user-entered price.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pf_errors::Error;
use pf_primitives::{Currency, GoldType, GoldUnit};
use rust_decimal::Decimal;

/// A market quote as published by the feed: buy/sell price per the gold
/// type's conventional display unit, in its native currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketQuote {
    pub buy_price_native_minor: i64,
    pub sell_price_native_minor: i64,
    pub unit: GoldUnit,
    pub currency: Currency,
    pub updated_at: DateTime<Utc>,
}

/// `GetMarketPrice` (§6): the external gold market feed, scoped to one
/// gold type at a time.
#[async_trait]
pub trait MarketPriceProvider: Send + Sync {
    async fn fetch_quote(&self, gold_type: GoldType) -> Result<MarketQuote, Error>;
}

/// HTTP collaborator. Mirrors [`pf_fx::HttpRateProvider`]: same JSON
/// shape, same "reqwest client against a configured base URL" wiring.
pub struct HttpMarketPriceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketPriceProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn symbol(gold_type: GoldType) -> &'static str {
        match gold_type {
            GoldType::VndGold => "XAUVND",
            GoldType::UsdGold => "XAUUSD",
        }
    }
}

#[derive(serde::Deserialize)]
struct QuoteResponse {
    buy: Decimal,
    sell: Decimal,
    currency: String,
    unit: String,
    updated_at_unix: i64,
}

fn unit_from_str(s: &str) -> Result<GoldUnit, Error> {
    match s.to_ascii_lowercase().as_str() {
        "tael" => Ok(GoldUnit::Tael),
        "gram" | "g" => Ok(GoldUnit::Gram),
        "troy_ounce" | "oz" | "ounce" => Ok(GoldUnit::TroyOunce),
        other => Err(Error::external_unavailable(format!(
            "market feed returned unknown unit {other}"
        ))),
    }
}

#[async_trait]
impl MarketPriceProvider for HttpMarketPriceProvider {
    async fn fetch_quote(&self, gold_type: GoldType) -> Result<MarketQuote, Error> {
        let url = format!("{}/market/{}", self.base_url, Self::symbol(gold_type));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::external_unavailable(format!("market feed unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::external_unavailable(format!(
                "market feed returned {}",
                resp.status()
            )));
        }

        let body: QuoteResponse = resp
            .json()
            .await
            .map_err(|e| Error::external_unavailable(format!("market feed returned bad json: {e}")))?;

        let currency = Currency::parse_code(&body.currency)
            .ok_or_else(|| Error::external_unavailable(format!("market feed returned unknown currency {}", body.currency)))?;
        if currency != gold_type.native_currency() {
            return Err(Error::external_unavailable(
                "market feed currency does not match gold type's native currency",
            ));
        }
        let unit = unit_from_str(&body.unit)?;
        let updated_at = Utc
            .timestamp_opt(body.updated_at_unix, 0)
            .single()
            .ok_or_else(|| Error::external_unavailable("market feed returned an invalid timestamp"))?;

        let minor_mult = Decimal::from(currency.minor_unit_multiplier());
        let buy_price_native_minor = pf_primitives::money::round_half_to_even_i64(body.buy * minor_mult)?;
        let sell_price_native_minor = pf_primitives::money::round_half_to_even_i64(body.sell * minor_mult)?;

        Ok(MarketQuote {
            buy_price_native_minor,
            sell_price_native_minor,
            unit,
            currency,
            updated_at,
        })
    }
}

/// Deterministic in-memory fake for tests — returns whatever quote it
/// was constructed with, regardless of gold type.
pub struct FakeMarketPriceProvider {
    pub quote: MarketQuote,
}

#[async_trait]
impl MarketPriceProvider for FakeMarketPriceProvider {
    async fn fetch_quote(&self, _gold_type: GoldType) -> Result<MarketQuote, Error> {
        Ok(self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_provider_returns_configured_quote() {
        let provider = FakeMarketPriceProvider {
            quote: MarketQuote {
                buy_price_native_minor: 85_000_000,
                sell_price_native_minor: 84_500_000,
                unit: GoldUnit::Tael,
                currency: Currency::Vnd,
                updated_at: Utc::now(),
            },
        };

        let quote = provider.fetch_quote(GoldType::VndGold).await.unwrap();
        assert_eq!(quote.buy_price_native_minor, 85_000_000);
        assert_eq!(quote.unit, GoldUnit::Tael);
    }
}
