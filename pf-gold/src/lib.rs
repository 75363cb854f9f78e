//! Two-layer gold unit/currency conversion engine (C3).
//!
//! Layer 1 (unit) is the pure arithmetic in [`pf_primitives::gold_unit`].
//! Layer 2 (currency) sits on top of it here and reaches for [`FxConverter`]
//! whenever a price needs to move between the gold type's native currency
//! and a wallet's currency.

pub mod market;

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use pf_errors::Error;
use pf_fx::FxConverter;
use pf_primitives::{
    gold_unit::{
        price_per_base_to_price_per_unit, price_per_unit_to_price_per_base,
        quantity_to_scaled_base_units, scaled_base_units_to_quantity,
    },
    Currency, GoldType, GoldUnit, Money,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

pub use market::{FakeMarketPriceProvider, HttpMarketPriceProvider, MarketPriceProvider, MarketQuote};

/// A holding's persisted, normalized state: quantity in the type's base
/// unit (scaled by 10,000) and price per base unit in the type's native
/// currency minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedHolding {
    pub gold_type: GoldType,
    pub scaled_quantity: i64,
    pub price_per_base_unit_native_minor: i64,
}

/// What a holding looks like once converted back to its conventional
/// display unit and native currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayHolding {
    pub quantity: Decimal,
    pub unit: GoldUnit,
    pub price_per_unit_native_minor: i64,
    pub native_currency: Currency,
}

/// Result of costing a user-entered purchase: the native-currency total
/// (persisted on the holding), the wallet-currency total (used to debit
/// the wallet), and the average native-currency cost per base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseCost {
    pub total_cost_native: Money,
    pub total_cost_wallet: Money,
    pub average_cost_native_per_base_unit: Money,
}

struct CachedMarketPrice {
    quote: MarketQuote,
    fetched_at: Instant,
}

pub struct GoldConversionEngine {
    fx: Arc<dyn FxConverter>,
    market: Option<Arc<dyn MarketPriceProvider>>,
    market_ttl: Duration,
    market_cache: Mutex<HashMap<GoldType, CachedMarketPrice>>,
}

impl GoldConversionEngine {
    pub fn new(fx: Arc<dyn FxConverter>) -> Self {
        Self {
            fx,
            market: None,
            market_ttl: Duration::from_secs(5 * 60),
            market_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a market-price feed (§6) with the given cache TTL. Without
    /// one, [`Self::latest_market_price`] always fails — a deployment
    /// that never shows live market prices need not configure a feed.
    pub fn with_market_provider(mut self, provider: Arc<dyn MarketPriceProvider>, ttl: Duration) -> Self {
        self.market = Some(provider);
        self.market_ttl = ttl;
        self
    }

    /// The latest cached market quote for `gold_type`, normalized into
    /// the same storage representation as a user-entered purchase,
    /// re-fetching from the feed once the cache entry is older than the
    /// configured TTL (mirrors [`pf_fx::FxService`]'s single-flight TTL
    /// cache one layer up).
    pub async fn latest_market_price(&self, gold_type: GoldType) -> Result<NormalizedHolding, Error> {
        let provider = self
            .market
            .as_ref()
            .ok_or_else(|| Error::internal("gold engine has no market price provider configured"))?;

        let mut cache = self.market_cache.lock().await;
        if let Some(cached) = cache.get(&gold_type) {
            if cached.fetched_at.elapsed() <= self.market_ttl {
                return self.normalize_quote(cached.quote, gold_type);
            }
        }

        let quote = provider.fetch_quote(gold_type).await?;
        cache.insert(
            gold_type,
            CachedMarketPrice {
                quote,
                fetched_at: Instant::now(),
            },
        );
        self.normalize_quote(quote, gold_type)
    }

    /// A feed quote is a buy/sell pair; the mid-price is what gets
    /// normalized into storage, the same path a user-entered price goes
    /// through for `normalize`.
    fn normalize_quote(&self, quote: MarketQuote, gold_type: GoldType) -> Result<NormalizedHolding, Error> {
        let mid_price = (quote.buy_price_native_minor + quote.sell_price_native_minor) / 2;
        self.normalize(Decimal::ONE, quote.unit, mid_price, gold_type)
            .map(|holding| NormalizedHolding {
                // `normalize(1, unit, ...)` above only served to run the
                // per-unit price through the same unit-scaling math as a
                // user purchase; the quantity itself is not part of a
                // market price and is discarded here.
                scaled_quantity: 0,
                ..holding
            })
    }

    /// Normalize a user-entered quantity and native-currency unit price
    /// into the storage representation (Layer 1 only — the price here is
    /// already expressed in the gold type's native currency).
    pub fn normalize(
        &self,
        quantity: Decimal,
        quantity_unit: GoldUnit,
        price_per_quantity_unit_native_minor: i64,
        gold_type: GoldType,
    ) -> Result<NormalizedHolding, Error> {
        let scaled_quantity = quantity_to_scaled_base_units(quantity, quantity_unit, gold_type)?;
        let price_per_base_unit = price_per_unit_to_price_per_base(
            Decimal::from(price_per_quantity_unit_native_minor),
            quantity_unit,
            gold_type,
        );
        let price_per_base_unit_native_minor =
            pf_primitives::money::round_half_to_even_i64(price_per_base_unit)?;

        Ok(NormalizedHolding {
            gold_type,
            scaled_quantity,
            price_per_base_unit_native_minor,
        })
    }

    /// Convert a stored holding back to its conventional display unit.
    pub fn display(&self, holding: NormalizedHolding) -> DisplayHolding {
        let display_unit = holding.gold_type.display_unit();
        let quantity =
            scaled_base_units_to_quantity(holding.scaled_quantity, display_unit, holding.gold_type);
        let price_per_unit = price_per_base_to_price_per_unit(
            Decimal::from(holding.price_per_base_unit_native_minor),
            display_unit,
            holding.gold_type,
        );
        let price_per_unit_native_minor =
            pf_primitives::money::round_half_to_even_i64(price_per_unit).unwrap_or(0);

        DisplayHolding {
            quantity,
            unit: display_unit,
            price_per_unit_native_minor,
            native_currency: holding.gold_type.native_currency(),
        }
    }

    /// Convert a display-unit quantity/price into `preferred_currency`,
    /// invoking FX only when the preferred currency differs from the
    /// gold type's native currency.
    pub async fn display_in_currency(
        &self,
        holding: NormalizedHolding,
        preferred_currency: Currency,
    ) -> Result<(DisplayHolding, Money), Error> {
        let display = self.display(holding);
        let native_total = Money::new(
            display.price_per_unit_native_minor,
            display.native_currency,
        );
        let converted_price = self.fx.convert_amount(native_total, preferred_currency).await?;
        Ok((display, converted_price))
    }

    /// `CalculateTotalCostFromUserInput`: given a user-entered quantity,
    /// unit, and native-currency unit price, compute the native-currency
    /// total (persisted), the wallet-currency total (debited), and the
    /// native-currency average cost per base unit.
    pub async fn calculate_total_cost_from_user_input(
        &self,
        quantity: Decimal,
        quantity_unit: GoldUnit,
        price_per_quantity_unit_native_minor: i64,
        gold_type: GoldType,
        wallet_currency: Currency,
    ) -> Result<PurchaseCost, Error> {
        let native_currency = gold_type.native_currency();
        let unit_price_native = Money::new(price_per_quantity_unit_native_minor, native_currency);
        let total_cost_native = unit_price_native.checked_mul_scalar(quantity)?;

        let total_cost_wallet = self.fx.convert_amount(total_cost_native, wallet_currency).await?;

        let normalized = self.normalize(
            quantity,
            quantity_unit,
            price_per_quantity_unit_native_minor,
            gold_type,
        )?;
        let average_cost_native_per_base_unit = Money::new(
            normalized.price_per_base_unit_native_minor,
            native_currency,
        );

        Ok(PurchaseCost {
            total_cost_native,
            total_cost_wallet,
            average_cost_native_per_base_unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedFx {
        usd_per_vnd: Decimal,
    }

    #[async_trait]
    impl FxConverter for FixedFx {
        async fn get_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error> {
            match (from, to) {
                (a, b) if a == b => Ok(Decimal::ONE),
                (Currency::Vnd, Currency::Usd) => Ok(self.usd_per_vnd),
                (Currency::Usd, Currency::Vnd) => Ok(Decimal::ONE / self.usd_per_vnd),
                _ => panic!("unexpected pair"),
            }
        }

        async fn convert_amount(&self, amount: Money, to: Currency) -> Result<Money, Error> {
            let rate = self.get_rate(amount.currency, to).await?;
            let src_mult = Decimal::from(amount.currency.minor_unit_multiplier());
            let dst_mult = Decimal::from(to.minor_unit_multiplier());
            let exact = Decimal::from(amount.amount_minor) * rate * dst_mult / src_mult;
            Ok(Money::new(
                pf_primitives::money::round_half_to_even_i64(exact)?,
                to,
            ))
        }
    }

    #[tokio::test]
    async fn buying_taels_of_vnd_gold_into_usd_wallet() {
        // 1 USD = 25,000 VND => 1 VND = 1/25000 USD.
        let fx = Arc::new(FixedFx {
            usd_per_vnd: dec!(1) / dec!(25000),
        });
        let engine = GoldConversionEngine::new(fx);

        let cost = engine
            .calculate_total_cost_from_user_input(
                dec!(2),
                GoldUnit::Tael,
                85_000_000, // 85,000,000 VND per tael (VND has no minor subdivision)
                GoldType::VndGold,
                Currency::Usd,
            )
            .await
            .unwrap();

        assert_eq!(cost.total_cost_native.currency, Currency::Vnd);
        assert_eq!(cost.total_cost_native.amount_minor, 170_000_000);
        assert_eq!(cost.total_cost_wallet.currency, Currency::Usd);
        assert_eq!(cost.total_cost_wallet.amount_minor, 680_000); // $6,800.00
    }

    #[tokio::test]
    async fn normalize_then_display_roundtrips() {
        let fx = Arc::new(FixedFx {
            usd_per_vnd: dec!(1) / dec!(25000),
        });
        let engine = GoldConversionEngine::new(fx);

        let normalized = engine
            .normalize(dec!(2), GoldUnit::Tael, 85_000_000, GoldType::VndGold)
            .unwrap();
        assert_eq!(normalized.scaled_quantity, 750_000);

        let display = engine.display(normalized);
        assert_eq!(display.unit, GoldUnit::Tael);
        assert_eq!(display.quantity, dec!(2));
        assert_eq!(display.price_per_unit_native_minor, 85_000_000);
    }

    #[tokio::test]
    async fn latest_market_price_normalizes_the_feeds_mid_price() {
        let fx = Arc::new(FixedFx {
            usd_per_vnd: dec!(1) / dec!(25000),
        });
        let market = Arc::new(FakeMarketPriceProvider {
            quote: MarketQuote {
                buy_price_native_minor: 85_000_000,
                sell_price_native_minor: 84_500_000,
                unit: GoldUnit::Tael,
                currency: Currency::Vnd,
                updated_at: chrono::Utc::now(),
            },
        });
        let engine = GoldConversionEngine::new(fx).with_market_provider(market, Duration::from_secs(60));

        let holding = engine.latest_market_price(GoldType::VndGold).await.unwrap();
        let display = engine.display(holding);
        // Midpoint of the buy/sell quote, round-tripped through the
        // gram-base-unit storage representation and back to per-tael.
        assert_eq!(display.price_per_unit_native_minor, 84_750_000);
    }

    #[tokio::test]
    async fn latest_market_price_without_a_provider_is_internal_error() {
        let fx = Arc::new(FixedFx {
            usd_per_vnd: dec!(1) / dec!(25000),
        });
        let engine = GoldConversionEngine::new(fx);
        let err = engine.latest_market_price(GoldType::VndGold).await.unwrap_err();
        assert_eq!(err.kind(), pf_errors::ErrorKind::Internal);
    }
}
