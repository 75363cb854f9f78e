//! Gold unit conversion constants (C1, Layer 1 of the gold engine).
//!
//! Quantities are stored in the canonical base unit for their
//! [`GoldType`], scaled by 10,000 to keep four decimal places as an
//! integer. Conversion factors are exact rationals expressed as
//! [`Decimal`], never `f64`.

use pf_errors::Error;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{currency::Currency, money::round_half_to_even_i64};

/// Scale factor applied to base-unit quantities for four-decimal storage.
pub const QUANTITY_SCALE: i64 = 10_000;

/// A unit gold can be quoted or held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoldUnit {
    Tael,
    Gram,
    TroyOunce,
}

impl GoldUnit {
    /// Exact grams-per-unit constant.
    pub fn grams_per_unit(&self) -> Decimal {
        match self {
            GoldUnit::Tael => dec!(37.5),
            GoldUnit::Gram => dec!(1),
            GoldUnit::TroyOunce => dec!(31.1034768),
        }
    }
}

/// A gold type, pinned to a fixed `(base_unit, native_currency)` pair per
/// the data model: VND-gold stores in grams, USD-gold stores in troy
/// ounces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoldType {
    VndGold,
    UsdGold,
}

impl GoldType {
    pub fn base_unit(&self) -> GoldUnit {
        match self {
            GoldType::VndGold => GoldUnit::Gram,
            GoldType::UsdGold => GoldUnit::TroyOunce,
        }
    }

    pub fn native_currency(&self) -> Currency {
        match self {
            GoldType::VndGold => Currency::Vnd,
            GoldType::UsdGold => Currency::Usd,
        }
    }

    /// The unit this type is conventionally displayed in, which may
    /// differ from its storage base unit (VND-gold stores grams but
    /// displays taels; USD-gold's display unit equals its base unit).
    pub fn display_unit(&self) -> GoldUnit {
        match self {
            GoldType::VndGold => GoldUnit::Tael,
            GoldType::UsdGold => GoldUnit::TroyOunce,
        }
    }
}

/// Convert an exact quantity `amount` expressed in `from_unit` into a
/// scaled integer quantity of `gold_type`'s base unit (grams×10,000 or
/// troy-ounces×10,000).
pub fn quantity_to_scaled_base_units(
    amount: Decimal,
    from_unit: GoldUnit,
    gold_type: GoldType,
) -> Result<i64, Error> {
    let grams = amount * from_unit.grams_per_unit();
    let base_unit_qty = grams / gold_type.base_unit().grams_per_unit();
    round_half_to_even_i64(base_unit_qty * Decimal::from(QUANTITY_SCALE))
}

/// Convert a scaled base-unit quantity back to an exact decimal quantity
/// expressed in `to_unit`.
pub fn scaled_base_units_to_quantity(scaled_base: i64, to_unit: GoldUnit, gold_type: GoldType) -> Decimal {
    let base_unit_qty = Decimal::from(scaled_base) / Decimal::from(QUANTITY_SCALE);
    let grams = base_unit_qty * gold_type.base_unit().grams_per_unit();
    grams / to_unit.grams_per_unit()
}

/// Convert a price quoted per `from_unit` into a price per the type's
/// base unit — the inverse scaling of the corresponding quantity
/// conversion (price per tael ÷ 37.5 = price per gram).
pub fn price_per_unit_to_price_per_base(
    price_per_from_unit: Decimal,
    from_unit: GoldUnit,
    gold_type: GoldType,
) -> Decimal {
    let grams_per_from_unit = from_unit.grams_per_unit();
    let grams_per_base_unit = gold_type.base_unit().grams_per_unit();
    price_per_from_unit * grams_per_base_unit / grams_per_from_unit
}

/// Inverse of [`price_per_unit_to_price_per_base`]: price per base unit
/// converted to a price per `to_unit`, for display.
pub fn price_per_base_to_price_per_unit(
    price_per_base_unit: Decimal,
    to_unit: GoldUnit,
    gold_type: GoldType,
) -> Decimal {
    let grams_per_to_unit = to_unit.grams_per_unit();
    let grams_per_base_unit = gold_type.base_unit().grams_per_unit();
    price_per_base_unit * grams_per_to_unit / grams_per_base_unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_taels_of_vnd_gold_is_750_000_scaled_grams() {
        let scaled = quantity_to_scaled_base_units(dec!(2), GoldUnit::Tael, GoldType::VndGold).unwrap();
        assert_eq!(scaled, 750_000);
    }

    #[test]
    fn roundtrip_quantity_display_matches_input() {
        let scaled = quantity_to_scaled_base_units(dec!(2), GoldUnit::Tael, GoldType::VndGold).unwrap();
        let back = scaled_base_units_to_quantity(scaled, GoldUnit::Tael, GoldType::VndGold);
        assert_eq!(back, dec!(2));
    }

    #[test]
    fn price_per_tael_to_price_per_gram() {
        let price_per_gram =
            price_per_unit_to_price_per_base(dec!(85_000_000), GoldUnit::Tael, GoldType::VndGold);
        assert_eq!(price_per_gram, dec!(85_000_000) / dec!(37.5));
    }
}
