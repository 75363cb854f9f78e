//! Currency codes and their minor-unit multipliers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed set of the currencies this backend understands. Wallets,
/// transactions, and FX conversions are all pinned to one of these —
/// encoding it as a sum type rather than a free-form ISO string catches
/// typos at compile time and keeps `match`es exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Vnd,
    Usd,
    Eur,
    Gbp,
    Jpy,
}

impl Currency {
    /// ISO-4217-style three letter code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Vnd => "VND",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
        }
    }

    pub fn parse_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "VND" => Some(Currency::Vnd),
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            "JPY" => Some(Currency::Jpy),
            _ => None,
        }
    }

    /// How many minor units make up one major unit (e.g. 100 cents per
    /// USD, 1 dong per VND — VND and JPY have no subdivision in practice).
    pub const fn minor_unit_multiplier(&self) -> i64 {
        match self {
            Currency::Vnd => 1,
            Currency::Usd => 100,
            Currency::Eur => 100,
            Currency::Gbp => 100,
            Currency::Jpy => 1,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_code() {
        for c in [Currency::Vnd, Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Jpy] {
            assert_eq!(Currency::parse_code(c.code()), Some(c));
        }
    }
}
