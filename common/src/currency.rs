use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Display currencies. Prices are always stored in the shop's base currency (PHP, centavos).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    Php,
    Usd,
    Eur,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Currency {
    pub fn all() -> &'static [Currency] {
        &[Currency::Php, Currency::Usd, Currency::Eur]
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Php => "PHP",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Php => "₱",
            Currency::Usd => "$",
            Currency::Eur => "€",
        }
    }

    pub fn from_code(code: &str) -> Option<Currency> {
        Currency::all()
            .iter()
            .copied()
            .find(|c| c.code().eq_ignore_ascii_case(code))
    }
}

/// Exchange rates as returned by the conversion lookup: units of each currency per base unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub rates: BTreeMap<String, f64>,
}

impl RateTable {
    /// Rate from the base currency to `currency`. The base itself is always 1.
    pub fn rate(&self, currency: Currency) -> Option<f64> {
        if currency.code().eq_ignore_ascii_case(&self.base) {
            return Some(1.0);
        }
        self.rates
            .get(currency.code())
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
    }
}

/// Format an amount (base currency, minor units) for display.
///
/// Falls back to the base currency when no rate is known.
pub fn format_amount(amount_minor: u64, currency: Currency, rates: &RateTable) -> String {
    let major = amount_minor as f64 / 100.0;
    match rates.rate(currency) {
        Some(rate) => format!("{}{:.2}", currency.symbol(), major * rate),
        None => format!("{}{major:.2}", Currency::Php.symbol()),
    }
}
