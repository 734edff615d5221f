// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Currency rate lookup.
//!
//! Rates are "units of the target currency per one unit of the ledger's base
//! currency". Lookups are best-effort: an unknown code is the caller's fault,
//! anything else means rates are unavailable. Neither outcome touches the
//! ledger.

use crate::error::RateError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

/// Source of exchange rates.
pub trait RateSource {
    /// Rate for an upper-case currency code.
    fn rate(&self, code: &str) -> Result<Decimal, RateError>;
}

impl<R: RateSource + ?Sized> RateSource for Arc<R> {
    fn rate(&self, code: &str) -> Result<Decimal, RateError> {
        (**self).rate(code)
    }
}

/// A rate source that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRates;

impl RateSource for NoRates {
    fn rate(&self, _code: &str) -> Result<Decimal, RateError> {
        Err(RateError::Unavailable("no rate source configured".to_string()))
    }
}

/// Fixed in-memory rate table.
///
/// # Example
///
/// ```
/// use balance_ledger::{RateSource, StaticRates};
/// use rust_decimal::Decimal;
///
/// let rates = StaticRates::new().with_rate("usd", Decimal::new(135, 4));
/// assert_eq!(rates.rate("USD").unwrap(), Decimal::new(135, 4));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
struct RateRecord {
    code: String,
    rate: Decimal,
}

impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, code: &str, rate: Decimal) -> Self {
        self.insert(code, rate);
        self
    }

    pub fn insert(&mut self, code: &str, rate: Decimal) {
        self.rates.insert(code.trim().to_uppercase(), rate);
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Loads a `code,rate` CSV with a header row.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .has_headers(true)
            .from_reader(reader);

        let mut rates = StaticRates::new();
        for record in rdr.deserialize::<RateRecord>() {
            let record = record?;
            rates.insert(&record.code, record.rate);
        }
        Ok(rates)
    }
}

impl RateSource for StaticRates {
    fn rate(&self, code: &str) -> Result<Decimal, RateError> {
        self.rates
            .get(&code.trim().to_uppercase())
            .copied()
            .ok_or_else(|| RateError::UnknownCurrency(code.to_string()))
    }
}

/// Body of a remote rates response: `{"base": "RUB", "date": "...", "rates": {"USD": 0.0135}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateTable {
    pub base: String,
    #[serde(default)]
    pub date: Option<String>,
    pub rates: HashMap<String, serde_json::Number>,
}

impl RateTable {
    pub fn from_json(body: &str) -> Result<Self, RateError> {
        serde_json::from_str(body).map_err(|err| RateError::Unavailable(err.to_string()))
    }

    /// Looks up a rate, parsing the JSON number exactly rather than through `f64`.
    pub fn rate(&self, code: &str) -> Result<Decimal, RateError> {
        let number = self
            .rates
            .get(code)
            .ok_or_else(|| RateError::UnknownCurrency(code.to_string()))?;
        let text = number.to_string();
        let rate = Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| RateError::Unavailable(format!("malformed rate for {code}: {text}")))?;
        if rate <= Decimal::ZERO {
            return Err(RateError::Unavailable(format!(
                "non-positive rate for {code}: {rate}"
            )));
        }
        Ok(rate)
    }
}

#[cfg(feature = "remote-rates")]
pub use remote::HttpRates;

#[cfg(feature = "remote-rates")]
mod remote {
    use super::{RateSource, RateTable};
    use crate::error::RateError;
    use reqwest::blocking::Client;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tracing::warn;

    /// Fetches the rate table over HTTP on every lookup.
    #[derive(Debug, Clone)]
    pub struct HttpRates {
        client: Client,
        url: String,
    }

    impl HttpRates {
        pub const DEFAULT_URL: &'static str = "https://api.exchangeratesapi.io/latest?base=RUB";

        pub fn new(url: impl Into<String>) -> Result<Self, RateError> {
            let client = Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .map_err(|err| RateError::Unavailable(err.to_string()))?;
            Ok(Self {
                client,
                url: url.into(),
            })
        }

        fn fetch(&self) -> Result<RateTable, RateError> {
            self.client
                .get(&self.url)
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.json::<RateTable>())
                .map_err(|err| {
                    warn!(url = %self.url, error = %err, "rate fetch failed");
                    RateError::Unavailable(err.to_string())
                })
        }
    }

    impl RateSource for HttpRates {
        fn rate(&self, code: &str) -> Result<Decimal, RateError> {
            self.fetch()?.rate(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    #[test]
    fn static_rates_normalize_codes() {
        let rates = StaticRates::new().with_rate(" eur ", dec!(0.011));
        assert_eq!(rates.rate("EUR"), Ok(dec!(0.011)));
        assert_eq!(rates.rate("eur"), Ok(dec!(0.011)));
        assert_eq!(
            rates.rate("GBP"),
            Err(RateError::UnknownCurrency("GBP".to_string()))
        );
    }

    #[test]
    fn static_rates_from_csv() {
        let csv = "code,rate\nUSD,0.0135\n eur , 0.0124 \n";
        let rates = StaticRates::from_csv(Cursor::new(csv)).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates.rate("USD"), Ok(dec!(0.0135)));
        assert_eq!(rates.rate("EUR"), Ok(dec!(0.0124)));
    }

    #[test]
    fn static_rates_from_csv_rejects_bad_rate() {
        let csv = "code,rate\nUSD,abc\n";
        assert!(StaticRates::from_csv(Cursor::new(csv)).is_err());
    }

    #[test]
    fn no_rates_is_unavailable() {
        assert!(matches!(NoRates.rate("USD"), Err(RateError::Unavailable(_))));
    }

    #[test]
    fn rate_table_keeps_digits_beyond_f64() {
        let table = RateTable::from_json(
            r#"{"base":"RUB","rates":{"USD":0.0123456789012345678901,"EUR":0.1}}"#,
        )
        .unwrap();
        assert_eq!(table.rate("USD"), Ok(dec!(0.0123456789012345678901)));
        assert_eq!(table.rate("EUR"), Ok(dec!(0.1)));
    }

    #[test]
    fn rate_table_parses_numbers_exactly() {
        let table = RateTable::from_json(
            r#"{"base":"RUB","date":"2020-11-13","rates":{"USD":0.0129,"JPY":1.3603,"TINY":1e-7}}"#,
        )
        .unwrap();
        assert_eq!(table.base, "RUB");
        assert_eq!(table.rate("USD"), Ok(dec!(0.0129)));
        assert_eq!(table.rate("JPY"), Ok(dec!(1.3603)));
        assert_eq!(table.rate("TINY"), Ok(dec!(0.0000001)));
        assert_eq!(
            table.rate("XXX"),
            Err(RateError::UnknownCurrency("XXX".to_string()))
        );
    }

    #[test]
    fn rate_table_rejects_non_positive_rates() {
        let table = RateTable::from_json(r#"{"base":"RUB","rates":{"BAD":0}}"#).unwrap();
        assert!(matches!(table.rate("BAD"), Err(RateError::Unavailable(_))));
    }

    #[test]
    fn malformed_body_is_unavailable() {
        assert!(matches!(
            RateTable::from_json("<html>"),
            Err(RateError::Unavailable(_))
        ));
    }
}
