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

//! Exact-decimal monetary values.
//!
//! A [`Money`] is a whole number of minor units (cents). It is built from a
//! `(major, minor)` pair at the API boundary and converted to a single signed
//! integer at the storage boundary. No floating point is involved anywhere.
//!
//! # Example
//!
//! ```
//! use balance_ledger::Money;
//!
//! let amount = Money::new(10, 50).unwrap();
//! assert_eq!(amount.to_minor_units(), 1050);
//! assert_eq!(amount.to_string(), "10.50");
//! ```

use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of minor units in one major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Wire shape of a [`Money`]: an integer part and a two-digit fractional part.
///
/// Both parts carry the sign of the whole value, so `-5.50` is `{-5, -50}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyParts {
    pub major: i64,
    pub minor: i64,
}

/// A monetary amount with exactly two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "MoneyParts", into = "MoneyParts")]
pub struct Money {
    minor_units: i64,
}

impl Money {
    pub const ZERO: Money = Money { minor_units: 0 };

    /// Builds an amount from its major and minor parts.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `minor` is outside `0..=99`.
    /// - [`LedgerError::AmountOutOfRange`] if the value does not fit in `i64` minor units.
    pub fn new(major: i64, minor: i64) -> Result<Self, LedgerError> {
        if !(0..MINOR_PER_MAJOR).contains(&minor) {
            return Err(LedgerError::InvalidAmount);
        }
        major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|units| units.checked_add(minor))
            .map(Money::from_minor_units)
            .ok_or(LedgerError::AmountOutOfRange)
    }

    /// Wraps a raw minor-unit count, as read from storage.
    pub const fn from_minor_units(minor_units: i64) -> Self {
        Money { minor_units }
    }

    pub const fn to_minor_units(self) -> i64 {
        self.minor_units
    }

    /// Integer part, truncated toward zero.
    pub const fn major(self) -> i64 {
        self.minor_units / MINOR_PER_MAJOR
    }

    /// Fractional part in minor units. Carries the sign of the whole value.
    pub const fn minor(self) -> i64 {
        self.minor_units % MINOR_PER_MAJOR
    }

    pub const fn is_zero(self) -> bool {
        self.minor_units == 0
    }

    pub const fn is_negative(self) -> bool {
        self.minor_units < 0
    }

    pub fn parts(self) -> MoneyParts {
        MoneyParts {
            major: self.major(),
            minor: self.minor(),
        }
    }

    /// Value in major units as an exact decimal with scale 2.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.minor_units, 2)
    }

    /// Converts a major-unit decimal with at most two decimal places.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `value` has more than two decimal places.
    /// - [`LedgerError::AmountOutOfRange`] if it does not fit in `i64` minor units.
    pub fn from_decimal(value: Decimal) -> Result<Self, LedgerError> {
        let normalized = value.normalize();
        if normalized.scale() > 2 {
            return Err(LedgerError::InvalidAmount);
        }
        normalized
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|units| units.to_i64())
            .map(Money::from_minor_units)
            .ok_or(LedgerError::AmountOutOfRange)
    }
}

impl TryFrom<MoneyParts> for Money {
    type Error = LedgerError;

    /// Accepts any sign-consistent pair, as produced by [`Money::parts`].
    fn try_from(parts: MoneyParts) -> Result<Self, Self::Error> {
        let MoneyParts { major, minor } = parts;
        if minor.unsigned_abs() >= MINOR_PER_MAJOR.unsigned_abs()
            || (major > 0 && minor < 0)
            || (major < 0 && minor > 0)
        {
            return Err(LedgerError::InvalidAmount);
        }
        major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|units| units.checked_add(minor))
            .map(Money::from_minor_units)
            .ok_or(LedgerError::AmountOutOfRange)
    }
}

impl From<Money> for MoneyParts {
    fn from(money: Money) -> Self {
        money.parts()
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    /// Parses `"10"`, `"10.5"` or `"10.50"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| LedgerError::InvalidAmount)?;
        Money::from_decimal(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:02}",
            sign,
            self.major().unsigned_abs(),
            self.minor().unsigned_abs()
        )
    }
}
