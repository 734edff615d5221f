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

//! Read-only balance and history lookups.
//!
//! Queries read committed state directly, without a transaction. A balance
//! can optionally be converted to another currency through a [`RateSource`];
//! conversion multiplies the minor-unit balance by the rate as an exact
//! decimal and rounds half-to-even to whole minor units.

use crate::base::UserId;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, RateError, StoreError};
use crate::money::Money;
use crate::rates::RateSource;
use crate::store::{LedgerEntry, LedgerStore, StoreResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{Span, error, info, info_span, warn};

pub struct QueryService<S, R> {
    store: Arc<S>,
    rates: R,
    config: LedgerConfig,
    span: Span,
}

impl<S: LedgerStore, R: RateSource> QueryService<S, R> {
    pub fn new(store: Arc<S>, rates: R, config: LedgerConfig) -> Self {
        Self::with_span(store, rates, config, info_span!("query"))
    }

    pub fn with_span(store: Arc<S>, rates: R, config: LedgerConfig, span: Span) -> Self {
        QueryService {
            store,
            rates,
            config,
            span,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current balance of a user, optionally converted to `currency`.
    ///
    /// An empty or blank currency code means no conversion.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UserNotFound`] - The user has no account.
    /// - [`LedgerError::UnknownCurrency`] - The rate source does not know the code.
    /// - [`LedgerError::RateUnavailable`] - Rates could not be fetched.
    /// - [`LedgerError::Store`] - Storage failure.
    pub fn balance(&self, user_id: UserId, currency: Option<&str>) -> Result<Money, LedgerError> {
        let _entered = self.span.enter();
        info!(%user_id, ?currency, "reading balance");

        self.ensure_exists(user_id)?;
        let balance = match self.store.get_balance(user_id) {
            Err(StoreError::NotFound(_)) => return Err(LedgerError::UserNotFound),
            other => self.internal(other)?,
        };

        let code = currency
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty());
        let Some(code) = code else {
            return Ok(Money::from_minor_units(balance));
        };

        let rate = self.rates.rate(&code).map_err(|err| {
            match &err {
                RateError::UnknownCurrency(_) => warn!(%code, "unknown currency"),
                RateError::Unavailable(reason) => error!(%code, %reason, "rates unavailable"),
            }
            LedgerError::from(err)
        })?;
        convert(balance, rate)
    }

    /// A page of the user's ledger entries, newest first.
    ///
    /// Missing `limit`/`offset` fall back to the configured defaults and the
    /// limit is clamped to [`LedgerConfig::max_page_limit`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UserNotFound`] - The user has no account.
    /// - [`LedgerError::Store`] - Storage failure.
    pub fn transactions(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let _entered = self.span.enter();
        let page = self.config.page(limit, offset);
        info!(%user_id, limit = page.limit, offset = page.offset, "listing transactions");

        self.ensure_exists(user_id)?;
        self.internal(self.store.list_entries(user_id, page))
    }

    fn ensure_exists(&self, user_id: UserId) -> Result<(), LedgerError> {
        if self.internal(self.store.count_accounts(user_id))? != 1 {
            return Err(LedgerError::UserNotFound);
        }
        Ok(())
    }

    fn internal<T>(&self, result: StoreResult<T>) -> Result<T, LedgerError> {
        result.map_err(|err| {
            error!(error = %err, "storage failure");
            LedgerError::Store(err)
        })
    }
}

/// Converts a minor-unit balance at `rate`, rounding half-to-even to whole minor units.
pub fn convert(balance: i64, rate: Decimal) -> Result<Money, LedgerError> {
    Decimal::from(balance)
        .checked_mul(rate)
        .map(|value| value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
        .and_then(|value| value.to_i64())
        .map(Money::from_minor_units)
        .ok_or(LedgerError::ConversionOverflow)
}
