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

//! Error types for ledger operations.
//!
//! Callers only ever see two kinds of failure (see [`ErrorKind`]):
//! validation errors, which are detected before anything is written, and
//! internal errors, whose details are logged but never shown to the caller.

use crate::base::UserId;
use thiserror::Error;

/// Message returned to callers for every internal failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "System error. Contact support";

/// Client-facing classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or a business rule violation. Nothing was written.
    Validation,
    /// Storage or collaborator failure. Any open transaction was rolled back.
    Internal,
}

/// Errors raised by the storage layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No account row exists for the user
    #[error("no account for user {0}")]
    NotFound(UserId),

    /// Committing would leave the account below zero
    #[error("balance of user {0} would become negative")]
    NegativeBalance(UserId),

    /// Balance arithmetic does not fit in `i64`
    #[error("balance of user {0} overflows")]
    Overflow(UserId),

    /// The backend itself failed (connection, I/O, lock poisoning...)
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Errors raised by a currency rate source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("currency {0} does not exist")]
    UnknownCurrency(String),

    #[error("exchange rates unavailable: {0}")]
    Unavailable(String),
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Minor part of an amount is outside `0..=99`, or the amount is not a valid number
    #[error("minor units must be between 0 and 99")]
    InvalidAmount,

    /// Amount does not fit in the ledger's integer range
    #[error("amount is out of range")]
    AmountOutOfRange,

    #[error("amount cannot be zero")]
    ZeroAmount,

    #[error("amount must be positive")]
    NegativeAmount,

    #[error("user does not exist")]
    UserNotFound,

    #[error("insufficient funds to complete this operation")]
    InsufficientFunds,

    #[error("sender and receiver cannot be the same user")]
    SelfTransfer,

    #[error("currency {0} does not exist")]
    UnknownCurrency(String),

    /// Currency rates could not be fetched
    #[error("currency lookup failed: {0}")]
    RateUnavailable(String),

    /// Converted amount does not fit in `i64` minor units
    #[error("converted amount overflows")]
    ConversionOverflow,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount
            | LedgerError::AmountOutOfRange
            | LedgerError::ZeroAmount
            | LedgerError::NegativeAmount
            | LedgerError::UserNotFound
            | LedgerError::InsufficientFunds
            | LedgerError::SelfTransfer
            | LedgerError::UnknownCurrency(_) => ErrorKind::Validation,
            LedgerError::RateUnavailable(_)
            | LedgerError::ConversionOverflow
            | LedgerError::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Message safe to hand back to the caller.
    ///
    /// Internal errors collapse to [`INTERNAL_ERROR_MESSAGE`].
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => self.to_string(),
            ErrorKind::Internal => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<RateError> for LedgerError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::UnknownCurrency(code) => LedgerError::UnknownCurrency(code),
            RateError::Unavailable(reason) => LedgerError::RateUnavailable(reason),
        }
    }
}
