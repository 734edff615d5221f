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

//! Accounting engine.
//!
//! The [`Engine`] is the only component that moves money. Each operation
//! validates its input, runs the cheap pre-checks against committed state,
//! then performs every balance mutation together with its ledger entry
//! inside a single store transaction.
//!
//! # Operations
//!
//! - **Credit**: Adds funds, creating the account on first use.
//! - **Withdraw**: Removes funds from an existing account.
//! - **Transfer**: Moves funds between two users. Four writes, one commit.
//!
//! # Consistency
//!
//! Pre-checks (account exists, sufficient funds) read committed state outside
//! the transaction, so concurrent operations may both pass them. The store
//! re-checks the non-negative constraint atomically at commit; a violation
//! is reported as [`LedgerError::InsufficientFunds`] and nothing is applied.
//! The engine holds no locks of its own and never retries.

use crate::base::UserId;
use crate::error::{LedgerError, StoreError};
use crate::money::Money;
use crate::store::{LedgerStore, StoreResult};
use std::sync::Arc;
use tracing::{Span, debug, error, info, info_span, warn};

/// Executes balance-changing operations against a [`LedgerStore`].
///
/// # Invariants
///
/// - A balance is never driven below zero by a withdrawal or transfer.
/// - Every balance change is paired with exactly one ledger entry of the same
///   signed amount, committed in the same transaction.
/// - A transfer either applies all four writes or none.
pub struct Engine<S> {
    store: Arc<S>,
    span: Span,
}

impl<S: LedgerStore> Engine<S> {
    /// Creates an engine logging under an `accounting` span.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_span(store, info_span!("accounting"))
    }

    /// Creates an engine whose events are all emitted inside `span`.
    pub fn with_span(store: Arc<S>, span: Span) -> Self {
        Engine { store, span }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Credits `amount` to the user, creating the account if needed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] / [`LedgerError::NegativeAmount`] - Amount is not positive.
    /// - [`LedgerError::Store`] - Storage failure; nothing was applied.
    pub fn credit(&self, user_id: UserId, amount: Money) -> Result<(), LedgerError> {
        let _entered = self.span.enter();
        info!(%user_id, %amount, "crediting funds");

        let units = validate_amount(amount)?;
        self.atomically("credit", |store, txn| {
            store.increase_balance(txn, user_id, units)?;
            store.append_entry(txn, user_id, units)?;
            Ok(())
        })?;

        info!(%user_id, %amount, "funds credited");
        Ok(())
    }

    /// Withdraws `amount` from an existing account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] / [`LedgerError::NegativeAmount`] - Amount is not positive.
    /// - [`LedgerError::UserNotFound`] - The user has no account.
    /// - [`LedgerError::InsufficientFunds`] - The balance is lower than `amount`.
    /// - [`LedgerError::Store`] - Storage failure; nothing was applied.
    pub fn withdraw(&self, user_id: UserId, amount: Money) -> Result<(), LedgerError> {
        let _entered = self.span.enter();
        info!(%user_id, %amount, "withdrawing funds");

        let units = validate_amount(amount)?;
        if self.internal(self.store.count_accounts(user_id))? != 1 {
            return Err(LedgerError::UserNotFound);
        }
        self.ensure_funds(user_id, units)?;

        self.atomically("withdraw", |store, txn| {
            store.decrease_balance(txn, user_id, units)?;
            store.append_entry(txn, user_id, -units)?;
            Ok(())
        })?;

        info!(%user_id, %amount, "funds withdrawn");
        Ok(())
    }

    /// Moves `amount` from `sender_id` to `receiver_id`.
    ///
    /// The receiver's account is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] / [`LedgerError::NegativeAmount`] - Amount is not positive.
    /// - [`LedgerError::SelfTransfer`] - Sender and receiver are the same user.
    /// - [`LedgerError::UserNotFound`] - The sender has no account.
    /// - [`LedgerError::InsufficientFunds`] - The sender's balance is lower than `amount`.
    /// - [`LedgerError::Store`] - Storage failure; nothing was applied.
    pub fn transfer(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Money,
    ) -> Result<(), LedgerError> {
        let _entered = self.span.enter();
        info!(%sender_id, %receiver_id, %amount, "transferring funds");

        let units = validate_amount(amount)?;
        if sender_id == receiver_id {
            return Err(LedgerError::SelfTransfer);
        }
        self.ensure_funds(sender_id, units)?;

        self.atomically("transfer", |store, txn| {
            store.decrease_balance(txn, sender_id, units)?;
            store.append_entry(txn, sender_id, -units)?;
            store.increase_balance(txn, receiver_id, units)?;
            store.append_entry(txn, receiver_id, units)?;
            Ok(())
        })?;

        info!(%sender_id, %receiver_id, %amount, "funds transferred");
        Ok(())
    }

    /// Advisory funds check against committed state.
    fn ensure_funds(&self, user_id: UserId, units: i64) -> Result<(), LedgerError> {
        let balance = match self.store.get_balance(user_id) {
            Err(StoreError::NotFound(_)) => return Err(LedgerError::UserNotFound),
            other => self.internal(other)?,
        };
        if balance < units {
            debug!(%user_id, balance, requested = units, "insufficient funds");
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(())
    }

    /// Logs a storage failure before handing it to the caller.
    fn internal<T>(&self, result: StoreResult<T>) -> Result<T, LedgerError> {
        result.map_err(|err| {
            error!(error = %err, "storage failure");
            LedgerError::Store(err)
        })
    }

    /// Runs `writes` inside one store transaction.
    ///
    /// Rolls back on any write failure. A commit rejected by the store's
    /// balance constraint becomes a validation error; every other failure is
    /// internal.
    fn atomically<F>(&self, operation: &'static str, writes: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&S, &mut S::Txn) -> StoreResult<()>,
    {
        let store = self.store.as_ref();
        let mut txn = store.begin().map_err(|err| {
            error!(operation, error = %err, "cannot open transaction");
            LedgerError::Store(err)
        })?;

        if let Err(err) = writes(store, &mut txn) {
            error!(operation, error = %err, "write failed, rolling back");
            if let Err(rollback_err) = store.rollback(txn) {
                error!(operation, error = %rollback_err, "rollback failed");
            }
            return Err(LedgerError::Store(err));
        }

        store.commit(txn).map_err(|err| match err {
            StoreError::NegativeBalance(user_id) => {
                warn!(operation, %user_id, "commit rejected: balance would become negative");
                LedgerError::InsufficientFunds
            }
            StoreError::NotFound(user_id) => {
                warn!(operation, %user_id, "commit rejected: account disappeared");
                LedgerError::UserNotFound
            }
            err => {
                error!(operation, error = %err, "commit failed");
                LedgerError::Store(err)
            }
        })
    }
}

/// Checks that `amount` can be moved and returns it in minor units.
pub fn validate_amount(amount: Money) -> Result<i64, LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    if amount.is_negative() {
        return Err(LedgerError::NegativeAmount);
    }
    Ok(amount.to_minor_units())
}
