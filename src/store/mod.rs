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

//! Ledger storage contract.
//!
//! A [`LedgerStore`] keeps one balance row per user plus an append-only log of
//! [`LedgerEntry`] records. Writes happen inside a transaction (`Txn`) and
//! become visible to other callers only on [`LedgerStore::commit`], all at
//! once. Single-row reads run outside any transaction and see the latest
//! committed state.
//!
//! The store does not decide whether a withdrawal is allowed; the engine does.
//! It does, however, own one constraint: a commit that would leave any balance
//! below zero is rejected as a whole with [`StoreError::NegativeBalance`].

use crate::base::{EntryId, UserId};
use crate::config::Page;
use crate::error::StoreError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

mod memory;

pub use memory::{InMemoryStore, InMemoryTxn};

pub type StoreResult<T> = Result<T, StoreError>;

/// One immutable, signed balance change of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub delta: Money,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// History order: newest first, ties broken by ascending delta.
    pub fn history_order(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.delta.cmp(&b.delta))
    }
}

/// Transactional key/value storage for balances and their history.
///
/// Implementations must make every write issued through a `Txn` all-or-nothing
/// and invisible to other callers until commit (read-committed or stronger).
pub trait LedgerStore {
    /// An open atomic unit. Dropping it without committing discards its writes.
    type Txn;

    fn begin(&self) -> StoreResult<Self::Txn>;

    fn commit(&self, txn: Self::Txn) -> StoreResult<()>;

    fn rollback(&self, txn: Self::Txn) -> StoreResult<()>;

    /// Adds `delta` minor units to the user's balance, creating the account if absent.
    fn increase_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<()>;

    /// Subtracts `delta` minor units from an existing account.
    fn decrease_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<()>;

    /// Latest committed balance.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the user has no account.
    fn get_balance(&self, user_id: UserId) -> StoreResult<i64>;

    /// Number of account rows for the user: 0 or 1.
    fn count_accounts(&self, user_id: UserId) -> StoreResult<usize>;

    fn append_entry(
        &self,
        txn: &mut Self::Txn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<EntryId>;

    /// Committed entries of one user in history order, windowed by `page`.
    fn list_entries(&self, user_id: UserId, page: Page) -> StoreResult<Vec<LedgerEntry>>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<S> {
    type Txn = S::Txn;

    fn begin(&self) -> StoreResult<Self::Txn> {
        (**self).begin()
    }

    fn commit(&self, txn: Self::Txn) -> StoreResult<()> {
        (**self).commit(txn)
    }

    fn rollback(&self, txn: Self::Txn) -> StoreResult<()> {
        (**self).rollback(txn)
    }

    fn increase_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<()> {
        (**self).increase_balance(txn, user_id, delta)
    }

    fn decrease_balance(
        &self,
        txn: &mut Self::Txn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<()> {
        (**self).decrease_balance(txn, user_id, delta)
    }

    fn get_balance(&self, user_id: UserId) -> StoreResult<i64> {
        (**self).get_balance(user_id)
    }

    fn count_accounts(&self, user_id: UserId) -> StoreResult<usize> {
        (**self).count_accounts(user_id)
    }

    fn append_entry(
        &self,
        txn: &mut Self::Txn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<EntryId> {
        (**self).append_entry(txn, user_id, delta)
    }

    fn list_entries(&self, user_id: UserId, page: Page) -> StoreResult<Vec<LedgerEntry>> {
        (**self).list_entries(user_id, page)
    }
}
