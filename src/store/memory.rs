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

//! In-process [`LedgerStore`] implementation.
//!
//! Each account row sits behind its own [`Mutex`]; rows live in a [`DashMap`]
//! so unrelated accounts never contend. An [`InMemoryTxn`] only buffers
//! writes. On commit the touched rows are locked in ascending [`UserId`]
//! order, every buffered operation is applied to the row's current value, the
//! non-negative constraint is checked, and only then are the new balances and
//! the entries published together while the row locks are still held.
//! Readers take the same row lock, so a commit is never seen half applied.
//!
//! A commit touching a user with no account links an empty row into the map
//! before locking it. If the commit is rejected the empty row is unlinked
//! again, and a committer that finds its locked row unlinked starts over.

use super::{LedgerEntry, LedgerStore, StoreResult};
use crate::base::{EntryId, UserId};
use crate::config::Page;
use crate::error::StoreError;
use crate::money::Money;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A balance row. `None` until the first committed increase creates it.
type Row = Arc<Mutex<Option<i64>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BalanceOp {
    Increase(i64),
    Decrease(i64),
}

#[derive(Debug, Clone)]
struct PendingEntry {
    id: EntryId,
    user_id: UserId,
    delta: i64,
}

/// Buffered writes of one open transaction.
#[derive(Debug, Default)]
pub struct InMemoryTxn {
    /// Ordered by user so commit always locks rows in the same order.
    ops: BTreeMap<UserId, Vec<BalanceOp>>,
    entries: Vec<PendingEntry>,
}

impl InMemoryTxn {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct InMemoryStore {
    accounts: DashMap<UserId, Row>,
    entries: DashMap<UserId, Vec<LedgerEntry>>,
    /// Timestamp handed to the last commit.
    clock: Mutex<DateTime<Utc>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            entries: DashMap::new(),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Sum of every committed balance, in minor units.
    pub fn total_balance(&self) -> i128 {
        let rows: Vec<Row> = self
            .accounts
            .iter()
            .map(|row| Arc::clone(row.value()))
            .collect();
        rows.iter()
            .map(|row| {
                let balance = *row.lock();
                balance.map_or(0, i128::from)
            })
            .sum()
    }

    fn row(&self, user_id: UserId) -> Row {
        Arc::clone(self.accounts.entry(user_id).or_default().value())
    }

    fn existing_row(&self, user_id: UserId) -> Option<Row> {
        self.accounts.get(&user_id).map(|row| Arc::clone(row.value()))
    }

    /// True if every locked row is still the one linked for its user.
    fn rows_current<'a>(&self, users: impl Iterator<Item = &'a UserId>, rows: &[Row]) -> bool {
        users.zip(rows).all(|(user_id, row)| {
            self.accounts
                .get(user_id)
                .is_some_and(|current| Arc::ptr_eq(current.value(), row))
        })
    }

    /// Unlinks rows that are still empty. Called with their guards held.
    fn unlink_empty<'a>(
        &self,
        users: impl Iterator<Item = &'a UserId>,
        rows: &[Row],
        guards: &[MutexGuard<'_, Option<i64>>],
    ) {
        for ((user_id, row), guard) in users.zip(rows).zip(guards) {
            if guard.is_none() {
                self.accounts
                    .remove_if(user_id, |_, current| Arc::ptr_eq(current, row));
            }
        }
    }

    /// Strictly increasing commit timestamps.
    fn tick(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock();
        let now = Utc::now();
        let stamp = if now > *last {
            now
        } else {
            *last + TimeDelta::microseconds(1)
        };
        *last = stamp;
        stamp
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Replays one user's buffered operations on top of the committed balance.
fn apply_ops(
    user_id: UserId,
    current: Option<i64>,
    ops: &[BalanceOp],
) -> StoreResult<Option<i64>> {
    let mut balance = current;
    for op in ops {
        let next = match (*op, balance) {
            (BalanceOp::Increase(delta), current) => current.unwrap_or(0).checked_add(delta),
            (BalanceOp::Decrease(delta), Some(current)) => current.checked_sub(delta),
            (BalanceOp::Decrease(_), None) => return Err(StoreError::NotFound(user_id)),
        };
        let next = next.ok_or(StoreError::Overflow(user_id))?;
        if next < 0 {
            return Err(StoreError::NegativeBalance(user_id));
        }
        balance = Some(next);
    }
    Ok(balance)
}

/// New balance of every touched row, in key order.
fn apply_all(
    ops: &BTreeMap<UserId, Vec<BalanceOp>>,
    guards: &[MutexGuard<'_, Option<i64>>],
) -> StoreResult<Vec<Option<i64>>> {
    ops.iter()
        .zip(guards)
        .map(|((user_id, user_ops), guard)| apply_ops(*user_id, **guard, user_ops))
        .collect()
}

impl LedgerStore for InMemoryStore {
    type Txn = InMemoryTxn;

    fn begin(&self) -> StoreResult<InMemoryTxn> {
        Ok(InMemoryTxn::default())
    }

    fn commit(&self, txn: InMemoryTxn) -> StoreResult<()> {
        let InMemoryTxn { ops, entries } = txn;

        loop {
            let rows: Vec<Row> = ops.keys().map(|user_id| self.row(*user_id)).collect();
            let mut guards: Vec<MutexGuard<'_, Option<i64>>> =
                rows.iter().map(|row| row.lock()).collect();

            if !self.rows_current(ops.keys(), &rows) {
                debug!("row unlinked before lock, retrying commit");
                drop(guards);
                continue;
            }

            let updated = match apply_all(&ops, &guards) {
                Ok(updated) => updated,
                Err(err) => {
                    debug!(error = %err, "commit rejected");
                    self.unlink_empty(ops.keys(), &rows, &guards);
                    return Err(err);
                }
            };

            let created_at = self.tick();
            for (guard, balance) in guards.iter_mut().zip(updated) {
                **guard = balance;
            }
            for pending in entries {
                self.entries
                    .entry(pending.user_id)
                    .or_default()
                    .push(LedgerEntry {
                        id: pending.id,
                        user_id: pending.user_id,
                        delta: Money::from_minor_units(pending.delta),
                        created_at,
                    });
            }

            return Ok(());
        }
    }

    fn rollback(&self, txn: InMemoryTxn) -> StoreResult<()> {
        drop(txn);
        Ok(())
    }

    fn increase_balance(
        &self,
        txn: &mut InMemoryTxn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<()> {
        txn.ops
            .entry(user_id)
            .or_default()
            .push(BalanceOp::Increase(delta));
        Ok(())
    }

    fn decrease_balance(
        &self,
        txn: &mut InMemoryTxn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<()> {
        txn.ops
            .entry(user_id)
            .or_default()
            .push(BalanceOp::Decrease(delta));
        Ok(())
    }

    fn get_balance(&self, user_id: UserId) -> StoreResult<i64> {
        let row = self
            .existing_row(user_id)
            .ok_or(StoreError::NotFound(user_id))?;
        let balance = *row.lock();
        balance.ok_or(StoreError::NotFound(user_id))
    }

    fn count_accounts(&self, user_id: UserId) -> StoreResult<usize> {
        let Some(row) = self.existing_row(user_id) else {
            return Ok(0);
        };
        let exists = row.lock().is_some();
        Ok(usize::from(exists))
    }

    fn append_entry(
        &self,
        txn: &mut InMemoryTxn,
        user_id: UserId,
        delta: i64,
    ) -> StoreResult<EntryId> {
        let id = EntryId::generate();
        txn.entries.push(PendingEntry { id, user_id, delta });
        Ok(id)
    }

    fn list_entries(&self, user_id: UserId, page: Page) -> StoreResult<Vec<LedgerEntry>> {
        let row = self.existing_row(user_id);
        let _guard = row.as_ref().map(|row| row.lock());
        let mut entries = self
            .entries
            .get(&user_id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default();
        entries.sort_by(LedgerEntry::history_order);
        Ok(entries
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(store: &InMemoryStore, user_id: UserId, amount: i64) {
        let mut txn = store.begin().unwrap();
        store.increase_balance(&mut txn, user_id, amount).unwrap();
        store.append_entry(&mut txn, user_id, amount).unwrap();
        store.commit(txn).unwrap();
    }

    #[test]
    fn increase_creates_account_on_commit() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        assert_eq!(store.count_accounts(user), Ok(0));
        assert_eq!(store.get_balance(user), Err(StoreError::NotFound(user)));

        credit(&store, user, 1050);

        assert_eq!(store.count_accounts(user), Ok(1));
        assert_eq!(store.get_balance(user), Ok(1050));
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let store = InMemoryStore::new();
        let user = UserId::random();

        let mut txn = store.begin().unwrap();
        store.increase_balance(&mut txn, user, 500).unwrap();
        store.append_entry(&mut txn, user, 500).unwrap();

        assert_eq!(store.count_accounts(user), Ok(0));
        assert!(store.list_entries(user, Page::default()).unwrap().is_empty());

        store.rollback(txn).unwrap();
        assert_eq!(store.count_accounts(user), Ok(0));
    }

    #[test]
    fn dropped_txn_discards_writes() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        {
            let mut txn = store.begin().unwrap();
            store.increase_balance(&mut txn, user, 500).unwrap();
        }
        assert_eq!(store.count_accounts(user), Ok(0));
    }

    #[test]
    fn negative_balance_aborts_whole_commit() {
        let store = InMemoryStore::new();
        let sender = UserId::random();
        let receiver = UserId::random();
        credit(&store, sender, 100);

        let mut txn = store.begin().unwrap();
        store.decrease_balance(&mut txn, sender, 150).unwrap();
        store.append_entry(&mut txn, sender, -150).unwrap();
        store.increase_balance(&mut txn, receiver, 150).unwrap();
        store.append_entry(&mut txn, receiver, 150).unwrap();

        assert_eq!(store.commit(txn), Err(StoreError::NegativeBalance(sender)));
        assert_eq!(store.get_balance(sender), Ok(100));
        assert_eq!(store.count_accounts(receiver), Ok(0));
        assert_eq!(store.list_entries(sender, Page::default()).unwrap().len(), 1);
        assert!(store.list_entries(receiver, Page::default()).unwrap().is_empty());
    }

    #[test]
    fn decrease_without_account_is_not_found() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        let mut txn = store.begin().unwrap();
        store.decrease_balance(&mut txn, user, 1).unwrap();
        assert_eq!(store.commit(txn), Err(StoreError::NotFound(user)));
        assert_eq!(store.count_accounts(user), Ok(0));
        assert!(!store.accounts.contains_key(&user));
    }

    #[test]
    fn rejected_commit_unlinks_new_rows() {
        let store = InMemoryStore::new();
        let sender = UserId::random();
        let receiver = UserId::random();
        credit(&store, sender, 100);

        let mut txn = store.begin().unwrap();
        store.decrease_balance(&mut txn, sender, 150).unwrap();
        store.increase_balance(&mut txn, receiver, 150).unwrap();
        assert_eq!(store.commit(txn), Err(StoreError::NegativeBalance(sender)));

        assert!(!store.accounts.contains_key(&receiver));
        assert!(store.accounts.contains_key(&sender));
        assert_eq!(store.accounts.len(), 1);

        // the receiver can still be created afterwards
        credit(&store, receiver, 5);
        assert_eq!(store.get_balance(receiver), Ok(5));
    }

    #[test]
    fn stale_row_is_not_current() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        let stale = store.row(user);
        store.accounts.remove(&user);
        let fresh = store.row(user);

        assert!(!store.rows_current([user].iter(), &[stale]));
        assert!(store.rows_current([user].iter(), &[fresh]));
    }

    #[test]
    fn overflow_is_reported() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        credit(&store, user, i64::MAX);

        let mut txn = store.begin().unwrap();
        store.increase_balance(&mut txn, user, 1).unwrap();
        assert_eq!(store.commit(txn), Err(StoreError::Overflow(user)));
        assert_eq!(store.get_balance(user), Ok(i64::MAX));
    }

    #[test]
    fn entries_are_listed_newest_first() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        for amount in [100, 200, 300] {
            credit(&store, user, amount);
        }

        let deltas: Vec<i64> = store
            .list_entries(user, Page::default())
            .unwrap()
            .iter()
            .map(|entry| entry.delta.to_minor_units())
            .collect();
        assert_eq!(deltas, vec![300, 200, 100]);
    }

    #[test]
    fn entries_of_one_commit_share_timestamp_and_sort_by_delta() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        let mut txn = store.begin().unwrap();
        store.increase_balance(&mut txn, user, 100).unwrap();
        store.append_entry(&mut txn, user, 300).unwrap();
        store.append_entry(&mut txn, user, -200).unwrap();
        store.commit(txn).unwrap();

        let entries = store.list_entries(user, Page::default()).unwrap();
        assert_eq!(entries[0].created_at, entries[1].created_at);
        assert_eq!(entries[0].delta.to_minor_units(), -200);
        assert_eq!(entries[1].delta.to_minor_units(), 300);
    }

    #[test]
    fn pagination_windows_the_history() {
        let store = InMemoryStore::new();
        let user = UserId::random();
        for amount in 1..=5 {
            credit(&store, user, amount);
        }

        let page = store.list_entries(user, Page::new(2, 1)).unwrap();
        let deltas: Vec<i64> = page.iter().map(|e| e.delta.to_minor_units()).collect();
        assert_eq!(deltas, vec![4, 3]);

        assert!(store.list_entries(user, Page::new(10, 10)).unwrap().is_empty());
        assert!(store.list_entries(user, Page::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn commit_timestamps_increase() {
        let store = InMemoryStore::new();
        let a = store.tick();
        let b = store.tick();
        assert!(b > a);
    }

    #[test]
    fn total_balance_sums_accounts() {
        let store = InMemoryStore::new();
        credit(&store, UserId::random(), 100);
        credit(&store, UserId::random(), 250);
        assert_eq!(store.total_balance(), 350);
    }
}
