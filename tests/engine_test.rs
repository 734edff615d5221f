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

//! Accounting engine integration tests.

use balance_ledger::{
    ErrorKind, InMemoryStore, Ledger, LedgerConfig, LedgerError, LedgerStore, Money, NoRates,
    UserId,
};
use std::sync::Arc;

fn new_ledger() -> Ledger<InMemoryStore, NoRates> {
    Ledger::new(
        Arc::new(InMemoryStore::new()),
        NoRates,
        LedgerConfig::default(),
    )
}

fn money(major: i64, minor: i64) -> Money {
    Money::new(major, minor).unwrap()
}

fn balance_of(ledger: &Ledger<InMemoryStore, NoRates>, user: UserId) -> Money {
    ledger.query().balance(user, None).unwrap()
}

fn deltas(ledger: &Ledger<InMemoryStore, NoRates>, user: UserId) -> Vec<i64> {
    ledger
        .query()
        .transactions(user, None, None)
        .unwrap()
        .iter()
        .map(|entry| entry.delta.to_minor_units())
        .collect()
}

#[test]
fn test_credit_withdraw_transfer_scenario() {
    let ledger = new_ledger();
    let u1 = UserId::random();
    let u2 = UserId::random();

    ledger.accounting().credit(u1, money(10, 50)).unwrap();
    assert_eq!(balance_of(&ledger, u1), money(10, 50));

    ledger.accounting().withdraw(u1, money(5, 0)).unwrap();
    assert_eq!(balance_of(&ledger, u1), money(5, 50));

    ledger.accounting().transfer(u1, u2, money(5, 50)).unwrap();
    assert_eq!(balance_of(&ledger, u1), Money::ZERO);
    assert_eq!(balance_of(&ledger, u2), money(5, 50));

    assert_eq!(deltas(&ledger, u1), vec![-550, -500, 1050]);
    assert_eq!(deltas(&ledger, u2), vec![550]);
}

#[test]
fn test_credit_accumulates() {
    let ledger = new_ledger();
    let user = UserId::random();

    ledger.accounting().credit(user, money(1, 25)).unwrap();
    ledger.accounting().credit(user, money(0, 75)).unwrap();

    assert_eq!(balance_of(&ledger, user), money(2, 0));
    assert_eq!(deltas(&ledger, user), vec![75, 125]);
}

#[test]
fn test_overdraft_leaves_state_unchanged() {
    let ledger = new_ledger();
    let user = UserId::random();
    ledger.accounting().credit(user, money(5, 0)).unwrap();

    let err = ledger.accounting().withdraw(user, money(10, 0)).unwrap_err();
    assert_eq!(err, LedgerError::InsufficientFunds);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.public_message(), "insufficient funds to complete this operation");

    assert_eq!(balance_of(&ledger, user), money(5, 0));
    assert_eq!(deltas(&ledger, user), vec![500]);
}

#[test]
fn test_transfer_overdraft_leaves_both_sides_unchanged() {
    let ledger = new_ledger();
    let sender = UserId::random();
    let receiver = UserId::random();
    ledger.accounting().credit(sender, money(1, 0)).unwrap();

    let result = ledger.accounting().transfer(sender, receiver, money(1, 1));
    assert_eq!(result, Err(LedgerError::InsufficientFunds));

    assert_eq!(balance_of(&ledger, sender), money(1, 0));
    assert_eq!(ledger.store().count_accounts(receiver), Ok(0));
}

#[test]
fn test_self_transfer_rejected() {
    let ledger = new_ledger();
    let user = UserId::random();
    ledger.accounting().credit(user, money(3, 0)).unwrap();

    let result = ledger.accounting().transfer(user, user, money(1, 0));
    assert_eq!(result, Err(LedgerError::SelfTransfer));
    assert_eq!(balance_of(&ledger, user), money(3, 0));
    assert_eq!(deltas(&ledger, user).len(), 1);
}

#[test]
fn test_zero_amount_writes_nothing() {
    let ledger = new_ledger();
    let user = UserId::random();
    let other = UserId::random();

    assert_eq!(
        ledger.accounting().credit(user, Money::ZERO),
        Err(LedgerError::ZeroAmount)
    );
    assert_eq!(ledger.store().count_accounts(user), Ok(0));

    ledger.accounting().credit(user, money(1, 0)).unwrap();
    assert_eq!(
        ledger.accounting().withdraw(user, Money::ZERO),
        Err(LedgerError::ZeroAmount)
    );
    assert_eq!(
        ledger.accounting().transfer(user, other, Money::ZERO),
        Err(LedgerError::ZeroAmount)
    );
    assert_eq!(deltas(&ledger, user), vec![100]);
    assert_eq!(ledger.store().count_accounts(other), Ok(0));
}

#[test]
fn test_negative_amount_rejected() {
    let ledger = new_ledger();
    let user = UserId::random();
    ledger.accounting().credit(user, money(1, 0)).unwrap();

    let negative = Money::from_minor_units(-100);
    assert_eq!(
        ledger.accounting().credit(user, negative),
        Err(LedgerError::NegativeAmount)
    );
    assert_eq!(
        ledger.accounting().withdraw(user, negative),
        Err(LedgerError::NegativeAmount)
    );
    assert_eq!(balance_of(&ledger, user), money(1, 0));
}

#[test]
fn test_unknown_user_is_validation_error() {
    let ledger = new_ledger();
    let stranger = UserId::random();

    let err = ledger.query().balance(stranger, None).unwrap_err();
    assert_eq!(err, LedgerError::UserNotFound);
    assert!(err.is_validation());

    assert_eq!(
        ledger.query().transactions(stranger, None, None),
        Err(LedgerError::UserNotFound)
    );
    assert_eq!(
        ledger.accounting().withdraw(stranger, money(1, 0)),
        Err(LedgerError::UserNotFound)
    );
    assert_eq!(
        ledger
            .accounting()
            .transfer(stranger, UserId::random(), money(1, 0)),
        Err(LedgerError::UserNotFound)
    );
}

#[test]
fn test_transfer_to_existing_receiver() {
    let ledger = new_ledger();
    let sender = UserId::random();
    let receiver = UserId::random();
    ledger.accounting().credit(sender, money(10, 0)).unwrap();
    ledger.accounting().credit(receiver, money(0, 1)).unwrap();

    ledger.accounting().transfer(sender, receiver, money(9, 99)).unwrap();

    assert_eq!(balance_of(&ledger, sender), money(0, 1));
    assert_eq!(balance_of(&ledger, receiver), money(10, 0));
}

#[test]
fn test_transfer_entries_share_timestamp() {
    let ledger = new_ledger();
    let sender = UserId::random();
    let receiver = UserId::random();
    ledger.accounting().credit(sender, money(2, 0)).unwrap();
    ledger.accounting().transfer(sender, receiver, money(1, 0)).unwrap();

    let sent = ledger.query().transactions(sender, Some(1), None).unwrap();
    let received = ledger.query().transactions(receiver, None, None).unwrap();
    assert_eq!(sent[0].created_at, received[0].created_at);
    assert_ne!(sent[0].id, received[0].id);
    assert_eq!(sent[0].user_id, sender);
    assert_eq!(received[0].user_id, receiver);
}

#[test]
fn test_custom_span_is_accepted() {
    let store = Arc::new(InMemoryStore::new());
    let engine = balance_ledger::Engine::with_span(
        Arc::clone(&store),
        tracing::info_span!("accounting", tenant = "test"),
    );
    let user = UserId::random();

    engine.credit(user, money(1, 0)).unwrap();
    assert_eq!(store.get_balance(user), Ok(100));
}
