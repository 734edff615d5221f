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

//! # Balance Ledger
//!
//! This library keeps monetary balances for users: funds can be credited,
//! withdrawn and transferred between users, and every change is recorded in
//! an append-only history.
//!
//! ## Core Components
//!
//! - [`Money`]: Exact two-decimal amount, stored as integer minor units
//! - [`LedgerStore`]: Transactional storage contract, with [`InMemoryStore`] as the built-in engine
//! - [`Engine`]: Credit, withdraw and transfer, each committed as one atomic unit
//! - [`QueryService`]: Balance (optionally converted through a [`RateSource`]) and history
//! - [`LedgerError`]: Validation and internal failures, see [`ErrorKind`]
//!
//! ## Example
//!
//! ```
//! use balance_ledger::{InMemoryStore, Ledger, LedgerConfig, Money, NoRates, UserId};
//! use std::sync::Arc;
//!
//! let ledger = Ledger::new(Arc::new(InMemoryStore::new()), NoRates, LedgerConfig::default());
//! let alice = UserId::random();
//! let bob = UserId::random();
//!
//! ledger.accounting().credit(alice, Money::new(10, 50).unwrap()).unwrap();
//! ledger.accounting().transfer(alice, bob, Money::new(5, 50).unwrap()).unwrap();
//!
//! assert_eq!(ledger.query().balance(alice, None).unwrap().to_string(), "5.00");
//! assert_eq!(ledger.query().balance(bob, None).unwrap().to_string(), "5.50");
//! ```
//!
//! ## Thread Safety
//!
//! All services take `&self` and can be shared across threads behind an
//! `Arc`. Consistency between accounts is enforced by the store's
//! transactions; the services hold no locks of their own.

mod base;
pub mod config;
pub mod engine;
pub mod error;
mod ledger;
pub mod money;
pub mod query;
pub mod rates;
pub mod store;
pub mod telemetry;

pub use base::{EntryId, UserId};
pub use config::{LedgerConfig, Page};
pub use engine::Engine;
pub use error::{ErrorKind, INTERNAL_ERROR_MESSAGE, LedgerError, RateError, StoreError};
pub use ledger::Ledger;
pub use money::Money;
pub use query::QueryService;
pub use rates::{NoRates, RateSource, RateTable, StaticRates};
pub use store::{InMemoryStore, InMemoryTxn, LedgerEntry, LedgerStore, StoreResult};

#[cfg(feature = "remote-rates")]
pub use rates::HttpRates;
