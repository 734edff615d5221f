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

//! Composition root.
//!
//! A [`Ledger`] wires one store into exactly one [`Engine`] and one
//! [`QueryService`]. Transports hold a `Ledger` (usually behind an `Arc`) and
//! call the two capabilities directly.

use crate::config::LedgerConfig;
use crate::engine::Engine;
use crate::query::QueryService;
use crate::rates::RateSource;
use crate::store::LedgerStore;
use std::sync::Arc;

pub struct Ledger<S, R> {
    accounting: Engine<S>,
    query: QueryService<S, R>,
}

impl<S: LedgerStore, R: RateSource> Ledger<S, R> {
    pub fn new(store: Arc<S>, rates: R, config: LedgerConfig) -> Self {
        Ledger {
            accounting: Engine::new(Arc::clone(&store)),
            query: QueryService::new(store, rates, config),
        }
    }

    /// Credit, withdraw and transfer.
    pub fn accounting(&self) -> &Engine<S> {
        &self.accounting
    }

    /// Balance and history lookups.
    pub fn query(&self) -> &QueryService<S, R> {
        &self.query
    }

    pub fn store(&self) -> &Arc<S> {
        self.accounting.store()
    }
}
