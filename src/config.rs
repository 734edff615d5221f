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

//! Ledger configuration and pagination.

use serde::{Deserialize, Serialize};

/// Tunables shared by the ledger services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// History page size used when the caller does not pass one.
    pub default_page_limit: usize,
    /// Upper bound applied to every caller-supplied page size.
    pub max_page_limit: usize,
}

impl LedgerConfig {
    pub const DEFAULT_PAGE_LIMIT: usize = 100;
    pub const MAX_PAGE_LIMIT: usize = 1_000;

    /// Resolves an optional `limit`/`offset` pair into a bounded [`Page`].
    pub fn page(&self, limit: Option<usize>, offset: Option<usize>) -> Page {
        let max = self.max_page_limit.max(1);
        let limit = limit.unwrap_or(self.default_page_limit).min(max);
        Page::new(limit, offset.unwrap_or(0))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_page_limit: Self::DEFAULT_PAGE_LIMIT,
            max_page_limit: Self::MAX_PAGE_LIMIT,
        }
    }
}

/// A window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(LedgerConfig::DEFAULT_PAGE_LIMIT, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_use_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.page(None, None), Page::new(100, 0));
    }

    #[test]
    fn limit_is_clamped() {
        let config = LedgerConfig::default();
        assert_eq!(config.page(Some(1_000_000), Some(5)), Page::new(1_000, 5));
        assert_eq!(config.page(Some(10), None), Page::new(10, 0));
    }

    #[test]
    fn default_limit_is_clamped_too() {
        let config = LedgerConfig {
            default_page_limit: 500,
            max_page_limit: 50,
        };
        assert_eq!(config.page(None, None), Page::new(50, 0));
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"max_page_limit": 20}"#).unwrap();
        assert_eq!(config.default_page_limit, 100);
        assert_eq!(config.max_page_limit, 20);
    }
}
