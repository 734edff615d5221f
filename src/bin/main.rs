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

use balance_ledger::{
    InMemoryStore, Ledger, LedgerConfig, LedgerEntry, LedgerError, LedgerStore, Money, NoRates,
    RateError, RateSource, StaticRates, UserId, telemetry,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Balance Ledger - Replay balance operations against an in-memory ledger
///
/// Reads operations from a CSV file and writes one JSON result per row to stdout.
/// Supports credit, withdraw, transfer, balance and history.
#[derive(Parser, Debug)]
#[command(name = "balance-ledger")]
#[command(about = "Replays balance operations and prints their results", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,user,counterparty,amount,currency,limit,offset
    /// Example: cargo run -- operations.csv > results.jsonl
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// CSV file with `code,rate` exchange rates used for balance conversion
    #[arg(long, value_name = "FILE")]
    rates: Option<PathBuf>,

    /// Fetch exchange rates from this URL instead of a file
    #[cfg(feature = "remote-rates")]
    #[arg(long, value_name = "URL")]
    rates_url: Option<String>,

    /// History page size when a row has no limit
    #[arg(long, default_value_t = LedgerConfig::DEFAULT_PAGE_LIMIT)]
    default_page_limit: usize,

    /// Largest history page a row may request
    #[arg(long, default_value_t = LedgerConfig::MAX_PAGE_LIMIT)]
    max_page_limit: usize,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "remote-rates")]
    #[error("rates error: {0}")]
    Rates(#[from] RateError),
}

fn main() {
    telemetry::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!(error = %e, "aborting");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = LedgerConfig {
        default_page_limit: args.default_page_limit,
        max_page_limit: args.max_page_limit,
    };
    let rates = load_rates(&args)?;
    let ledger = Ledger::new(Arc::new(InMemoryStore::new()), rates, config);

    let file = File::open(&args.input)?;
    let stdout = std::io::stdout();
    let summary = process_operations(&ledger, BufReader::new(file), BufWriter::new(stdout.lock()))?;

    info!(
        ok = summary.ok,
        rejected = summary.rejected,
        failed = summary.failed,
        "replay finished"
    );
    Ok(())
}

/// Rate source selected on the command line.
enum CliRates {
    None(NoRates),
    Static(StaticRates),
    #[cfg(feature = "remote-rates")]
    Http(balance_ledger::HttpRates),
}

impl RateSource for CliRates {
    fn rate(&self, code: &str) -> Result<Decimal, RateError> {
        match self {
            CliRates::None(rates) => rates.rate(code),
            CliRates::Static(rates) => rates.rate(code),
            #[cfg(feature = "remote-rates")]
            CliRates::Http(rates) => rates.rate(code),
        }
    }
}

fn load_rates(args: &Args) -> Result<CliRates, CliError> {
    #[cfg(feature = "remote-rates")]
    if let Some(url) = &args.rates_url {
        return Ok(CliRates::Http(balance_ledger::HttpRates::new(url.clone())?));
    }

    match &args.rates {
        Some(path) => {
            let rates = StaticRates::from_csv(BufReader::new(File::open(path)?))?;
            info!(count = rates.len(), path = %path.display(), "loaded exchange rates");
            Ok(CliRates::Static(rates))
        }
        None => Ok(CliRates::None(NoRates)),
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, user, counterparty, amount, currency, limit, offset`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    user: String,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    limit: Option<usize>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Credit {
        user_id: UserId,
        amount: Money,
    },
    Withdraw {
        user_id: UserId,
        amount: Money,
    },
    Transfer {
        sender_id: UserId,
        receiver_id: UserId,
        amount: Money,
    },
    Balance {
        user_id: UserId,
        currency: Option<String>,
    },
    History {
        user_id: UserId,
        limit: Option<usize>,
        offset: Option<usize>,
    },
}

impl CsvRecord {
    /// Converts a CSV record into an operation, or the reason it cannot be run.
    fn into_operation(self) -> Result<Operation, String> {
        let user_id = parse_user(&self.user)?;
        let amount = || -> Result<Money, String> {
            let raw = self.amount.as_deref().ok_or("missing amount")?;
            raw.parse::<Money>().map_err(|e| e.to_string())
        };

        match self.op.to_lowercase().as_str() {
            "credit" => Ok(Operation::Credit {
                user_id,
                amount: amount()?,
            }),
            "withdraw" => Ok(Operation::Withdraw {
                user_id,
                amount: amount()?,
            }),
            "transfer" => {
                let receiver = self.counterparty.as_deref().ok_or("missing counterparty")?;
                Ok(Operation::Transfer {
                    sender_id: user_id,
                    receiver_id: parse_user(receiver)?,
                    amount: amount()?,
                })
            }
            "balance" => Ok(Operation::Balance {
                user_id,
                currency: self.currency.clone(),
            }),
            "history" => Ok(Operation::History {
                user_id,
                limit: self.limit,
                offset: self.offset,
            }),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

fn parse_user(raw: &str) -> Result<UserId, String> {
    raw.parse::<UserId>()
        .map_err(|_| format!("invalid user id: {}", raw.trim()))
}

/// One line of output.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Outcome {
    Ok {
        row: usize,
        op: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        balance: Option<Money>,
        #[serde(skip_serializing_if = "Option::is_none")]
        entries: Option<Vec<LedgerEntry>>,
    },
    Rejected {
        row: usize,
        op: String,
        error: String,
    },
    Failed {
        row: usize,
        op: String,
        error: String,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    ok: usize,
    rejected: usize,
    failed: usize,
}

impl Summary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Ok { .. } => self.ok += 1,
            Outcome::Rejected { .. } => self.rejected += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

fn run_operation<S: LedgerStore, R: RateSource>(
    ledger: &Ledger<S, R>,
    operation: Operation,
) -> Result<(Option<Money>, Option<Vec<LedgerEntry>>), LedgerError> {
    match operation {
        Operation::Credit { user_id, amount } => {
            ledger.accounting().credit(user_id, amount)?;
            Ok((None, None))
        }
        Operation::Withdraw { user_id, amount } => {
            ledger.accounting().withdraw(user_id, amount)?;
            Ok((None, None))
        }
        Operation::Transfer {
            sender_id,
            receiver_id,
            amount,
        } => {
            ledger.accounting().transfer(sender_id, receiver_id, amount)?;
            Ok((None, None))
        }
        Operation::Balance { user_id, currency } => {
            let balance = ledger.query().balance(user_id, currency.as_deref())?;
            Ok((Some(balance), None))
        }
        Operation::History {
            user_id,
            limit,
            offset,
        } => {
            let entries = ledger.query().transactions(user_id, limit, offset)?;
            Ok((None, Some(entries)))
        }
    }
}

/// Replays operations from a CSV reader, writing JSON lines to `writer`.
///
/// Rows are processed in order, one at a time. Malformed rows and rejected
/// operations are reported in the output and do not stop the replay.
///
/// # CSV Format
///
/// Expected columns: `op, user, counterparty, amount, currency, limit, offset`
/// - `op`: Operation (credit, withdraw, transfer, balance, history)
/// - `user`: User UUID (the sender for transfers)
/// - `counterparty`: Receiver UUID (transfer only)
/// - `amount`: Decimal amount with at most two decimals (credit, withdraw, transfer)
/// - `currency`: Optional currency code (balance only)
/// - `limit`, `offset`: Optional paging (history only)
///
/// # Errors
///
/// Returns an error if the input cannot be read or the output cannot be written.
fn process_operations<S, R, In, Out>(
    ledger: &Ledger<S, R>,
    reader: In,
    mut writer: Out,
) -> Result<Summary, CliError>
where
    S: LedgerStore,
    R: RateSource,
    In: Read,
    Out: Write,
{
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut summary = Summary::default();
    for (row_idx, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = row_idx + 2; // 1-indexed, after the header

        let outcome = match result {
            Ok(record) => {
                let op = record.op.to_lowercase();
                match record.into_operation() {
                    Ok(operation) => match run_operation(ledger, operation) {
                        Ok((balance, entries)) => Outcome::Ok {
                            row,
                            op,
                            balance,
                            entries,
                        },
                        Err(e) if e.is_validation() => Outcome::Rejected {
                            row,
                            op,
                            error: e.public_message(),
                        },
                        Err(e) => Outcome::Failed {
                            row,
                            op,
                            error: e.public_message(),
                        },
                    },
                    Err(reason) => {
                        warn!(row, %reason, "skipping invalid operation");
                        Outcome::Rejected {
                            row,
                            op,
                            error: reason,
                        }
                    }
                }
            }
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
                Outcome::Rejected {
                    row,
                    op: String::new(),
                    error: "malformed row".to_string(),
                }
            }
        };

        summary.record(&outcome);
        serde_json::to_writer(&mut writer, &outcome)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(summary)
}
