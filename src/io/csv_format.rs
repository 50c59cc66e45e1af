//! CSV format handling for ledger operations and account output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to ledger operations
//! - Account output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Input columns
//!
//! `op,user,account,to,amount,account_type,currency,description`
//!
//! | op         | required columns                     |
//! |------------|--------------------------------------|
//! | `open`     | user, account_type, currency         |
//! | `deposit`  | user, account, amount                |
//! | `transfer` | user, account, to, amount            |
//! | `external` | user, account, to, amount            |
//! | `close`    | user, account                        |

use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

use crate::types::{Account, AccountId, TransferKind, TransferRequest, UserId};

/// CSV record structure for deserialization
///
/// Every column except `op` and `user` is optional because each operation
/// only uses a subset of them.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CsvRecord {
    pub op: String,
    pub user: UserId,
    pub account: Option<AccountId>,
    pub to: Option<AccountId>,
    pub amount: Option<String>,
    pub account_type: Option<String>,
    pub currency: Option<String>,
    pub description: Option<String>,
}

/// A ledger call described by one input row
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOperation {
    Open {
        user_id: UserId,
        account_type: String,
        currency: String,
    },
    Deposit {
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
    },
    Transfer(TransferRequest),
    Close {
        user_id: UserId,
        account_id: AccountId,
    },
}

/// Convert a CsvRecord to a LedgerOperation
///
/// Only the shape of the row is checked here. Business rules (positive
/// amounts, ownership, currency codes) are left to the ledger so that a
/// replay exercises them.
///
/// # Returns
///
/// * `Ok(LedgerOperation)` - Successfully converted record
/// * `Err(String)` - Unknown operation, missing column or unparsable amount
pub fn convert_csv_record(record: CsvRecord) -> Result<LedgerOperation, String> {
    let op = record.op.trim().to_lowercase();
    let user_id = record.user;

    match op.as_str() {
        "open" => Ok(LedgerOperation::Open {
            user_id,
            account_type: require(record.account_type, "account_type", &op)?,
            currency: require(record.currency, "currency", &op)?,
        }),
        "deposit" => Ok(LedgerOperation::Deposit {
            user_id,
            account_id: require(record.account, "account", &op)?,
            amount: parse_amount(record.amount, &op)?,
        }),
        "transfer" | "external" => {
            let kind = if op == "transfer" {
                TransferKind::Internal
            } else {
                TransferKind::External
            };
            Ok(LedgerOperation::Transfer(TransferRequest {
                user_id,
                from_account_id: require(record.account, "account", &op)?,
                to_account_id: require(record.to, "to", &op)?,
                amount: parse_amount(record.amount, &op)?,
                description: record.description.unwrap_or_default(),
                kind,
            }))
        }
        "close" => Ok(LedgerOperation::Close {
            user_id,
            account_id: require(record.account, "account", &op)?,
        }),
        _ => Err(format!("Unknown operation: '{}'", record.op)),
    }
}

fn require<T>(value: Option<T>, column: &str, op: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("{} requires column '{}'", op, column))
}

fn parse_amount(amount: Option<String>, op: &str) -> Result<Decimal, String> {
    match amount {
        Some(raw) if !raw.trim().is_empty() => Decimal::from_str(raw.trim())
            .map_err(|_| format!("Invalid amount '{}' for {}", raw, op)),
        _ => Err(format!("{} requires an amount", op)),
    }
}

/// Write account states to CSV format
///
/// Writes accounts in CSV format with columns: id, user, type, currency,
/// balance, status. Accounts are sorted by id for deterministic output and
/// balances are printed at their stored scale.
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["id", "user", "type", "currency", "balance", "status"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&Account> = accounts.iter().collect();
    sorted.sort_by_key(|account| account.id);

    for account in sorted {
        writer
            .write_record(&[
                account.id.to_string(),
                account.user_id.to_string(),
                account.account_type.clone(),
                account.currency.clone(),
                account.balance.to_string(),
                account.status.to_string(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
