//! I/O module
//!
//! Handles CSV parsing and output for the operational drivers.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, account output)
//! - `reader` - Streaming reader yielding ledger operations

pub mod csv_format;
pub mod reader;

pub use csv_format::{convert_csv_record, write_accounts_csv, CsvRecord, LedgerOperation};
pub use reader::OperationReader;
