//! Streaming reader over ledger operation CSV files
//!
//! Yields one `Result<LedgerOperation, String>` per data row, in file
//! order. Rows are read lazily, so memory stays constant regardless of
//! file size.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as `Err` items and iteration
//!   continues with the next row
//! - Error messages carry the 1-based file line (the header is line 1)

use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::io::csv_format::{convert_csv_record, CsvRecord, LedgerOperation};

/// Iterator over the operations of a CSV source
#[derive(Debug)]
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
    line_num: usize,
}

impl OperationReader<File> {
    /// Open a CSV file for streaming iteration
    ///
    /// # Returns
    ///
    /// * `Ok(OperationReader)` if the file opened successfully
    /// * `Err(String)` if the file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> OperationReader<R> {
    /// Wrap any byte source
    ///
    /// Whitespace around fields is trimmed and rows may omit trailing
    /// columns.
    pub fn from_reader(source: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(source);

        Self {
            reader,
            line_num: 1,
        }
    }
}

impl<R: Read> Iterator for OperationReader<R> {
    type Item = Result<LedgerOperation, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let parsed = self.reader.deserialize::<CsvRecord>().next()?;
        self.line_num += 1;

        Some(match parsed {
            Ok(record) => {
                convert_csv_record(record).map_err(|e| format!("Line {}: {}", self.line_num, e))
            }
            Err(e) => Err(format!("Line {}: CSV parse error: {}", self.line_num, e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "op,user,account,to,amount,account_type,currency,description\n";

    fn read_all(body: &str) -> Vec<Result<LedgerOperation, String>> {
        OperationReader::from_reader(format!("{}{}", HEADER, body).as_bytes()).collect()
    }

    #[test]
    fn test_reader_opens_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(format!("{}open,1,,,,deposit,USD,\n", HEADER).as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");

        let operations: Vec<_> = OperationReader::new(file.path()).unwrap().collect();
        assert_eq!(operations.len(), 1);
        assert!(operations[0].is_ok());
    }

    #[test]
    fn test_reader_fails_on_missing_file() {
        let result = OperationReader::new(Path::new("nonexistent.csv"));
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_reader_parses_every_operation() {
        let operations = read_all(
            "open,1,,,,deposit,USD,\n\
             deposit,1,1,,100.00,,,\n\
             transfer,1,1,2,40,,,rent\n\
             external,1,1,3,5,,,gift\n\
             close,1,2,,,,,\n",
        );

        assert_eq!(operations.len(), 5);
        assert!(operations.iter().all(Result::is_ok));
        assert_eq!(
            operations[1],
            Ok(LedgerOperation::Deposit {
                user_id: 1,
                account_id: 1,
                amount: Decimal::new(10000, 2),
            })
        );
    }

    #[test]
    fn test_reader_handles_whitespace_and_short_rows() {
        let operations = read_all("  close  ,  4  ,  9  \n");
        assert_eq!(
            operations,
            vec![Ok(LedgerOperation::Close {
                user_id: 4,
                account_id: 9,
            })]
        );
    }

    #[test]
    fn test_reader_reports_line_numbers_and_continues() {
        let operations = read_all(
            "deposit,1,1,,10,,,\n\
             deposit,1,1,,ten,,,\n\
             withdraw,1,1,,10,,,\n\
             deposit,x,1,,10,,,\n\
             deposit,1,1,,10,,,\n",
        );

        assert_eq!(operations.len(), 5);
        assert!(operations[0].is_ok());
        assert!(operations[1].as_ref().unwrap_err().starts_with("Line 3: Invalid amount"));
        assert!(operations[2].as_ref().unwrap_err().starts_with("Line 4: Unknown operation"));
        assert!(operations[3].as_ref().unwrap_err().contains("CSV parse error"));
        assert!(operations[4].is_ok());
    }

    #[test]
    fn test_reader_empty_after_header() {
        assert!(read_all("").is_empty());
    }
}
