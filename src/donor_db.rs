//! Auxiliary donor metadata, joined onto result rows by donor id.
//!
//! This is the one piece of the source's "global mutable table set via a
//! setter" replaced with a value passed explicitly into the scorer, per the
//! donor-auxiliary-table redesign.

use std::path::Path;

use hashbrown::HashMap;
use tracing::warn;

use crate::error::{MatchError, Result};

/// CSV-backed lookup table: first column is `donor_id`, remaining columns
/// are named auxiliary fields (e.g. `center`, `registry`, `age`).
pub struct DonorInfoTable {
    rows: HashMap<u64, HashMap<String, String>>,
}

impl DonorInfoTable {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| MatchError::Parse {
            file: path.to_path_buf(),
            line: 0,
            reason: format!("failed to open donor info CSV: {e}"),
        })?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| MatchError::Parse {
                file: path.to_path_buf(),
                line: 0,
                reason: format!("failed to read header row: {e}"),
            })?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.is_empty() || headers[0] != "donor_id" {
            return Err(MatchError::Structural {
                file: path.to_path_buf(),
                line: 1,
                reason: "donor info CSV must start with a 'donor_id' column".to_string(),
            });
        }

        let mut rows = HashMap::new();
        for (line_no, record) in reader.records().enumerate() {
            let record = record.map_err(|e| MatchError::Parse {
                file: path.to_path_buf(),
                line: line_no + 2,
                reason: format!("malformed row: {e}"),
            })?;
            let donor_id: u64 = record
                .get(0)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| MatchError::Parse {
                    file: path.to_path_buf(),
                    line: line_no + 2,
                    reason: "invalid donor_id".to_string(),
                })?;

            let mut fields = HashMap::new();
            for (col, value) in headers.iter().skip(1).zip(record.iter().skip(1)) {
                fields.insert(col.clone(), value.to_string());
            }
            rows.insert(donor_id, fields);
        }

        Ok(DonorInfoTable { rows })
    }

    /// Look up one auxiliary column for a donor. A missing donor or column
    /// is not fatal: it is logged and the caller substitutes an empty cell.
    pub fn lookup(&self, donor_id: u64, column: &str) -> Option<String> {
        match self.rows.get(&donor_id).and_then(|fields| fields.get(column)) {
            Some(value) => Some(value.clone()),
            None => {
                warn!(donor_id, column, "requested donor info column not found, leaving cell blank");
                None
            }
        }
    }
}
