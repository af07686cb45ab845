//! Writes the per-patient result table: one CSV file per patient, fixed
//! column order plus whatever auxiliary donor columns were requested.

use std::path::Path;

use crate::error::{MatchError, Result};
use crate::scorer::ResultRow;
use crate::types::LOCUS_NAMES;

const MOST_COMMON_LOCUS_LABELS: [&str; 5] = ["A", "B", "C", "DQB", "DRB"];

/// Write one patient's ranked result rows to `<out_dir>/<patient_id>.csv`.
pub fn write_patient_results(out_dir: &Path, patient_id: u64, rows: &[ResultRow], aux_columns: &[String]) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|source| MatchError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let path = out_dir.join(format!("{patient_id}.csv"));

    let mut writer = csv::Writer::from_path(&path).map_err(|e| MatchError::Io {
        path: path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    })?;

    let mut header = vec![
        "Patient_ID".to_string(),
        "Donor_ID".to_string(),
        "Number_Of_Mismatches".to_string(),
        "Matching_Probability".to_string(),
    ];
    for locus in LOCUS_NAMES {
        header.push(format!("Match_Probability_{locus}_1"));
        header.push(format!("Match_Probability_{locus}_2"));
    }
    header.push("Permissive/Non-Permissive".to_string());
    for label in MOST_COMMON_LOCUS_LABELS {
        header.push(format!("Match_Between_Most_Commons_{label}"));
    }
    header.extend(aux_columns.iter().cloned());

    writer.write_record(&header).map_err(|e| io_err(&path, e))?;

    for row in rows {
        let mut record: Vec<String> = vec![
            row.patient_id.to_string(),
            row.donor_id.to_string(),
            row.number_of_mismatches.to_string(),
            format!("{:.2}", row.matching_probability),
        ];
        for pct in row.match_probability_per_allele {
            record.push((pct as i64).to_string());
        }
        record.push(row.permissive.to_string());
        for count in row.match_between_most_commons {
            record.push(count.to_string());
        }
        for (_, value) in &row.aux_columns {
            record.push(value.clone());
        }
        writer.write_record(&record).map_err(|e| io_err(&path, e))?;
    }

    writer.flush().map_err(|source| MatchError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

fn io_err(path: &Path, e: csv::Error) -> MatchError {
    MatchError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    }
}
