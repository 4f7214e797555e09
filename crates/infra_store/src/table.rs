//! CSV table input and output.

use crate::atomic::write_atomic;
use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Atomically replace the CSV file at `path` with `rows`.
///
/// A header row is derived from the field names of `R`. Calling this
/// repeatedly with a growing row set gives append-or-overwrite semantics
/// without ever exposing a half-written file.
pub fn write_csv_atomic<R: Serialize>(path: &Path, rows: &[R]) -> Result<(), StoreError> {
    write_atomic(path, |writer| {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    })
}

/// Read every record of the CSV file at `path`.
///
/// # Errors
///
/// [`StoreError::NotFound`] when the file does not exist, [`StoreError::Csv`]
/// when a record fails to parse.
pub fn read_csv<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        area: Option<usize>,
        metric: String,
        value: f64,
    }

    #[test]
    fn test_write_then_read_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let rows = vec![
            Row {
                area: Some(0),
                metric: "age/0_10".to_string(),
                value: 1.5,
            },
            Row {
                area: None,
                metric: "obr/income_tax".to_string(),
                value: 2.0,
            },
        ];

        write_csv_atomic(&path, &rows).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("area,metric,value"));

        let back: Vec<Row> = read_csv(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_read_missing_file() {
        let result: Result<Vec<Row>, _> = read_csv(Path::new("does_not_exist.csv"));
        assert!(matches!(result, Err(ref e) if e.is_not_found()));
    }
}
