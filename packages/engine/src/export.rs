//! CSV export of pivoted aggregation results.

use std::io::Write;
use std::path::Path;

use census_map_models::PivotTable;

use crate::EngineError;

/// Writes a pivot table as CSV to any writer.
///
/// The header is `point_name` followed by the variable labels in the
/// table's column order. Missing cells are written as empty fields, not
/// zero.
///
/// # Errors
///
/// Returns [`EngineError::Csv`] if serialization or the underlying
/// write fails.
pub fn write_csv<W: Write>(table: &PivotTable, writer: W) -> Result<(), EngineError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push("point_name");
    header.extend(table.columns.iter().map(String::as_str));
    csv_writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.point_name.clone());
        for value in &row.values {
            record.push(value.map(|v| v.to_string()).unwrap_or_default());
        }
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush().map_err(csv::Error::from)?;

    Ok(())
}

/// Writes a pivot table as a CSV file at `path`, creating or
/// truncating it.
///
/// # Errors
///
/// Returns [`EngineError::Csv`] if the file cannot be created or
/// written.
pub fn write_csv_file(table: &PivotTable, path: &Path) -> Result<(), EngineError> {
    let file = std::fs::File::create(path).map_err(csv::Error::from)?;
    write_csv(table, file)
}
