use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;

use crate::error::PipelineError;

/// One cell of a table.
///
/// `Missing` marks a derived field whose transform failed (or never ran);
/// it serializes as the run's sentinel string, never as an empty cell, so
/// "attempted but failed" stays distinguishable from a blank input cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Missing,
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn render(&self, sentinel: &str) -> String {
        match self {
            Value::Text(text) => text.clone(),
            Value::Number(number) => format!("{number}"),
            Value::Missing => sentinel.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// An ordered mapping from column name to cell value. Column order is owned
/// by the enclosing [`Table`]; the row only stores cells.
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    /// Trimmed cell text, `None` for absent, missing, or blank cells.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .and_then(Value::as_text)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.cells.insert(column.into(), value);
    }
}

/// An ordered sequence of rows sharing one column schema.
///
/// Loaded once from CSV, mutated in place as transforms complete, and
/// rewritten whole at every checkpoint.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn load_csv(path: &Utf8Path) -> Result<Self, PipelineError> {
        let mut reader = csv::Reader::from_path(path.as_std_path())
            .map_err(|err| PipelineError::Csv(err.to_string()))?;
        let columns = reader
            .headers()
            .map_err(|err| PipelineError::Csv(err.to_string()))?
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| PipelineError::Csv(err.to_string()))?;
            let mut row = Row::new();
            for (column, cell) in columns.iter().zip(record.iter()) {
                row.set(column.clone(), Value::text(cell));
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn set_cell(&mut self, index: usize, column: &str, value: Value) {
        self.ensure_column(column);
        if let Some(row) = self.rows.get_mut(index) {
            row.set(column, value);
        }
    }

    /// Append `column` to the schema if it is not already declared.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.columns.iter().any(|existing| existing == column) {
            self.columns.push(column.to_string());
        }
    }

    /// Required columns are validated once, eagerly, before any row is
    /// processed; a missing one is a configuration error, not a row failure.
    pub fn require_columns(&self, required: &[&str]) -> Result<(), PipelineError> {
        for column in required {
            if !self.columns.iter().any(|existing| existing == column) {
                return Err(PipelineError::MissingColumn(column.to_string()));
            }
        }
        Ok(())
    }

    /// Serialize the whole table to `path`, overwriting prior contents.
    ///
    /// The header is exactly `order`; columns not listed are dropped, cells
    /// a row does not have are filled with `sentinel`. The write goes
    /// through a temp file and a rename so an interrupted run keeps the
    /// previous checkpoint intact.
    pub fn write_csv(
        &self,
        path: &Utf8Path,
        order: &[String],
        sentinel: &str,
    ) -> Result<(), PipelineError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(order)
            .map_err(|err| PipelineError::Csv(err.to_string()))?;
        for row in &self.rows {
            let record = order
                .iter()
                .map(|column| {
                    row.get(column)
                        .map(|value| value.render(sentinel))
                        .unwrap_or_else(|| sentinel.to_string())
                })
                .collect::<Vec<_>>();
            writer
                .write_record(&record)
                .map_err(|err| PipelineError::Csv(err.to_string()))?;
        }
        let content = writer
            .into_inner()
            .map_err(|err| PipelineError::Csv(err.to_string()))?;
        write_bytes_atomic(path, &content)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn render_values() {
        assert_eq!(Value::text("PFOA").render("NA"), "PFOA");
        assert_eq!(Value::Number(12.5).render("NA"), "12.5");
        assert_eq!(Value::Number(-3.0).render("NA"), "-3");
        assert_eq!(Value::Missing.render("NA"), "NA");
    }

    #[test]
    fn blank_cell_is_not_text() {
        let mut row = Row::new();
        row.set("SMILES", Value::text("  "));
        assert_eq!(row.text("SMILES"), None);
        row.set("SMILES", Value::text(" C(F)F "));
        assert_eq!(row.text("SMILES"), Some("C(F)F"));
    }

    #[test]
    fn require_columns_reports_first_missing() {
        let table = Table::new(vec!["CASRN".to_string(), "Name".to_string()]);
        assert!(table.require_columns(&["CASRN"]).is_ok());
        let err = table.require_columns(&["CASRN", "SMILES"]).unwrap_err();
        assert_matches!(err, PipelineError::MissingColumn(column) if column == "SMILES");
    }

    #[test]
    fn ensure_column_is_idempotent() {
        let mut table = Table::new(vec!["CASRN".to_string()]);
        table.ensure_column("F+");
        table.ensure_column("F+");
        assert_eq!(table.columns(), ["CASRN", "F+"]);
    }
}
