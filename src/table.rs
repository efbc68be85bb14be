//! Column-oriented observation table with CSV persistence.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use csv::ReaderBuilder;
use thiserror::Error;

/// One cell of an observation table.
///
/// CSV cells are typed on read: empty maps to `Null`, then integer, then
/// float, falling back to `Str`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    fn from_csv_cell(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Self::Float(v);
        }
        Self::Str(raw.to_string())
    }

    fn to_csv_cell(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Str(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV input has an empty header row")]
    EmptyHeader,
    #[error("row {row} has {found} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("column '{name}' has {found} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        found: usize,
        expected: usize,
    },
}

/// An ordered set of equal-length named columns. One row is one hour of one
/// region's history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), TableError> {
        if self.column(&column.name).is_some() {
            return Err(TableError::DuplicateColumn(column.name.clone()));
        }
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(TableError::LengthMismatch {
                name: column.name.clone(),
                found: column.len(),
                expected: self.num_rows(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn replace_column_values(
        &mut self,
        name: &str,
        values: Vec<Value>,
    ) -> Result<(), TableError> {
        let expected = self.num_rows();
        if values.len() != expected {
            return Err(TableError::LengthMismatch {
                name: name.to_string(),
                found: values.len(),
                expected,
            });
        }
        let column = self
            .columns
            .iter_mut()
            .find(|column| column.name == name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
        column.values = values;
        Ok(())
    }

    /// Removes a column if present. Absent columns are not an error so
    /// pattern-driven pruning can be a no-op on zero matches.
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.column_index(name)?;
        Some(self.columns.remove(idx))
    }

    /// Drops all rows before `start`, keeping row order.
    pub fn slice_from(&mut self, start: usize) {
        for column in &mut self.columns {
            if start >= column.values.len() {
                column.values.clear();
            } else {
                column.values.drain(..start);
            }
        }
    }

    /// Moves the named columns to the front in the given order; all other
    /// columns keep their relative order. Names not present are skipped.
    pub fn reorder_leading(&mut self, leading: &[String]) {
        let mut front = Vec::new();
        for name in leading {
            if let Some(idx) = self.columns.iter().position(|column| &column.name == name) {
                front.push(self.columns.remove(idx));
            }
        }
        front.append(&mut self.columns);
        self.columns = front;
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|field| field.to_string())
            .collect();
        if headers.is_empty() {
            return Err(TableError::EmptyHeader);
        }

        let mut column_values: Vec<Vec<Value>> = headers.iter().map(|_| Vec::new()).collect();
        for (row_idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(TableError::RaggedRow {
                    row: row_idx,
                    found: record.len(),
                    expected: headers.len(),
                });
            }
            for (col_idx, raw) in record.iter().enumerate() {
                column_values[col_idx].push(Value::from_csv_cell(raw));
            }
        }

        let columns = headers
            .into_iter()
            .zip(column_values)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Self::from_columns(columns)
    }

    pub fn read_csv_path(path: &Path) -> Result<Self, TableError> {
        let file = fs::File::open(path)?;
        Self::read_csv(file)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.column_names())?;
        for row_idx in 0..self.num_rows() {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|column| column.values[row_idx].to_csv_cell())
                .collect();
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), TableError> {
        let file = fs::File::create(path)?;
        self.write_csv(file)
    }
}
