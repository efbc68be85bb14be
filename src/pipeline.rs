//! Third-pass feature pipeline for hourly regional load tables.
//!
//! Seven transforms applied in a fixed order: hour normalization, holiday
//! flag repair, ISO week-of-year derivation, cyclical encoding, column
//! pruning, warm-up trimming, column reordering.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::{Column, Table, TableError, Value};

const DATE_HOUR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const PIPELINE_SCHEMA_VERSION: u32 = 3;

/// How the period divisor for a cyclical field is chosen.
///
/// `FromData` reproduces the original behavior (divisor = maximum observed
/// value after the zero-indexing shift) and can drift on filtered inputs;
/// `Fixed` pins the calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodPolicy {
    FromData,
    Fixed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicalField {
    pub column: String,
    pub period: PeriodPolicy,
}

impl CyclicalField {
    pub fn from_data(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            period: PeriodPolicy::FromData,
        }
    }

    pub fn fixed(column: impl Into<String>, period: u32) -> Self {
        Self {
            column: column.into(),
            period: PeriodPolicy::Fixed(period),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub hour_column: String,
    pub reference_column: String,
    pub leakage_patterns: Vec<String>,
    pub drop_columns: Vec<String>,
    pub redundant_patterns: Vec<String>,
    pub cyclical_fields: Vec<CyclicalField>,
    pub leading_columns: Vec<String>,
    pub verify_no_nulls: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            hour_column: "hour".to_string(),
            reference_column: "cum_avg_7_day_relh".to_string(),
            leakage_patterns: vec!["_next_".to_string(), "_load".to_string()],
            drop_columns: vec!["date".to_string()],
            redundant_patterns: vec![
                "max_24_hour".to_string(),
                "min_24_hour".to_string(),
                "mean_24_hour".to_string(),
            ],
            cyclical_fields: vec![
                CyclicalField::from_data("week_of_year"),
                CyclicalField::from_data("hour"),
                CyclicalField::from_data("weekday"),
            ],
            leading_columns: vec!["date_hour".to_string(), "load".to_string()],
            verify_no_nulls: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub warmup_boundary: usize,
    pub holiday_dates_repaired: usize,
    pub pruned_columns: Vec<String>,
    pub schema: OutputSchema,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("malformed hour value '{value}' at row {row}")]
    ParseHour { value: String, row: usize },
    #[error("malformed date_hour value '{value}' at row {row}")]
    ParseTimestamp { value: String, row: usize },
    #[error("column '{column}' has a non-integer value at row {row}")]
    NonIntegerCell { column: String, row: usize },
    #[error("cyclical column '{column}' has no non-null values")]
    EmptyCyclicalColumn { column: String },
    #[error("cyclical column '{column}' has period divisor 0")]
    ZeroPeriod { column: String },
    #[error("reference column '{column}' is entirely null; warm-up boundary undefined")]
    AllNullReference { column: String },
    #[error("null remains in column '{column}' at row {row} after warm-up trimming")]
    NullAfterTrim { column: String, row: usize },
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Runs the seven stages in order and returns the model-ready table plus a
/// run report.
pub fn run_pipeline(
    mut table: Table,
    cfg: &PipelineConfig,
) -> Result<(Table, PipelineReport), PipelineError> {
    validate_config(cfg)?;

    let input_rows = table.num_rows();
    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        input_rows = input_rows,
        input_columns = table.num_columns(),
        reference_column = %cfg.reference_column
    );

    normalize_hour_column(&mut table, &cfg.hour_column)?;
    let holiday_dates_repaired = repair_holiday_flags(&mut table)?;
    add_week_of_year(&mut table)?;
    for field in &cfg.cyclical_fields {
        encode_cyclical(&mut table, field)?;
    }
    let pruned_columns = prune_columns(&mut table, cfg);
    let warmup_boundary = trim_warmup(&mut table, &cfg.reference_column)?;
    if cfg.verify_no_nulls {
        verify_no_nulls(&table)?;
    }
    table.reorder_leading(&cfg.leading_columns);

    let schema = build_output_schema(&table);
    let report = PipelineReport {
        input_rows,
        output_rows: table.num_rows(),
        warmup_boundary,
        holiday_dates_repaired,
        pruned_columns,
        schema,
    };

    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        warmup_boundary = report.warmup_boundary,
        holiday_dates_repaired = report.holiday_dates_repaired,
        pruned_columns = report.pruned_columns.len(),
        schema_fingerprint = %report.schema.fingerprint
    );

    Ok((table, report))
}

fn validate_config(cfg: &PipelineConfig) -> Result<(), PipelineError> {
    if cfg.reference_column.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "reference_column must not be empty".to_string(),
        ));
    }
    if cfg.hour_column.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "hour_column must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for field in &cfg.cyclical_fields {
        if field.column.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "cyclical field names must not be empty".to_string(),
            ));
        }
        if !seen.insert(field.column.as_str()) {
            return Err(PipelineError::InvalidConfig(format!(
                "cyclical field '{}' listed twice",
                field.column
            )));
        }
    }

    Ok(())
}

/// Replaces `"H:MM"` / `"HH:MM"` strings with the integer hour before the
/// colon. Integer cells pass through, so the stage is idempotent.
pub fn normalize_hour_column(table: &mut Table, column: &str) -> Result<(), PipelineError> {
    let source = table.require_column(column)?;

    let mut normalized = Vec::with_capacity(source.len());
    for (row, value) in source.values().iter().enumerate() {
        let parsed = match value {
            Value::Str(raw) => {
                let head = raw.split(':').next().unwrap_or(raw);
                let hour = head.trim().parse::<i64>().map_err(|_| {
                    PipelineError::ParseHour {
                        value: raw.clone(),
                        row,
                    }
                })?;
                Value::Int(hour)
            }
            Value::Int(v) => Value::Int(*v),
            Value::Null => Value::Null,
            Value::Float(v) => {
                return Err(PipelineError::ParseHour {
                    value: v.to_string(),
                    row,
                })
            }
        };
        normalized.push(parsed);
    }

    table.replace_column_values(column, normalized)?;
    Ok(())
}

/// Broadcasts the per-date OR of `holiday` onto every row of that date.
///
/// Upstream feature generation flags only the midnight hour of a holiday;
/// every other hour of the date must be raised to 1 as well. Grouping by
/// `date` keeps this linear in row count, and re-running is a no-op.
/// Returns the number of distinct holiday dates.
pub fn repair_holiday_flags(table: &mut Table) -> Result<usize, PipelineError> {
    let dates = table.require_column("date")?;
    let flags = table.require_column("holiday")?;

    let mut flagged_dates: HashMap<String, bool> = HashMap::new();
    for (date, flag) in dates.values().iter().zip(flags.values()) {
        let entry = flagged_dates.entry(group_key(date)).or_insert(false);
        *entry |= flag.as_i64() == Some(1);
    }
    let holiday_dates = flagged_dates.values().filter(|flag| **flag).count();

    let repaired: Vec<Value> = dates
        .values()
        .iter()
        .zip(flags.values())
        .map(|(date, flag)| {
            if flagged_dates[&group_key(date)] {
                Value::Int(1)
            } else {
                flag.clone()
            }
        })
        .collect();

    table.replace_column_values("holiday", repaired)?;
    debug!(
        component = "pipeline",
        event = "pipeline.holiday.repaired",
        holiday_dates = holiday_dates
    );
    Ok(holiday_dates)
}

/// Appends `week_of_year` as the ISO-8601 week number of `date_hour`.
///
/// Week 1 is the week containing the first Thursday of the ISO year, so an
/// early-January timestamp can report week 52/53 of the prior ISO year.
/// That is accepted behavior, not a defect.
pub fn add_week_of_year(table: &mut Table) -> Result<(), PipelineError> {
    let source = table.require_column("date_hour")?;

    let mut weeks = Vec::with_capacity(source.len());
    for (row, value) in source.values().iter().enumerate() {
        let raw = value.as_str().ok_or_else(|| PipelineError::ParseTimestamp {
            value: cell_display(value),
            row,
        })?;
        let parsed = NaiveDateTime::parse_from_str(raw, DATE_HOUR_FORMAT).map_err(|_| {
            PipelineError::ParseTimestamp {
                value: raw.to_string(),
                row,
            }
        })?;
        weeks.push(Value::Int(parsed.iso_week().week() as i64));
    }

    table.push_column(Column::new("week_of_year", weeks))?;
    Ok(())
}

/// Adds `sin_<name>` / `cos_<name>` for a periodic integer column.
///
/// A minimum observed value of exactly 1 marks the field as one-indexed and
/// shifts it down by 1 before encoding. Null cells yield null pairs. The
/// source column is retained.
pub fn encode_cyclical(table: &mut Table, field: &CyclicalField) -> Result<(), PipelineError> {
    let source = table.require_column(&field.column)?;

    let mut cells: Vec<Option<i64>> = Vec::with_capacity(source.len());
    for (row, value) in source.values().iter().enumerate() {
        match value {
            Value::Int(v) => cells.push(Some(*v)),
            Value::Null => cells.push(None),
            _ => {
                return Err(PipelineError::NonIntegerCell {
                    column: field.column.clone(),
                    row,
                })
            }
        }
    }

    let observed_min = cells.iter().flatten().min().copied();
    let shift = if observed_min == Some(1) { 1 } else { 0 };

    let divisor = match field.period {
        PeriodPolicy::Fixed(period) => period as i64,
        PeriodPolicy::FromData => {
            let observed_max =
                cells
                    .iter()
                    .flatten()
                    .max()
                    .copied()
                    .ok_or(PipelineError::EmptyCyclicalColumn {
                        column: field.column.clone(),
                    })?;
            observed_max - shift
        }
    };
    if divisor <= 0 {
        return Err(PipelineError::ZeroPeriod {
            column: field.column.clone(),
        });
    }

    let mut sin_values = Vec::with_capacity(cells.len());
    let mut cos_values = Vec::with_capacity(cells.len());
    for cell in &cells {
        match cell {
            Some(v) => {
                let angle = 2.0 * PI * ((v - shift) as f64) / divisor as f64;
                sin_values.push(Value::Float(angle.sin()));
                cos_values.push(Value::Float(angle.cos()));
            }
            None => {
                sin_values.push(Value::Null);
                cos_values.push(Value::Null);
            }
        }
    }

    table.push_column(Column::new(format!("sin_{}", field.column), sin_values))?;
    table.push_column(Column::new(format!("cos_{}", field.column), cos_values))?;
    debug!(
        component = "pipeline",
        event = "pipeline.cyclical.encoded",
        column = %field.column,
        divisor = divisor,
        one_indexed = shift == 1
    );
    Ok(())
}

/// Removes leakage columns (`leakage_patterns` substrings), then the named
/// drop columns, then redundant rolling aggregates (`redundant_patterns`).
/// Zero matches is a safe no-op. Returns the removed names in order.
pub fn prune_columns(table: &mut Table, cfg: &PipelineConfig) -> Vec<String> {
    let mut removed = Vec::new();

    let leakage: Vec<String> = matching_columns(table, &cfg.leakage_patterns);
    for name in leakage {
        table.remove_column(&name);
        removed.push(name);
    }

    for name in &cfg.drop_columns {
        if table.remove_column(name).is_some() {
            removed.push(name.clone());
        }
    }

    let redundant: Vec<String> = matching_columns(table, &cfg.redundant_patterns);
    for name in redundant {
        table.remove_column(&name);
        removed.push(name);
    }

    debug!(
        component = "pipeline",
        event = "pipeline.prune.finish",
        removed = removed.len()
    );
    removed
}

fn matching_columns(table: &Table, patterns: &[String]) -> Vec<String> {
    table
        .column_names()
        .iter()
        .filter(|name| patterns.iter().any(|pattern| name.contains(pattern.as_str())))
        .map(|name| name.to_string())
        .collect()
}

/// Finds the first non-null row of the reference column and drops everything
/// before it. Returns the boundary index.
///
/// The reference column is a proxy: it is the last rolling aggregate to fill
/// in, so its first valid row is taken as the first fully-populated row.
/// Later nulls in other columns are not this stage's responsibility; enable
/// `verify_no_nulls` to check for them.
pub fn trim_warmup(table: &mut Table, reference: &str) -> Result<usize, PipelineError> {
    let column = table.require_column(reference)?;
    let boundary = column
        .values()
        .iter()
        .position(|value| !value.is_null())
        .ok_or_else(|| PipelineError::AllNullReference {
            column: reference.to_string(),
        })?;

    table.slice_from(boundary);
    debug!(
        component = "pipeline",
        event = "pipeline.warmup.trimmed",
        boundary = boundary,
        remaining_rows = table.num_rows()
    );
    Ok(boundary)
}

/// Post-trim integrity scan: errors on the first null cell found.
pub fn verify_no_nulls(table: &Table) -> Result<(), PipelineError> {
    for column in table.columns() {
        if let Some(row) = column.values().iter().position(Value::is_null) {
            return Err(PipelineError::NullAfterTrim {
                column: column.name().to_string(),
                row,
            });
        }
    }
    Ok(())
}

pub fn build_output_schema(table: &Table) -> OutputSchema {
    let columns: Vec<String> = table
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let fingerprint = schema_fingerprint(&columns);
    OutputSchema {
        version: PIPELINE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

/// Guards a downstream consumer against reading a table produced by a
/// different pipeline revision or column set.
pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &OutputSchema,
) -> Result<(), PipelineError> {
    if expected_version != actual.version {
        return Err(PipelineError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }
    if expected_fingerprint != actual.fingerprint {
        return Err(PipelineError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

fn schema_fingerprint(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{PIPELINE_SCHEMA_VERSION};columns:"));
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(";");
    }
    hex::encode(hasher.finalize())
}

fn group_key(value: &Value) -> String {
    cell_display(value)
}

fn cell_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Str(v) => v.clone(),
    }
}
