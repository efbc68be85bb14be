//! Downstream regression collaborator: design-matrix extraction, ordinary
//! least squares, and error metrics over a third-pass table.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::table::{Table, TableError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub target_column: String,
    /// Columns excluded from the design matrix. The target is excluded as a
    /// feature regardless.
    pub excluded_columns: Vec<String>,
    /// Final contiguous calendar-ordered block reserved for evaluation.
    pub holdout_rows: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            target_column: "load".to_string(),
            excluded_columns: vec![
                "date_hour".to_string(),
                "load".to_string(),
                "hour".to_string(),
                "weekday".to_string(),
                "week_of_year".to_string(),
            ],
            holdout_rows: 1_440,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub timestamps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub r2: f64,
    pub mape: f64,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("column '{column}' has a non-numeric or null value at row {row}")]
    NonNumericCell { column: String, row: usize },
    #[error("dataset has no rows")]
    EmptyDataset,
    #[error("holdout of {holdout} rows does not leave a training set ({rows} rows total)")]
    HoldoutTooLarge { holdout: usize, rows: usize },
    #[error("design matrix row {row} has {found} features, expected {expected}")]
    RowWidthMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("predictions ({predictions}) and targets ({targets}) differ in length")]
    PredictionLengthMismatch {
        predictions: usize,
        targets: usize,
    },
    #[error("target is zero at row {row}; MAPE is undefined")]
    ZeroTarget { row: usize },
    #[error("normal equations are singular; features may be collinear")]
    SingularSystem,
}

/// Builds the design matrix and target vector from a third-pass table.
///
/// Every cell outside the excluded columns must be numeric and non-null.
/// `date_hour` is carried along for downstream timeseries reporting.
pub fn extract_dataset(table: &Table, cfg: &DatasetConfig) -> Result<Dataset, ModelError> {
    let target = table.require_column(&cfg.target_column)?;
    let rows = table.num_rows();

    let feature_columns: Vec<_> = table
        .columns()
        .iter()
        .filter(|column| {
            column.name() != cfg.target_column
                && !cfg.excluded_columns.iter().any(|ex| ex == column.name())
        })
        .collect();
    let feature_names: Vec<String> = feature_columns
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    let mut matrix = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut features = Vec::with_capacity(feature_columns.len());
        for column in &feature_columns {
            let value =
                column.values()[row]
                    .as_f64()
                    .ok_or_else(|| ModelError::NonNumericCell {
                        column: column.name().to_string(),
                        row,
                    })?;
            features.push(value);
        }
        matrix.push(features);
    }

    let mut targets = Vec::with_capacity(rows);
    for (row, value) in target.values().iter().enumerate() {
        targets.push(value.as_f64().ok_or_else(|| ModelError::NonNumericCell {
            column: cfg.target_column.clone(),
            row,
        })?);
    }

    let timestamps = match table.column("date_hour") {
        Some(column) => column
            .values()
            .iter()
            .map(|value| value.as_str().unwrap_or_default().to_string())
            .collect(),
        None => vec![String::new(); rows],
    };

    Ok(Dataset {
        feature_names,
        rows: matrix,
        targets,
        timestamps,
    })
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Splits off the final `holdout_rows` block as the evaluation set.
    pub fn split_holdout(self, holdout_rows: usize) -> Result<(Dataset, Dataset), ModelError> {
        let total = self.rows.len();
        if total == 0 {
            return Err(ModelError::EmptyDataset);
        }
        if holdout_rows == 0 || holdout_rows >= total {
            return Err(ModelError::HoldoutTooLarge {
                holdout: holdout_rows,
                rows: total,
            });
        }

        let split = total - holdout_rows;
        let mut rows = self.rows;
        let mut targets = self.targets;
        let mut timestamps = self.timestamps;
        let test_rows = rows.split_off(split);
        let test_targets = targets.split_off(split);
        let test_timestamps = timestamps.split_off(split);

        let train = Dataset {
            feature_names: self.feature_names.clone(),
            rows,
            targets,
            timestamps,
        };
        let test = Dataset {
            feature_names: self.feature_names,
            rows: test_rows,
            targets: test_targets,
            timestamps: test_timestamps,
        };
        Ok((train, test))
    }
}

/// Fits ordinary least squares with an intercept via the normal equations,
/// solved by Gaussian elimination with partial pivoting.
pub fn fit_linear(rows: &[Vec<f64>], targets: &[f64]) -> Result<LinearModel, ModelError> {
    if rows.is_empty() {
        return Err(ModelError::EmptyDataset);
    }
    if rows.len() != targets.len() {
        return Err(ModelError::PredictionLengthMismatch {
            predictions: rows.len(),
            targets: targets.len(),
        });
    }
    let width = rows[0].len();
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ModelError::RowWidthMismatch {
                row: idx,
                found: row.len(),
                expected: width,
            });
        }
    }

    // Augmented feature count: intercept column plus `width` features.
    let n = width + 1;
    let mut xtx = vec![vec![0.0_f64; n]; n];
    let mut xty = vec![0.0_f64; n];

    for (row, target) in rows.iter().zip(targets) {
        for i in 0..n {
            let xi = if i == 0 { 1.0 } else { row[i - 1] };
            xty[i] += xi * target;
            for j in 0..n {
                let xj = if j == 0 { 1.0 } else { row[j - 1] };
                xtx[i][j] += xi * xj;
            }
        }
    }

    let solution = solve_linear_system(&mut xtx, &mut xty)?;
    let model = LinearModel {
        intercept: solution[0],
        coefficients: solution[1..].to_vec(),
    };

    info!(
        component = "model",
        event = "model.fit.finish",
        training_rows = rows.len(),
        features = width
    );
    Ok(model)
}

impl LinearModel {
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// MSE, R², and MAPE over a held-out block. MAPE requires nonzero targets.
pub fn evaluate(targets: &[f64], predictions: &[f64]) -> Result<RegressionMetrics, ModelError> {
    if targets.is_empty() {
        return Err(ModelError::EmptyDataset);
    }
    if targets.len() != predictions.len() {
        return Err(ModelError::PredictionLengthMismatch {
            predictions: predictions.len(),
            targets: targets.len(),
        });
    }

    let n = targets.len() as f64;
    let mse = targets
        .iter()
        .zip(predictions)
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / n;

    let mean = targets.iter().sum::<f64>() / n;
    let ss_tot = targets.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>();
    let ss_res = targets
        .iter()
        .zip(predictions)
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    let mut mape_sum = 0.0;
    for (row, (t, p)) in targets.iter().zip(predictions).enumerate() {
        if *t == 0.0 {
            return Err(ModelError::ZeroTarget { row });
        }
        mape_sum += (t - p).abs() / t.abs();
    }
    let mape = mape_sum / n;

    Ok(RegressionMetrics { mse, r2, mape })
}

fn solve_linear_system(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>, ModelError> {
    let n = b.len();

    for pivot in 0..n {
        let mut best = pivot;
        for row in pivot + 1..n {
            if a[row][pivot].abs() > a[best][pivot].abs() {
                best = row;
            }
        }
        if a[best][pivot].abs() < 1e-12 {
            return Err(ModelError::SingularSystem);
        }
        a.swap(pivot, best);
        b.swap(pivot, best);

        for row in pivot + 1..n {
            let factor = a[row][pivot] / a[pivot][pivot];
            for col in pivot..n {
                a[row][col] -= factor * a[pivot][col];
            }
            b[row] -= factor * b[pivot];
        }
    }

    let mut solution = vec![0.0_f64; n];
    for pivot in (0..n).rev() {
        let mut acc = b[pivot];
        for col in pivot + 1..n {
            acc -= a[pivot][col] * solution[col];
        }
        solution[pivot] = acc / a[pivot][pivot];
    }
    Ok(solution)
}
