//! # Data Sets and CSV Loading
//!
//! The search only needs two things from a data set: how many samples it holds
//! (for cross-validation and the information criteria) and a way to take an
//! ordered subset of samples (for training and held-out folds). The
//! [`Dataset`] trait captures exactly that. Data-free losses use `()`.
//!
//! [`RegressionData`] is the built-in tabular container used by the GLM
//! losses and the CLI. It is loaded from a CSV file with a header row: one
//! response column, every other column a numeric feature.

use csv::ReaderBuilder;
use ndarray::{Array1, Array2, Axis};
use std::path::Path;
use thiserror::Error;

/// A fixed-size, indexable sample collection with a stable sample order.
pub trait Dataset: Sync {
    /// Number of samples, or `None` for data-free objectives.
    fn n_samples(&self) -> Option<usize>;

    /// The samples at `indices`, in that order.
    fn subset(&self, indices: &[usize]) -> Self
    where
        Self: Sized;
}

impl Dataset for () {
    fn n_samples(&self) -> Option<usize> {
        None
    }

    fn subset(&self, _: &[usize]) -> Self {}
}

/// Design matrix and response for the built-in GLM losses.
#[derive(Debug, Clone)]
pub struct RegressionData {
    /// Shape `[n_samples, n_features]`.
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Column names of `x`, in order.
    pub feature_names: Vec<String>,
}

impl RegressionData {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Self {
        let feature_names = (0..x.ncols()).map(|j| format!("x{j}")).collect();
        Self {
            x,
            y,
            feature_names,
        }
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

impl Dataset for RegressionData {
    fn n_samples(&self) -> Option<usize> {
        Some(self.y.len())
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error(
        "The response column '{0}' was not found in the header. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("The input has no feature columns besides the response '{0}'.")]
    NoFeatureColumns(String),
    #[error("Row {row}, column '{column}': '{value}' is not a finite number.")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Row {row} has {found} fields, but the header has {expected}.")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("The input contains no data rows.")]
    Empty,
}

/// Loads a CSV file (comma or tab separated, chosen by extension) into
/// [`RegressionData`].
pub fn load_regression_csv<P: AsRef<Path>>(
    path: P,
    response: &str,
) -> Result<RegressionData, DataError> {
    let path = path.as_ref();
    let delimiter = match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    };
    let reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    read_regression(reader, response)
}

fn read_regression<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    response: &str,
) -> Result<RegressionData, DataError> {
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let response_col = headers
        .iter()
        .position(|h| h == response)
        .ok_or_else(|| DataError::ColumnNotFound(response.to_string()))?;
    let feature_cols: Vec<usize> = (0..headers.len()).filter(|&c| c != response_col).collect();
    if feature_cols.is_empty() {
        return Err(DataError::NoFeatureColumns(response.to_string()));
    }

    let mut y = Vec::new();
    let mut x = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(DataError::RaggedRow {
                row: row + 1,
                expected: headers.len(),
                found: record.len(),
            });
        }
        let parse = |col: usize| -> Result<f64, DataError> {
            let raw = &record[col];
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DataError::NonNumeric {
                    row: row + 1,
                    column: headers[col].clone(),
                    value: raw.to_string(),
                })
        };
        y.push(parse(response_col)?);
        for &col in &feature_cols {
            x.push(parse(col)?);
        }
    }
    if y.is_empty() {
        return Err(DataError::Empty);
    }

    let n = y.len();
    let p = feature_cols.len();
    let x = Array2::from_shape_vec((n, p), x).map_err(|_| DataError::Empty)?;
    log::info!("Loaded {} samples with {} feature columns.", n, p);
    Ok(RegressionData {
        x,
        y: Array1::from(y),
        feature_names: feature_cols.iter().map(|&c| headers[c].clone()).collect(),
    })
}
