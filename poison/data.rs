//! # Datasets, Masks and Poison Sets
//!
//! This module owns the data model shared by every stage of the attack, and the thin
//! TSV surface used by the command line tool.
//!
//! - `Dataset`: the clean feature matrix and label vector. Read-only once built.
//! - `CategoricalMask`: which feature columns are restricted to observed categories.
//! - `PoisonSet`: the crafted rows. Each restart owns exactly one and mutates it.
//!
//! The TSV loader follows a strict schema: a `label` column holds the regression
//! target and every other column is a numeric feature, kept in file order.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Name of the required target column in TSV input.
pub const LABEL_COLUMN: &str = "label";

/// A comprehensive error type for data construction, loading and writing.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to write TSV output: {0}")]
    CsvError(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("The input contains no data rows.")]
    Empty,
    #[error("Feature matrix has {rows} rows but the label vector has {labels} entries.")]
    RowCountMismatch { rows: usize, labels: usize },
    #[error("Categorical mask entry {index} is {value}; only 0 and 1 are allowed.")]
    InvalidMaskValue { index: usize, value: f64 },
    #[error("Categorical column index {index} is out of range for {features} features.")]
    MaskIndexOutOfRange { index: usize, features: usize },
    #[error("There are {names} feature names but the matrix has {columns} columns.")]
    HeaderMismatch { names: usize, columns: usize },
}

/// The clean training data: an n×d feature matrix and its n labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Dataset {
    /// Builds a dataset, rejecting shape mismatches, empty input and non-finite values.
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self, DataError> {
        if x.nrows() != y.len() {
            return Err(DataError::RowCountMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        if y.is_empty() {
            return Err(DataError::Empty);
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound("features".to_string()));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(LABEL_COLUMN.to_string()));
        }
        Ok(Self { x, y })
    }

    /// Copies borrowed matrices into an owned, validated dataset.
    pub fn from_views(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, DataError> {
        Self::new(x.to_owned(), y.to_owned())
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Smallest and largest observed value of one feature column.
    pub fn column_range(&self, column: usize) -> (f64, f64) {
        min_max(self.x.column(column))
    }

    /// Returns a new dataset holding the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
        }
    }
}

fn min_max(values: ArrayView1<f64>) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Marks the feature columns that must stay on the categories seen in clean data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalMask {
    flags: Vec<bool>,
}

impl CategoricalMask {
    /// A mask with no categorical columns.
    pub fn none(n_features: usize) -> Self {
        Self {
            flags: vec![false; n_features],
        }
    }

    /// Builds a mask from a 0/1 indicator vector.
    pub fn from_indicator(indicator: &[f64]) -> Result<Self, DataError> {
        let mut flags = Vec::with_capacity(indicator.len());
        for (index, &value) in indicator.iter().enumerate() {
            if value == 0.0 {
                flags.push(false);
            } else if value == 1.0 {
                flags.push(true);
            } else {
                return Err(DataError::InvalidMaskValue { index, value });
            }
        }
        Ok(Self { flags })
    }

    /// Builds a mask of width `n_features` with the listed columns set.
    pub fn from_columns(n_features: usize, columns: &[usize]) -> Result<Self, DataError> {
        let mut flags = vec![false; n_features];
        for &index in columns {
            if index >= n_features {
                return Err(DataError::MaskIndexOutOfRange {
                    index,
                    features: n_features,
                });
            }
            flags[index] = true;
        }
        Ok(Self { flags })
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_categorical(&self, column: usize) -> bool {
        self.flags.get(column).copied().unwrap_or(false)
    }

    /// Indices of the categorical columns, ascending.
    pub fn columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(index, &flag)| flag.then_some(index))
    }
}

/// The crafted rows of one optimization run: k×d features and k labels.
#[derive(Debug, Clone, PartialEq)]
pub struct PoisonSet {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl PoisonSet {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Self {
        debug_assert_eq!(x.nrows(), y.len());
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Moves every row along `direction` by `step`. Labels only move when `labels` is set.
    pub fn advance(
        &mut self,
        direction_x: ArrayView2<f64>,
        direction_y: ArrayView1<f64>,
        step: f64,
        labels: bool,
    ) {
        self.x.scaled_add(step, &direction_x);
        if labels {
            self.y.scaled_add(step, &direction_y);
        }
    }
}

/// A dataset loaded from TSV along with its feature column names.
#[derive(Debug)]
pub struct LabeledTable {
    pub feature_names: Vec<String>,
    pub data: Dataset,
}

/// Loads a tab-separated file with a `label` column and numeric feature columns.
pub fn load_labeled_tsv(path: &str) -> Result<LabeledTable, DataError> {
    fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let casted = match series.cast(&DataType::Float64) {
            Ok(casted) => casted,
            Err(_) => {
                return Err(DataError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("{:?}", series.dtype()),
                });
            }
        };

        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let chunked = casted.f64()?.rechunk();
        let values: Vec<f64> = chunked.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    log::info!("Loading data from '{path}'");
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::Empty);
    }

    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    if !column_names.iter().any(|c| c == LABEL_COLUMN) {
        return Err(DataError::ColumnNotFound(LABEL_COLUMN.to_string()));
    }
    let feature_names: Vec<String> = column_names
        .into_iter()
        .filter(|c| c != LABEL_COLUMN)
        .collect();

    let n = df.height();
    let y = Array1::from_vec(extract_numeric_column(&df, LABEL_COLUMN)?);

    let mut x = Array2::zeros((n, feature_names.len()));
    for (j, name) in feature_names.iter().enumerate() {
        let column = extract_numeric_column(&df, name)?;
        x.column_mut(j).assign(&Array1::from_vec(column));
    }

    log::info!(
        "Loaded {} rows with {} feature columns.",
        n,
        feature_names.len()
    );

    Ok(LabeledTable {
        feature_names,
        data: Dataset::new(x, y)?,
    })
}

/// Writes features and labels as a tab-separated file, label last.
pub fn write_labeled_tsv(
    path: &str,
    feature_names: &[String],
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(), DataError> {
    if feature_names.len() != x.ncols() {
        return Err(DataError::HeaderMismatch {
            names: feature_names.len(),
            columns: x.ncols(),
        });
    }
    if x.nrows() != y.len() {
        return Err(DataError::RowCountMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;

    let mut header: Vec<String> = feature_names.to_vec();
    header.push(LABEL_COLUMN.to_string());
    writer.write_record(&header)?;

    for (row, &label) in x.axis_iter(Axis(0)).zip(y.iter()) {
        let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        record.push(label.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
