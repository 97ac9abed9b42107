//! Column-typed observational datasets.
//!
//! A [`Dataset`] is an ordered collection of equally long, named, typed
//! columns. Refuters never mutate a dataset in place: every perturbation
//! produces a fresh copy via [`Dataset::assign`] / [`Dataset::take`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// Continuous values.
    Float(Vec<f64>),
    /// Integer values.
    Int(Vec<i64>),
    /// Boolean values.
    Bool(Vec<bool>),
    /// Categorical values (stored as their labels).
    Categorical(Vec<String>),
}

impl Column {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type tag used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Column::Float(_) => "float",
            Column::Int(_) => "int",
            Column::Bool(_) => "bool",
            Column::Categorical(_) => "categorical",
        }
    }

    /// Gather rows by index (indices may repeat; used for resampling).
    pub fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Float(v) => Column::Float(indices.iter().map(|&i| v[i]).collect()),
            Column::Int(v) => Column::Int(indices.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(indices.iter().map(|&i| v[i]).collect()),
            Column::Categorical(v) => {
                Column::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Numeric view: floats as-is, ints widened, bools as 0/1, categories as
    /// their first-occurrence code.
    pub fn as_numeric(&self) -> Vec<f64> {
        match self {
            Column::Float(v) => v.clone(),
            Column::Int(v) => v.iter().map(|&x| x as f64).collect(),
            Column::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            Column::Categorical(v) => {
                let cats = unique_categories(v);
                v.iter()
                    .map(|x| cats.iter().position(|c| c == x).unwrap_or(0) as f64)
                    .collect()
            }
        }
    }

    /// Sample standard deviation (ddof = 1) of the numeric view.
    pub fn std(&self) -> f64 {
        let v = self.as_numeric();
        if v.len() < 2 {
            return 0.0;
        }
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        let ss: f64 = v.iter().map(|x| (x - mean) * (x - mean)).sum();
        (ss / (v.len() - 1) as f64).sqrt()
    }

    /// Distinct category labels in first-occurrence order.
    ///
    /// Returns an error for non-categorical columns.
    pub fn categories(&self) -> Result<Vec<String>> {
        match self {
            Column::Categorical(v) => Ok(unique_categories(v)),
            other => Err(Error::Validation(format!(
                "categories() requires a categorical column, got {}",
                other.kind()
            ))),
        }
    }
}

fn unique_categories(values: &[String]) -> Vec<String> {
    let mut cats: Vec<String> = Vec::new();
    for v in values {
        if !cats.contains(v) {
            cats.push(v.clone());
        }
    }
    cats
}

/// An immutable table of named, typed columns of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset from `(name, column)` pairs.
    ///
    /// All columns must be non-empty, equally long and uniquely named.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::Validation("dataset must have at least one column".into()));
        }
        let n = columns[0].1.len();
        if n == 0 {
            return Err(Error::Validation("dataset columns must be non-empty".into()));
        }
        let mut names = Vec::with_capacity(columns.len());
        let mut cols = Vec::with_capacity(columns.len());
        for (name, col) in columns {
            if col.len() != n {
                return Err(Error::Validation(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    col.len(),
                    n
                )));
            }
            if names.contains(&name) {
                return Err(Error::Validation(format!("duplicate column name '{name}'")));
            }
            names.push(name);
            cols.push(col);
        }
        Ok(Self { names, columns: cols })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.columns[0].len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in table order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| Error::Validation(format!("no column named '{name}'")))
    }

    /// Return a new dataset with `name` set to `column` (replacing an
    /// existing column of that name, or appended at the end).
    pub fn assign(&self, name: impl Into<String>, column: Column) -> Result<Dataset> {
        let name = name.into();
        if column.len() != self.n_rows() {
            return Err(Error::Validation(format!(
                "assigned column '{}' has {} rows, expected {}",
                name,
                column.len(),
                self.n_rows()
            )));
        }
        let mut out = self.clone();
        match out.names.iter().position(|n| *n == name) {
            Some(i) => out.columns[i] = column,
            None => {
                out.names.push(name);
                out.columns.push(column);
            }
        }
        Ok(out)
    }

    /// Return a new dataset containing the given rows, in the given order.
    /// Indices may repeat (bootstrap resampling).
    pub fn take(&self, indices: &[usize]) -> Result<Dataset> {
        let n = self.n_rows();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n) {
            return Err(Error::Validation(format!("row index {bad} out of range (n={n})")));
        }
        Ok(Dataset {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        })
    }

    /// Numeric view of one column.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self.column(name)?.as_numeric())
    }

    /// Numeric views of several columns (column-major).
    pub fn numeric_columns(&self, names: &[String]) -> Result<Vec<Vec<f64>>> {
        names.iter().map(|n| self.numeric_column(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Dataset {
        Dataset::new(vec![
            ("t".into(), Column::Bool(vec![true, false, true])),
            ("y".into(), Column::Float(vec![1.0, 2.0, 3.0])),
            ("w".into(), Column::Categorical(vec!["a".into(), "b".into(), "a".into()])),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_ragged_and_duplicate_columns() {
        let err = Dataset::new(vec![
            ("a".into(), Column::Float(vec![1.0])),
            ("b".into(), Column::Float(vec![1.0, 2.0])),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("rows"));

        let err = Dataset::new(vec![
            ("a".into(), Column::Float(vec![1.0])),
            ("a".into(), Column::Float(vec![2.0])),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn assign_copies_instead_of_mutating() {
        let d = toy();
        let d2 = d.assign("z", Column::Float(vec![0.0, 0.0, 0.0])).unwrap();
        assert!(!d.has_column("z"));
        assert!(d2.has_column("z"));
        assert_eq!(d.n_cols() + 1, d2.n_cols());

        // Replacing keeps the column count.
        let d3 = d.assign("y", Column::Float(vec![9.0, 9.0, 9.0])).unwrap();
        assert_eq!(d3.n_cols(), d.n_cols());
        assert_eq!(d.numeric_column("y").unwrap()[0], 1.0);
        assert_eq!(d3.numeric_column("y").unwrap()[0], 9.0);
    }

    #[test]
    fn take_gathers_rows_with_repeats() {
        let d = toy();
        let s = d.take(&[2, 2, 0]).unwrap();
        assert_eq!(s.n_rows(), 3);
        assert_eq!(s.numeric_column("y").unwrap(), vec![3.0, 3.0, 1.0]);
        assert!(d.take(&[3]).is_err());
    }

    #[test]
    fn numeric_views() {
        let d = toy();
        assert_eq!(d.numeric_column("t").unwrap(), vec![1.0, 0.0, 1.0]);
        // Category codes follow first occurrence: a=0, b=1.
        assert_eq!(d.numeric_column("w").unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn column_std_is_sample_std() {
        let c = Column::Float(vec![1.0, 2.0, 3.0, 4.0]);
        // mean 2.5, sum of squares 5.0, ddof 1
        let expected = (5.0_f64 / 3.0).sqrt();
        assert!((c.std() - expected).abs() < 1e-12, "std={}", c.std());
    }
}
