use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::DashboardError;

/// Categorical columns the dashboard views read.
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["Category", "Content_Rating", "Android_Ver"];

/// Numeric columns the dashboard views read.
pub const NUMERIC_COLUMNS: [&str; 5] = ["Rating", "Reviews", "Size", "Installs", "Price"];

/// Every column selectable on the correlation axes, in dropdown order.
pub const VIEW_COLUMNS: [&str; 8] = [
    "Category",
    "Rating",
    "Reviews",
    "Size",
    "Installs",
    "Price",
    "Content_Rating",
    "Android_Ver",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Categorical,
    Numeric,
}

/// A single typed column. Missing values are `None`.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Categorical(Vec<Option<String>>),
    Numeric(Vec<Option<f64>>),
}

impl Column {
    /// Builds a categorical column with no missing values.
    pub fn categorical<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Column::Categorical(values.into_iter().map(|v| Some(v.into())).collect())
    }

    /// Builds a numeric column with no missing values.
    pub fn numeric<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Column::Numeric(values.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Categorical(v) => v.len(),
            Column::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Categorical(_) => ColumnKind::Categorical,
            Column::Numeric(_) => ColumnKind::Numeric,
        }
    }

    pub fn datum(&self, index: usize) -> Datum<'_> {
        match self {
            Column::Categorical(v) => match v.get(index) {
                Some(Some(s)) => Datum::Text(s),
                _ => Datum::Null,
            },
            Column::Numeric(v) => match v.get(index) {
                Some(Some(n)) => Datum::Number(*n),
                _ => Datum::Null,
            },
        }
    }
}

/// A borrowed cell value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Datum<'a> {
    Text(&'a str),
    Number(f64),
    Null,
}

impl<'a> Datum<'a> {
    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Datum::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

impl fmt::Display for Datum<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Number(n) => write!(f, "{}", n),
            Datum::Null => Ok(()),
        }
    }
}

/// The cleaned, immutable table shared by every session.
///
/// There is no mutating API: once built, a `Dataset` is only ever read,
/// typically through an `Arc<Dataset>`.
#[derive(Debug)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Dataset {
    /// Assembles a dataset from named columns.
    ///
    /// # Errors
    /// * `DataLoad` if no columns are given, a name repeats, or the columns
    ///   have different lengths
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, DashboardError> {
        if columns.is_empty() {
            return Err(DashboardError::data_load("dataset has no columns"));
        }

        let rows = columns[0].1.len();
        let mut seen = BTreeSet::new();
        for (name, column) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(DashboardError::data_load(format!(
                    "duplicate column \"{}\"",
                    name
                )));
            }
            if column.len() != rows {
                return Err(DashboardError::data_load(format!(
                    "column \"{}\" has {} values, expected {}",
                    name,
                    column.len(),
                    rows
                )));
            }
        }

        let (names, columns) = columns.into_iter().unzip();
        Ok(Dataset {
            names,
            columns,
            rows,
        })
    }

    /// Loads and cleans a CSV file.
    ///
    /// # Errors
    /// * `DataLoad` if the file cannot be read, lacks a required column, or
    ///   has no usable rows after cleaning
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashboardError> {
        let raw = crate::loader::from_csv(path)?;
        crate::preprocess::run(raw)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Result<&Column, DashboardError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| DashboardError::UnknownColumn(name.to_string()))
    }

    /// Checks that `name` exists and has the expected kind.
    pub fn require(&self, name: &str, kind: ColumnKind) -> Result<(), DashboardError> {
        match self.column(name) {
            Ok(column) if column.kind() == kind => Ok(()),
            Ok(_) => Err(DashboardError::data_load(format!(
                "column \"{}\" should be {:?}",
                name, kind
            ))),
            Err(_) => Err(DashboardError::data_load(format!(
                "missing required column \"{}\"",
                name
            ))),
        }
    }

    /// Column-wise projection, in the requested order.
    pub fn project(&self, columns: &[&str]) -> Result<Vec<&Column>, DashboardError> {
        columns.iter().map(|name| self.column(name)).collect()
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows).then_some(Row {
            dataset: self,
            index,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.rows).map(move |index| Row {
            dataset: self,
            index,
        })
    }

    /// Selects the rows matching `predicate`, preserving dataset order.
    pub fn filter<P>(&self, predicate: P) -> RowSet<'_>
    where
        P: Fn(&Row<'_>) -> bool,
    {
        let indices = self
            .rows()
            .filter(|row| predicate(row))
            .map(|row| row.index)
            .collect();
        RowSet {
            dataset: self,
            indices,
        }
    }

    /// Every row, as a `RowSet`.
    pub fn all(&self) -> RowSet<'_> {
        RowSet {
            dataset: self,
            indices: (0..self.rows).collect(),
        }
    }

    /// Distinct non-null values of a categorical column, in first-seen order.
    pub fn unique(&self, name: &str) -> Result<Vec<String>, DashboardError> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for row in self.rows() {
            if let Some(value) = row.get(name)?.as_text() {
                if seen.insert(value) {
                    out.push(value.to_string());
                }
            }
        }
        Ok(out)
    }
}

/// A borrowed view of one dataset row.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    dataset: &'a Dataset,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Result<Datum<'a>, DashboardError> {
        Ok(self.dataset.column(column)?.datum(self.index))
    }

    /// Text value of a categorical column; `None` for nulls and unknown columns.
    pub fn text(&self, column: &str) -> Option<&'a str> {
        match self.get(column) {
            Ok(Datum::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        match self.get(column) {
            Ok(Datum::Number(n)) => Some(n),
            _ => None,
        }
    }
}

/// An ordered subset of dataset rows.
pub struct RowSet<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> RowSet<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'a>> + '_ {
        let dataset = self.dataset;
        self.indices.iter().map(move |&index| Row { dataset, index })
    }

    /// Non-null numbers of `column` over this subset.
    pub fn numbers(&self, column: &str) -> Result<Vec<f64>, DashboardError> {
        let col = self.dataset.column(column)?;
        Ok(self
            .indices
            .iter()
            .filter_map(|&i| col.datum(i).as_number())
            .collect())
    }

    /// Non-null text values of `column` over this subset.
    pub fn texts(&self, column: &str) -> Result<Vec<&'a str>, DashboardError> {
        let col = self.dataset.column(column)?;
        Ok(self
            .indices
            .iter()
            .filter_map(|&i| match col.datum(i) {
                Datum::Text(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Keeps at most the first `n` rows.
    pub fn head(mut self, n: usize) -> Self {
        self.indices.truncate(n);
        self
    }
}
