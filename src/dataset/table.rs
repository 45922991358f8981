//! In-memory dataset table and its artifact layout
//!
//! ```text
//! row 1   variable names         time_splitting,format
//! row 2   variable values        quarters,weeks|topics
//! row 3   column headers         sampleid,read_actions,read_actions/mean,target
//! row 4+  one row per unique sample id
//! ```

use super::csv;
use crate::{Error, Result};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// Separator joining distinct metadata values of merged datasets.
pub const METADATA_SEPARATOR: &str = "|";

/// Name of the first column.
pub const SAMPLE_ID_COLUMN: &str = "sampleid";

/// Feature values of one unlabelled row keyed by column name.
pub type FeatureMap = BTreeMap<String, String>;

/// A parsed dataset artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetTable {
    /// Analysable-level variable names
    pub var_names: Vec<String>,
    /// Analysable-level variable values
    pub var_values: Vec<String>,
    /// Column headers, first one is the unique sample id
    pub columns: Vec<String>,
    /// Data rows in column order
    pub rows: Vec<Vec<String>>,
}

impl DatasetTable {
    /// Create an empty table with the given headers.
    #[must_use]
    pub fn new(var_names: Vec<String>, var_values: Vec<String>, columns: Vec<String>) -> Self {
        Self {
            var_names,
            var_values,
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a data row.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the row width does not match the columns
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::invalid_input(format!(
                "row has {} values but the dataset has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Number of data rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize to the artifact format.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        csv::write_record(&mut out, &self.var_names);
        csv::write_record(&mut out, &self.var_values);
        csv::write_record(&mut out, &self.columns);
        for row in &self.rows {
            csv::write_record(&mut out, row);
        }
        out
    }

    /// Parse an artifact.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the header rows are missing or a data row
    /// width differs from the column header
    pub fn parse(content: &str) -> Result<Self> {
        let mut records = csv::parse(content)?.into_iter();
        let mut header = |what: &str| {
            records
                .next()
                .ok_or_else(|| Error::storage(format!("dataset is missing its {what} row")))
        };
        let var_names = header("variable names")?;
        let var_values = header("variable values")?;
        let columns = header("column headers")?;

        let mut table = Self::new(var_names, var_values, columns);
        for (i, row) in records.enumerate() {
            table
                .push_row(row)
                .map_err(|e| Error::storage(format!("data row {}: {e}", i + 1)))?;
        }
        Ok(table)
    }

    /// Union many tables with identical headers.
    ///
    /// Each metadata cell becomes the distinct values of that variable across
    /// inputs, in first-seen order, joined with [`METADATA_SEPARATOR`]. Empty
    /// values mark a variable the input did not have and are left out. Data
    /// rows are concatenated in input order.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` when there is nothing to merge or the
    /// variable or column headers differ
    pub fn merge(tables: &[Self]) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| Error::invalid_input("no datasets to merge"))?;

        for (i, table) in tables.iter().enumerate().skip(1) {
            if table.var_names != first.var_names {
                return Err(Error::invalid_input(format!(
                    "dataset {i} variable names {:?} differ from {:?}",
                    table.var_names, first.var_names
                )));
            }
            if table.columns != first.columns {
                return Err(Error::invalid_input(format!(
                    "dataset {i} columns differ from the first dataset columns"
                )));
            }
        }

        let var_values = (0..first.var_names.len())
            .map(|index| {
                let mut seen = FxHashSet::default();
                let mut distinct: Vec<&str> = Vec::new();
                let values = tables
                    .iter()
                    .filter_map(|table| table.var_values.get(index))
                    .filter(|value| !value.is_empty());
                for value in values {
                    if seen.insert(trueno::hash_key(value)) {
                        distinct.push(value);
                    }
                }
                distinct.join(METADATA_SEPARATOR)
            })
            .collect();

        Ok(Self {
            var_names: first.var_names.clone(),
            var_values,
            columns: first.columns.clone(),
            rows: tables.iter().flat_map(|table| table.rows.iter().cloned()).collect(),
        })
    }

    /// Map each unique sample id to its features, without the id column.
    #[must_use]
    pub fn feature_maps(&self) -> BTreeMap<String, FeatureMap> {
        let names = self.columns.iter().skip(1);
        self.rows
            .iter()
            .filter_map(|row| {
                let (id, values) = row.split_first()?;
                let features = names.clone().cloned().zip(values.iter().cloned()).collect();
                Some((id.clone(), features))
            })
            .collect()
    }
}
