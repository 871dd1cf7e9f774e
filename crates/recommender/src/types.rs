//! Core data types shared across pipeline stages
//!
//! Tables are kept deliberately simple: named columns of string cells in
//! their natural (load) order. The row position of a key in a reference table
//! is its matrix index.

use crate::error::RecommenderError;
use crate::Result;
use std::collections::HashMap;

/// In-memory table with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given column names
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; the cell count must match the column count
    pub fn push_row<I, S>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let row: Vec<String> = cells.into_iter().map(Into::into).collect();
        if row.len() != self.columns.len() {
            return Err(RecommenderError::Dimension(format!(
                "table '{}' expects {} cells per row, got {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Single-column table, the usual shape of a reference table
    pub fn from_keys<I, S>(name: impl Into<String>, column: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: vec![column.to_string()],
            rows: keys.into_iter().map(|k| vec![k.into()]).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, or a schema error naming this table
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| RecommenderError::Schema {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Cells of one column, in row order
    pub fn column(&self, column: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Keep only the first `n` rows
    pub fn head(&self, n: usize) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

/// Key → positional index for a reference table
///
/// Built once per load; rejects duplicated keys so every key maps to exactly
/// one row/column.
#[derive(Debug, Clone)]
pub struct KeyIndex {
    keys: Vec<String>,
    positions: HashMap<String, usize>,
}

impl KeyIndex {
    pub fn from_table(table: &Table, key_column: &str) -> Result<Self> {
        let keys: Vec<String> = table
            .column(key_column)?
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut positions = HashMap::with_capacity(keys.len());
        for (idx, key) in keys.iter().enumerate() {
            if positions.insert(key.clone(), idx).is_some() {
                return Err(RecommenderError::Integrity(format!(
                    "key '{}' appears more than once in column '{}' of '{}'",
                    key,
                    key_column,
                    table.name()
                )));
            }
        }

        Ok(Self { keys, positions })
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn key(&self, position: usize) -> Option<&str> {
        self.keys.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Objects, users and the transaction log for one pipeline run
#[derive(Debug, Clone)]
pub struct Dataset {
    pub objects: Table,
    pub users: Table,
    pub transactions: Table,
}

impl Dataset {
    pub fn new(objects: Table, users: Table, transactions: Table) -> Self {
        Self {
            objects,
            users,
            transactions,
        }
    }

    /// Restrict the transaction log to its first `nsample` rows (all rows when `None`)
    pub fn sample(mut self, nsample: Option<usize>) -> Self {
        if let Some(n) = nsample {
            self.transactions = self.transactions.head(n);
        }
        self
    }
}

/// Purchase volume of one object by one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionCount {
    pub object_key: String,
    pub user_key: String,
    /// Row of the object in the objects reference table
    pub row_idx: usize,
    /// Column of the user in the users reference table
    pub col_idx: usize,
    pub volume: u64,
}
