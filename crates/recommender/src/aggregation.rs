//! Interaction aggregation
//!
//! Counts purchases per (object, user) pair and resolves each pair to the
//! row/column coordinates given by the position of its keys in the object and
//! user reference tables.

use crate::error::RecommenderError;
use crate::types::{Dataset, InteractionCount, KeyIndex};
use crate::Result;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Output of one aggregation pass
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// One entry per observed pair, sorted by (object_key, user_key)
    pub counts: Vec<InteractionCount>,
    pub objects: KeyIndex,
    pub users: KeyIndex,
    /// Number of transactions consumed
    pub transactions: usize,
}

impl Aggregation {
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }
}

/// Groups a transaction log into `InteractionCount` rows
#[derive(Debug, Clone)]
pub struct InteractionAggregator {
    object_key: String,
    users_key: String,
}

impl InteractionAggregator {
    pub fn new(object_key: impl Into<String>, users_key: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            users_key: users_key.into(),
        }
    }

    /// Count purchases of each object by each user
    ///
    /// # Errors
    /// - `Schema` if a key column is missing from the log or a reference table
    /// - `Integrity` if the log references a key absent from its reference
    ///   table, or a reference table repeats a key
    pub fn get_counts(&self, dataset: &Dataset) -> Result<Aggregation> {
        // Resolve every column up front so schema problems surface before any work.
        let object_col = dataset.transactions.column(&self.object_key)?;
        let user_col = dataset.transactions.column(&self.users_key)?;
        let objects = KeyIndex::from_table(&dataset.objects, &self.object_key)?;
        let users = KeyIndex::from_table(&dataset.users, &self.users_key)?;

        info!(
            users = users.len(),
            objects = objects.len(),
            transactions = dataset.transactions.len(),
            "Counting purchase volume per object for each user"
        );

        let mut grouped: BTreeMap<(&str, &str), u64> = BTreeMap::new();
        for (object_key, user_key) in object_col.into_iter().zip(user_col) {
            *grouped.entry((object_key, user_key)).or_insert(0) += 1;
        }

        let mut counts = Vec::with_capacity(grouped.len());
        for ((object_key, user_key), volume) in grouped {
            let row_idx = objects.position(object_key).ok_or_else(|| {
                RecommenderError::Integrity(format!(
                    "transaction references {} '{}' missing from '{}'",
                    self.object_key,
                    object_key,
                    dataset.objects.name()
                ))
            })?;
            let col_idx = users.position(user_key).ok_or_else(|| {
                RecommenderError::Integrity(format!(
                    "transaction references {} '{}' missing from '{}'",
                    self.users_key,
                    user_key,
                    dataset.users.name()
                ))
            })?;

            counts.push(InteractionCount {
                object_key: object_key.to_string(),
                user_key: user_key.to_string(),
                row_idx,
                col_idx,
                volume,
            });
        }

        debug!(pairs = counts.len(), "Aggregated interaction counts");

        Ok(Aggregation {
            counts,
            objects,
            users,
            transactions: dataset.transactions.len(),
        })
    }
}
