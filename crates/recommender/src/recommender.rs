//! Common interface for recommendation models

use crate::pipeline::NmfPipeline;
use crate::types::Dataset;
use crate::Result;

/// A model that learns from a purchase log and ranks objects per user
pub trait Recommender {
    /// Ingest a dataset and prepare whatever the model trains on
    fn prepare(&mut self, dataset: Dataset) -> Result<()>;

    fn train(&mut self) -> Result<()>;

    /// Top `n` object keys for a user, best first
    fn recommend(&self, user_key: &str, n: usize) -> Result<Vec<String>>;
}

impl Recommender for NmfPipeline {
    fn prepare(&mut self, dataset: Dataset) -> Result<()> {
        self.load(dataset).map(|_| ())
    }

    fn train(&mut self) -> Result<()> {
        self.create_model().map(|_| ())
    }

    fn recommend(&self, user_key: &str, n: usize) -> Result<Vec<String>> {
        let recommendation = self.recommend_for(user_key, n)?;
        Ok(recommendation
            .objects
            .into_iter()
            .map(|o| o.object_key)
            .collect())
    }
}
