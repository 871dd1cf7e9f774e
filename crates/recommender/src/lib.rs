//! Retail purchase recommender
//!
//! Turns a transaction log into an object×user purchase-count matrix, factors
//! it with non-negative matrix factorization and recombines the factors into
//! affinity scores used to rank objects for each user.
//!
//! The pipeline moves through three stages:
//! Uninitialized → MatrixBuilt (after `load`) → Trained (after `create_model`).

pub mod aggregation;
pub mod config;
pub mod error;
pub mod factorization;
pub mod initialization;
pub mod persistence;
pub mod pipeline;
pub mod ranking;
pub mod reconstruction;
pub mod recommender;
pub mod sparse;
pub mod types;

// Re-export key types
pub use aggregation::{Aggregation, InteractionAggregator};
pub use config::{load_dotenv, ConfigLoader, PipelineConfig};
pub use error::{RecommenderError, Stage};
pub use factorization::{Factors, FitReport, Nmf, NmfConfig};
pub use initialization::InitStrategy;
pub use persistence::SavedModel;
pub use pipeline::NmfPipeline;
pub use ranking::{Recommendation, ScoredObject};
pub use reconstruction::{AffinityReconstructor, Reconstruction};
pub use recommender::Recommender;
pub use sparse::{DuplicatePolicy, InteractionMatrix, InteractionMatrixBuilder};
pub use types::{Dataset, InteractionCount, KeyIndex, Table};

pub type Result<T> = std::result::Result<T, RecommenderError>;
