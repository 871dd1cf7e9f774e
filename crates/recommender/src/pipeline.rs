//! NMF recommendation pipeline
//!
//! Wires the stages together and enforces their order:
//!
//! 1. `load`: sample the transaction log, aggregate counts, build the matrix
//!    (Uninitialized → MatrixBuilt)
//! 2. `create_model`: fit the factorization (MatrixBuilt → Trained)
//! 3. `approx_data` / `estimate_sales` / `recommend_*`: read the factors
//!
//! Calling a step before its prerequisite returns a state error.

use crate::aggregation::{Aggregation, InteractionAggregator};
use crate::config::{ConfigLoader, PipelineConfig};
use crate::error::{RecommenderError, Stage};
use crate::factorization::{FitReport, Factors, Nmf};
use crate::persistence::SavedModel;
use crate::ranking::{top_n_rows, Recommendation, ScoredObject};
use crate::reconstruction::{AffinityReconstructor, Reconstruction};
use crate::sparse::{InteractionMatrix, InteractionMatrixBuilder};
use crate::types::{Dataset, InteractionCount};
use crate::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

struct PreparedData {
    aggregation: Aggregation,
    matrix: InteractionMatrix,
}

struct TrainedModel {
    factors: Factors,
    report: FitReport,
}

pub struct NmfPipeline {
    config: PipelineConfig,
    data: Option<PreparedData>,
    model: Option<TrainedModel>,
    estimated_sales: Option<Reconstruction>,
}

impl NmfPipeline {
    /// Create an empty pipeline; the config is validated here
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            data: None,
            model: None,
            estimated_sales: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        match (&self.data, &self.model) {
            (_, Some(_)) => Stage::Trained,
            (Some(_), None) => Stage::MatrixBuilt,
            (None, None) => Stage::Uninitialized,
        }
    }

    /// Aggregate the dataset and build the interaction matrix
    ///
    /// Replaces any previously loaded data and discards a trained model.
    pub fn load(&mut self, dataset: Dataset) -> Result<&InteractionMatrix> {
        let dataset = dataset.sample(self.config.nsample);
        info!(
            objects = dataset.objects.len(),
            users = dataset.users.len(),
            transactions = dataset.transactions.len(),
            nsample = ?self.config.nsample,
            "Loaded datasets"
        );

        let aggregation = InteractionAggregator::new(&self.config.object_key, &self.config.users_key)
            .get_counts(&dataset)?;

        let mut builder = InteractionMatrixBuilder::new(aggregation.num_objects(), aggregation.num_users())
            .with_policy(self.config.duplicate_policy);
        builder.extend_counts(&aggregation.counts)?;
        let matrix = builder.build();

        self.model = None;
        self.estimated_sales = None;
        let data = self.data.insert(PreparedData { aggregation, matrix });
        Ok(&data.matrix)
    }

    pub fn counts(&self) -> Result<&[InteractionCount]> {
        Ok(&self.prepared("counts")?.aggregation.counts)
    }

    pub fn matrix(&self) -> Result<&InteractionMatrix> {
        Ok(&self.prepared("matrix")?.matrix)
    }

    /// Fit the factorization on the loaded matrix
    pub fn create_model(&mut self) -> Result<&FitReport> {
        let data = self.prepared("create_model")?;
        let (factors, report) = Nmf::new(self.config.factorization.clone()).fit(&data.matrix)?;

        self.estimated_sales = None;
        let model = self.model.insert(TrainedModel { factors, report });
        Ok(&model.report)
    }

    pub fn factors(&self) -> Result<&Factors> {
        Ok(&self.trained("factors")?.factors)
    }

    pub fn fit_report(&self) -> Result<&FitReport> {
        Ok(&self.trained("fit_report")?.report)
    }

    /// Reconstruct the full object×user affinity matrix and keep it
    pub fn approx_data(&mut self) -> Result<&Reconstruction> {
        let reconstruction = AffinityReconstructor::new(&self.trained("approx_data")?.factors).full();
        Ok(self.estimated_sales.insert(reconstruction))
    }

    /// Result of the last `approx_data` call, if any
    pub fn estimated_sales(&self) -> Option<&Reconstruction> {
        self.estimated_sales.as_ref()
    }

    /// Affinity of every object for the given user columns
    pub fn estimate_sales(&self, users: &[usize]) -> Result<Reconstruction> {
        AffinityReconstructor::new(&self.trained("estimate_sales")?.factors).users(users)
    }

    /// Column index of a user key
    pub fn user_index(&self, user_key: &str) -> Result<usize> {
        self.prepared("user_index")?
            .aggregation
            .users
            .position(user_key)
            .ok_or_else(|| {
                RecommenderError::Integrity(format!(
                    "{} '{}' is not in the users table",
                    self.config.users_key, user_key
                ))
            })
    }

    /// Top-N objects for one user key
    pub fn recommend_for(&self, user_key: &str, n: usize) -> Result<Recommendation> {
        let col = self.user_index(user_key)?;
        let mut recommendations = self.recommend_users(&[col], n)?;
        recommendations.pop().ok_or_else(|| {
            RecommenderError::Dimension(format!("no recommendation produced for column {}", col))
        })
    }

    /// Top-N objects for each of the given user columns, in the order given
    pub fn recommend_users(&self, users: &[usize], n: usize) -> Result<Vec<Recommendation>> {
        let data = self.prepared("recommend_users")?;
        let reconstruction = self.estimate_sales(users)?;

        let mut recommendations = Vec::with_capacity(users.len());
        for (j, &col) in users.iter().enumerate() {
            let excluded: HashSet<usize> = if self.config.exclude_purchased {
                data.matrix.rows_in_column(col).into_iter().collect()
            } else {
                HashSet::new()
            };

            let scores = reconstruction.scores.column(j);
            let objects = top_n_rows(scores, n, &excluded)
                .into_iter()
                .map(|(row_idx, score)| {
                    let object_key = data.aggregation.objects.key(row_idx).ok_or_else(|| {
                        RecommenderError::Dimension(format!("object row {} has no key", row_idx))
                    })?;
                    Ok(ScoredObject {
                        row_idx,
                        object_key: object_key.to_string(),
                        score,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let user_key = data.aggregation.users.key(col).ok_or_else(|| {
                RecommenderError::Dimension(format!("user column {} has no key", col))
            })?;

            recommendations.push(Recommendation {
                user_key: user_key.to_string(),
                col_idx: col,
                objects,
            });
        }

        Ok(recommendations)
    }

    /// Snapshot of the trained model for persistence
    pub fn to_saved_model(&self) -> Result<SavedModel> {
        let model = self.trained("to_saved_model")?;
        let data = self.prepared("to_saved_model")?;

        Ok(SavedModel {
            factors: model.factors.clone(),
            config: self.config.factorization.clone(),
            object_keys: keys_in_order(data.aggregation.num_objects(), |i| data.aggregation.objects.key(i)),
            user_keys: keys_in_order(data.aggregation.num_users(), |i| data.aggregation.users.key(i)),
        })
    }

    /// Save the trained model under the configured models directory
    pub fn save_model(&self, name_prefix: &str) -> Result<PathBuf> {
        self.to_saved_model()?.save(&self.config.models_path, name_prefix)
    }

    fn prepared(&self, operation: &'static str) -> Result<&PreparedData> {
        self.data.as_ref().ok_or(RecommenderError::State {
            operation,
            required: Stage::MatrixBuilt,
            actual: self.stage(),
        })
    }

    fn trained(&self, operation: &'static str) -> Result<&TrainedModel> {
        self.model.as_ref().ok_or(RecommenderError::State {
            operation,
            required: Stage::Trained,
            actual: self.stage(),
        })
    }
}

impl NmfPipeline {
    /// Build a pipeline from `RETAIL_RECS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(PipelineConfig::from_env()?)
    }
}

fn keys_in_order<'a>(len: usize, key: impl Fn(usize) -> Option<&'a str>) -> Vec<String> {
    (0..len).filter_map(key).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factorization::NmfConfig;
    use crate::types::Table;

    fn dataset() -> Dataset {
        let objects = Table::from_keys("articles", "article_id", ["A", "B", "C"]);
        let users = Table::from_keys("customers", "customer_id", ["X", "Y"]);
        let mut log = Table::new("transactions", &["article_id", "customer_id"]);
        for (object, user) in [("A", "X"), ("A", "X"), ("B", "Y")] {
            log.push_row([object, user]).unwrap();
        }
        Dataset::new(objects, users, log)
    }

    fn pipeline(k: usize) -> NmfPipeline {
        NmfPipeline::new(PipelineConfig {
            factorization: NmfConfig {
                n_components: k,
                ..NmfConfig::default()
            },
            ..PipelineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_stage_transitions() {
        let mut p = pipeline(1);
        assert_eq!(p.stage(), Stage::Uninitialized);

        p.load(dataset()).unwrap();
        assert_eq!(p.stage(), Stage::MatrixBuilt);

        p.create_model().unwrap();
        assert_eq!(p.stage(), Stage::Trained);

        // Reloading discards the trained model
        p.load(dataset()).unwrap();
        assert_eq!(p.stage(), Stage::MatrixBuilt);
        assert!(p.factors().is_err());
    }

    #[test]
    fn test_train_before_load_is_state_error() {
        let mut p = pipeline(1);
        match p.create_model().unwrap_err() {
            RecommenderError::State {
                operation,
                required,
                actual,
            } => {
                assert_eq!(operation, "create_model");
                assert_eq!(required, Stage::MatrixBuilt);
                assert_eq!(actual, Stage::Uninitialized);
            }
            other => panic!("Expected state error, got {:?}", other),
        }
    }

    #[test]
    fn test_reconstruct_before_train_is_state_error() {
        let mut p = pipeline(1);
        p.load(dataset()).unwrap();
        assert!(matches!(
            p.estimate_sales(&[0]),
            Err(RecommenderError::State { required: Stage::Trained, .. })
        ));
        assert!(matches!(
            p.approx_data(),
            Err(RecommenderError::State { .. })
        ));
        assert!(p.recommend_for("X", 2).is_err());
    }

    #[test]
    fn test_load_builds_example_matrix() {
        let mut p = pipeline(1);
        let matrix = p.load(dataset()).unwrap();
        assert_eq!(
            matrix.to_dense(),
            ndarray::array![[2.0, 0.0], [0.0, 1.0], [0.0, 0.0]]
        );
        assert_eq!(p.counts().unwrap().len(), 2);
    }

    #[test]
    fn test_nsample_limits_transactions() {
        let mut p = NmfPipeline::new(PipelineConfig {
            nsample: Some(2),
            ..PipelineConfig::default()
        })
        .unwrap();
        let matrix = p.load(dataset()).unwrap();
        assert_eq!(matrix.sum(), 2.0);
        assert_eq!(matrix.get(1, 1), 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            top_n: 0,
            ..PipelineConfig::default()
        };
        assert!(NmfPipeline::new(config).is_err());
    }

    #[test]
    fn test_zero_components_is_dimension_error() {
        let config = PipelineConfig {
            factorization: NmfConfig {
                n_components: 0,
                ..NmfConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            NmfPipeline::new(config),
            Err(RecommenderError::Dimension(_))
        ));
    }

    #[test]
    fn test_exclude_purchased_per_user_column() {
        let mut p = NmfPipeline::new(PipelineConfig {
            factorization: NmfConfig {
                n_components: 2,
                ..NmfConfig::default()
            },
            exclude_purchased: true,
            ..PipelineConfig::default()
        })
        .unwrap();
        p.load(dataset()).unwrap();
        p.create_model().unwrap();

        let recommendations = p.recommend_users(&[0, 1], 3).unwrap();
        let x_rows: Vec<usize> = recommendations[0].objects.iter().map(|o| o.row_idx).collect();
        let y_rows: Vec<usize> = recommendations[1].objects.iter().map(|o| o.row_idx).collect();
        assert_eq!(x_rows.len(), 2);
        assert!(!x_rows.contains(&0));
        assert_eq!(y_rows.len(), 2);
        assert!(!y_rows.contains(&1));
    }

    #[test]
    fn test_rank_too_large_for_data() {
        let mut p = pipeline(3);
        p.load(dataset()).unwrap();
        assert!(matches!(
            p.create_model(),
            Err(RecommenderError::Dimension(_))
        ));
        assert_eq!(p.stage(), Stage::MatrixBuilt);
    }

    #[test]
    fn test_approx_data_is_stored() {
        let mut p = pipeline(2);
        p.load(dataset()).unwrap();
        p.create_model().unwrap();
        assert!(p.estimated_sales().is_none());

        let dim = p.approx_data().unwrap().scores.dim();
        assert_eq!(dim, (3, 2));
        assert!(p.estimated_sales().is_some());
    }

    #[test]
    fn test_recommend_unknown_user() {
        let mut p = pipeline(1);
        p.load(dataset()).unwrap();
        p.create_model().unwrap();
        assert!(matches!(
            p.recommend_for("nobody", 3),
            Err(RecommenderError::Integrity(_))
        ));
    }
}
