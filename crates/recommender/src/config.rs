//! Pipeline configuration
//!
//! One explicit configuration object is handed to the pipeline at
//! construction time. Values come from defaults, overridden by environment
//! variables with the `RETAIL_RECS_` prefix (optionally loaded from a `.env`
//! file).
//!
//! # Environment Variables
//!
//! - `RETAIL_RECS_OBJECT_KEY`: object key column (default: `article_id`)
//! - `RETAIL_RECS_USERS_KEY`: user key column (default: `customer_id`)
//! - `RETAIL_RECS_NSAMPLE`: only use the first N transactions (default: all)
//! - `RETAIL_RECS_N_COMPONENTS`: factorization rank (default: 10)
//! - `RETAIL_RECS_INIT`: `random`, `nndsvd` or `nndsvda` (default: `random`)
//! - `RETAIL_RECS_RANDOM_STATE`: seed (default: 42)
//! - `RETAIL_RECS_MAX_ITER`: iteration cap (default: 200)
//! - `RETAIL_RECS_TOL`: convergence tolerance (default: 1e-4)
//! - `RETAIL_RECS_VERBOSE`: log fit progress at INFO (default: false)
//! - `RETAIL_RECS_DUPLICATE_POLICY`: `overwrite` or `accumulate` (default: `overwrite`)
//! - `RETAIL_RECS_TOP_N`: recommendations per user (default: 12)
//! - `RETAIL_RECS_EXCLUDE_PURCHASED`: skip already purchased objects (default: false)
//! - `RETAIL_RECS_MODELS_PATH`: directory for saved models (default: `models`)

use crate::error::RecommenderError;
use crate::factorization::NmfConfig;
use crate::initialization::InitStrategy;
use crate::sparse::DuplicatePolicy;
use crate::Result;
use std::path::PathBuf;

const ENV_PREFIX: &str = "RETAIL_RECS_";

/// Configuration loader trait
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, falling back to defaults
    fn from_env() -> Result<Self>;

    /// Validate configuration values
    fn validate(&self) -> Result<()>;
}

/// Everything a pipeline run needs to know up front
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Key column shared by the objects table and the transaction log
    pub object_key: String,
    /// Key column shared by the users table and the transaction log
    pub users_key: String,
    /// Number of transactions to use (all when `None`)
    pub nsample: Option<usize>,
    pub factorization: NmfConfig,
    pub duplicate_policy: DuplicatePolicy,
    pub top_n: usize,
    /// Leave objects the user already bought out of their ranking
    pub exclude_purchased: bool,
    pub models_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            object_key: "article_id".to_string(),
            users_key: "customer_id".to_string(),
            nsample: None,
            factorization: NmfConfig::default(),
            duplicate_policy: DuplicatePolicy::Overwrite,
            top_n: 12,
            exclude_purchased: false,
            models_path: PathBuf::from("models"),
        }
    }
}

impl ConfigLoader for PipelineConfig {
    fn from_env() -> Result<Self> {
        let defaults = PipelineConfig::default();
        let nmf_defaults = NmfConfig::default();

        let nsample = match std::env::var(env_key("NSAMPLE")) {
            Ok(_) => Some(parse_env_var::<usize>(&env_key("NSAMPLE"), 0)?),
            Err(_) => defaults.nsample,
        };

        Ok(Self {
            object_key: parse_env_var(&env_key("OBJECT_KEY"), defaults.object_key)?,
            users_key: parse_env_var(&env_key("USERS_KEY"), defaults.users_key)?,
            nsample,
            factorization: NmfConfig {
                n_components: parse_env_var(&env_key("N_COMPONENTS"), nmf_defaults.n_components)?,
                init: parse_env_var::<InitStrategy>(&env_key("INIT"), nmf_defaults.init)?,
                random_state: parse_env_var(&env_key("RANDOM_STATE"), nmf_defaults.random_state)?,
                max_iter: parse_env_var(&env_key("MAX_ITER"), nmf_defaults.max_iter)?,
                tol: parse_env_var(&env_key("TOL"), nmf_defaults.tol)?,
                verbose: parse_env_var(&env_key("VERBOSE"), nmf_defaults.verbose)?,
            },
            duplicate_policy: parse_env_var(&env_key("DUPLICATE_POLICY"), defaults.duplicate_policy)?,
            top_n: parse_env_var(&env_key("TOP_N"), defaults.top_n)?,
            exclude_purchased: parse_env_var(&env_key("EXCLUDE_PURCHASED"), defaults.exclude_purchased)?,
            models_path: parse_env_var(&env_key("MODELS_PATH"), defaults.models_path)?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.object_key.trim().is_empty() {
            return Err(config_error("object_key must not be empty", "OBJECT_KEY"));
        }

        if self.users_key.trim().is_empty() {
            return Err(config_error("users_key must not be empty", "USERS_KEY"));
        }

        if self.nsample == Some(0) {
            return Err(config_error("nsample must be greater than 0 when set", "NSAMPLE"));
        }

        // Factorization settings keep their own error kinds; field names map to env keys.
        self.factorization.validate().map_err(|e| match e {
            RecommenderError::Configuration {
                message,
                key: Some(field),
            } => config_error(&message, &field.to_ascii_uppercase()),
            other => other,
        })?;

        if self.top_n == 0 {
            return Err(config_error("top_n must be greater than 0", "TOP_N"));
        }

        Ok(())
    }
}

fn env_key(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name)
}

fn config_error(message: &str, name: &str) -> RecommenderError {
    RecommenderError::Configuration {
        message: message.to_string(),
        key: Some(env_key(name)),
    }
}

/// Parse an environment variable, or return `default` when it is unset
fn parse_env_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| RecommenderError::Configuration {
                    message: format!("Failed to parse {}: {}", key, e),
                    key: Some(key.to_string()),
                })
        })
        .unwrap_or(Ok(default))
}

/// Load .env file if present
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }
}
