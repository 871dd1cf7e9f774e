//! Trained model persistence
//!
//! Factors are written as an opaque bincode blob. Saved files are named
//! `<prefix>_<YYYYMMDD_HHMMSS>.bin` inside the configured models directory.

use crate::error::RecommenderError;
use crate::factorization::{Factors, NmfConfig};
use crate::initialization::InitStrategy;
use crate::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

const FORMAT_VERSION: u32 = 1;

/// Serializable representation of a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableModel {
    version: u32,
    n_components: usize,
    init: String,
    random_state: u64,
    max_iter: usize,
    tol: f64,
    verbose: bool,
    w_shape: (usize, usize),
    w_data: Vec<f64>,
    h_shape: (usize, usize),
    h_data: Vec<f64>,
    object_keys: Vec<String>,
    user_keys: Vec<String>,
}

/// A trained model as it is stored: factors, the config that produced them,
/// and the key order that maps matrix indices back to objects and users
#[derive(Debug, Clone, PartialEq)]
pub struct SavedModel {
    pub factors: Factors,
    pub config: NmfConfig,
    pub object_keys: Vec<String>,
    pub user_keys: Vec<String>,
}

impl SavedModel {
    /// Encode into an opaque binary blob
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let serializable = SerializableModel {
            version: FORMAT_VERSION,
            n_components: self.config.n_components,
            init: self.config.init.to_string(),
            random_state: self.config.random_state,
            max_iter: self.config.max_iter,
            tol: self.config.tol,
            verbose: self.config.verbose,
            w_shape: self.factors.w.dim(),
            w_data: self.factors.w.iter().copied().collect(),
            h_shape: self.factors.h.dim(),
            h_data: self.factors.h.iter().copied().collect(),
            object_keys: self.object_keys.clone(),
            user_keys: self.user_keys.clone(),
        };
        Ok(bincode::serialize(&serializable)?)
    }

    /// Decode a blob produced by `to_bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: SerializableModel = bincode::deserialize(bytes)?;
        if model.version != FORMAT_VERSION {
            return Err(RecommenderError::Serialization(format!(
                "unsupported model format version {} (expected {})",
                model.version, FORMAT_VERSION
            )));
        }

        let w = Array2::from_shape_vec(model.w_shape, model.w_data)
            .map_err(|e| RecommenderError::Dimension(format!("object embedding: {}", e)))?;
        let h = Array2::from_shape_vec(model.h_shape, model.h_data)
            .map_err(|e| RecommenderError::Dimension(format!("user embedding: {}", e)))?;
        let factors = Factors::new(w, h)?;

        if factors.num_objects() != model.object_keys.len()
            || factors.num_users() != model.user_keys.len()
        {
            return Err(RecommenderError::Dimension(format!(
                "factors cover {} objects and {} users but {} and {} keys were stored",
                factors.num_objects(),
                factors.num_users(),
                model.object_keys.len(),
                model.user_keys.len()
            )));
        }

        let init = model
            .init
            .parse::<InitStrategy>()
            .map_err(RecommenderError::Serialization)?;

        Ok(Self {
            factors,
            config: NmfConfig {
                n_components: model.n_components,
                init,
                random_state: model.random_state,
                max_iter: model.max_iter,
                tol: model.tol,
                verbose: model.verbose,
            },
            object_keys: model.object_keys,
            user_keys: model.user_keys,
        })
    }

    /// Write to `<dir>/<prefix>_<YYYYMMDD_HHMMSS>.bin`, returning the path
    pub fn save(&self, dir: &Path, name_prefix: &str) -> Result<PathBuf> {
        let start = Instant::now();

        let now = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.bin", name_prefix, now));

        let bytes = self.to_bytes()?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, &bytes)?;

        tracing::info!(
            path = %path.display(),
            size_bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Saved model"
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let start = Instant::now();
        let bytes = std::fs::read(path)?;
        let model = Self::from_bytes(&bytes)?;

        tracing::debug!(
            path = %path.display(),
            size_bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded model"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model() -> SavedModel {
        SavedModel {
            factors: Factors::new(array![[1.0, 0.0], [0.5, 2.0]], array![[0.25, 1.0, 0.0], [3.0, 0.0, 1.5]])
                .unwrap(),
            config: NmfConfig {
                n_components: 2,
                init: InitStrategy::Nndsvd,
                random_state: 9,
                ..NmfConfig::default()
            },
            object_keys: vec!["A".to_string(), "B".to_string()],
            user_keys: vec!["X".to_string(), "Y".to_string(), "Z".to_string()],
        }
    }

    #[test]
    fn test_bytes_preserve_model() {
        let original = model();
        let restored = SavedModel::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        let result = SavedModel::from_bytes(&[1, 2, 3]);
        assert!(matches!(result, Err(RecommenderError::Serialization(_))));
    }

    #[test]
    fn test_key_count_mismatch_rejected() {
        let mut broken = model();
        broken.user_keys.pop();
        let bytes = broken.to_bytes().unwrap();
        assert!(matches!(
            SavedModel::from_bytes(&bytes),
            Err(RecommenderError::Dimension(_))
        ));
    }

    #[test]
    fn test_save_uses_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = model().save(dir.path(), "nmf_model").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("nmf_model_"));
        assert!(name.ends_with(".bin"));
        // nmf_model_YYYYMMDD_HHMMSS.bin
        assert_eq!(name.len(), "nmf_model_".len() + 15 + ".bin".len());

        let loaded = SavedModel::load(&path).unwrap();
        assert_eq!(loaded, model());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SavedModel::load(&dir.path().join("absent.bin")),
            Err(RecommenderError::Io(_))
        ));
    }
}
