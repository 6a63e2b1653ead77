use crate::config::{ModelKind, ServerConfig};
use crate::monitoring::RequestLog;
use anyhow::{Context, Result};
use data_loader::DataIndex;
use models::{KnnModel, KnnRecommender, Recommender, SvdModel, SvdScorer};
use std::sync::Arc;
use tracing::info;

/// Shared, read-only serving state plus the request log
#[derive(Clone)]
pub struct AppState {
    pub recommender: Arc<dyn Recommender>,
    pub index: Arc<DataIndex>,
    pub log: Arc<RequestLog>,
}

impl AppState {
    pub fn new(recommender: Arc<dyn Recommender>, index: Arc<DataIndex>) -> Self {
        Self {
            recommender,
            index,
            log: Arc::new(RequestLog::new()),
        }
    }

    pub fn with_log(mut self, log: Arc<RequestLog>) -> Self {
        self.log = log;
        self
    }

    /// Load the processed tables and the trained artifact named by `config`
    pub fn load(config: &ServerConfig) -> Result<Self> {
        let index = Arc::new(
            DataIndex::load_processed(&config.data_dir).with_context(|| {
                format!("Failed to load processed data from {}", config.data_dir.display())
            })?,
        );

        let recommender: Arc<dyn Recommender> = match config.model_kind {
            ModelKind::Svd => {
                let model = SvdModel::load(&config.model_path).with_context(|| {
                    format!("Failed to load SVD model from {}", config.model_path.display())
                })?;
                info!(
                    n_components = model.n_components(),
                    n_users = model.user_ids().len(),
                    n_items = model.movie_ids().len(),
                    "SVD model ready"
                );
                Arc::new(SvdScorer::new(Arc::new(model), index.clone()))
            }
            ModelKind::Knn => {
                let model = KnnModel::load(&config.model_path).with_context(|| {
                    format!("Failed to load KNN model from {}", config.model_path.display())
                })?;
                info!(
                    n_neighbors = model.n_neighbors(),
                    n_users = model.user_ids().len(),
                    "KNN model ready"
                );
                Arc::new(KnnRecommender::new(Arc::new(model), index.clone()))
            }
        };

        Ok(Self::new(recommender, index))
    }
}
