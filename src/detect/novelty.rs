//! Novelty model lifecycle: train once, then score batches.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::forest::{ForestParams, IsolationForest};
use super::DetectError;
use crate::source::Sample;

/// Per-sample verdict from the novelty model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub is_novel: bool,
    /// Signed decision margin; negative means novel.
    pub margin: f64,
    /// Outlyingness normalised into [0, 1].
    pub confidence: f64,
}

impl Score {
    pub fn from_margin(margin: f64) -> Self {
        Self {
            is_novel: margin < 0.0,
            margin,
            confidence: margin_confidence(margin),
        }
    }
}

/// Map a decision margin into [0, 1]. Monotone: the further below the
/// boundary, the higher the confidence. Inliers saturate at 0.
pub fn margin_confidence(margin: f64) -> f64 {
    (-2.0 * margin).clamp(0.0, 1.0)
}

/// Isolation forest trained lazily, at most once per instance.
///
/// Concurrent callers of [`train`](Self::train) wait on the same fit. A failed
/// fit leaves the model untrained so the next call retries.
pub struct NoveltyModel {
    params: ForestParams,
    forest: OnceCell<Arc<IsolationForest>>,
}

impl Default for NoveltyModel {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl NoveltyModel {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            forest: OnceCell::new(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.forest.initialized()
    }

    /// Fit on the historical samples. No-op once trained.
    pub async fn train(&self, historical: &[Sample]) -> Result<(), DetectError> {
        if self.is_trained() {
            return Ok(());
        }
        let points: Vec<[f64; 2]> = historical.iter().map(Sample::features).collect();
        let params = self.params;

        self.forest
            .get_or_try_init(|| async move {
                let rows = points.len();
                let forest =
                    tokio::task::spawn_blocking(move || IsolationForest::fit(&points, params))
                        .await
                        .map_err(|e| DetectError::TrainingAborted(e.to_string()))??;
                info!(
                    rows,
                    trees = forest.n_trees(),
                    contamination = params.contamination,
                    seed = params.seed,
                    "trained novelty model"
                );
                Ok::<_, DetectError>(Arc::new(forest))
            })
            .await?;
        Ok(())
    }

    /// Score a batch, one verdict per sample in order.
    pub fn score(&self, samples: &[Sample]) -> Result<Vec<Score>, DetectError> {
        let forest = self.forest.get().ok_or(DetectError::NotTrained)?;
        Ok(samples
            .iter()
            .map(|s| Score::from_margin(forest.decision(&s.features())))
            .collect())
    }
}
