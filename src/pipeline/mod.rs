// Inference pipeline: review text in, detected topics and sentiments out.
//
// InferenceContext is built once at startup and never mutated: it owns the
// scorer (encoder + head) and the batch limits. Handlers share it via Arc.
//
// Flow per request:
//   reviews -> empty-text check -> scorer.score_batch -> sigmoid -> decide
//           -> ReviewResult (same order as input)

pub mod decision;
pub mod models;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::model::traits::AspectScorer;
use decision::{decide, ScoreGrid, Threshold, DEFAULT_THRESHOLD};
use models::{Review, ReviewResult};

/// Default cap on reviews per request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Limits and defaults applied to every request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub default_threshold: f64,
    pub max_batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Process-wide, read-only inference state.
pub struct InferenceContext {
    scorer: Arc<dyn AspectScorer>,
    settings: PipelineSettings,
}

impl InferenceContext {
    pub fn new(scorer: Arc<dyn AspectScorer>, settings: PipelineSettings) -> Self {
        Self { scorer, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Resolve an optional caller threshold against the configured default.
    pub fn threshold(&self, requested: Option<f64>) -> Result<Threshold> {
        Threshold::new(requested.unwrap_or(self.settings.default_threshold))
    }

    /// Check a batch against the configured cap before doing any work.
    pub fn check_batch_size(&self, len: usize) -> Result<()> {
        if len > self.settings.max_batch_size {
            anyhow::bail!(
                "batch of {} reviews exceeds the limit of {}",
                len,
                self.settings.max_batch_size
            );
        }
        Ok(())
    }

    /// Analyze a batch of reviews. Results come back in input order.
    ///
    /// A review that can't be processed gets an inline error; only a failure
    /// of the model itself fails the whole call.
    pub async fn predict(&self, reviews: &[Review], threshold: Threshold) -> Result<Vec<ReviewResult>> {
        self.check_batch_size(reviews.len())?;
        if reviews.is_empty() {
            return Ok(Vec::new());
        }

        // Only non-empty texts go to the scorer; remember where they came from.
        let (indices, texts): (Vec<usize>, Vec<String>) = reviews
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.text.trim().is_empty())
            .map(|(i, r)| (i, r.text.clone()))
            .unzip();

        let scored = if texts.is_empty() {
            Vec::new()
        } else {
            self.scorer.score_batch(&texts).await?
        };
        if scored.len() != texts.len() {
            anyhow::bail!(
                "Scorer returned {} results for {} reviews",
                scored.len(),
                texts.len()
            );
        }

        let mut results: Vec<ReviewResult> = reviews
            .iter()
            .map(|r| ReviewResult::failed(r, "review text is empty"))
            .collect();

        for (index, outcome) in indices.into_iter().zip(scored) {
            let review = &reviews[index];
            results[index] = match outcome {
                Ok(logits) => {
                    let grid = ScoreGrid::from_logits(&logits);
                    ReviewResult::from_predictions(review, &decide(&grid, threshold))
                }
                Err(e) => {
                    warn!(review_id = review.id, error = %e, "Review could not be scored");
                    ReviewResult::failed(review, e.to_string())
                }
            };
        }

        debug!(
            reviews = reviews.len(),
            threshold = threshold.value(),
            "Predicted review batch"
        );

        Ok(results)
    }
}
