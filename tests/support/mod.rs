// Deterministic stand-ins for the ONNX model.
//
// KeywordScorer produces fixed logit grids from keywords in the text, so
// tests can reason about exactly which topics should be detected.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use absa::model::traits::{AspectScorer, LogitGrid};
use absa::pipeline::{InferenceContext, PipelineSettings};
use anyhow::Result;
use async_trait::async_trait;

/// Topic indices used by the fixtures.
pub const APP: usize = 2;
pub const SERVICE: usize = 4;
pub const CASHBACK: usize = 7;

/// Text that makes the scorer fail for that review only.
pub const BROKEN_TEXT: &str = "<<untokenizable>>";

/// Keyword-driven scorer:
///   "приложение" -> app, positive (logit 3.0, p ~ 0.95)
///   "кешбэк"     -> cashback, negative (logit 0.0, p = 0.5)
///   "обслуживание" -> service, neutral (logit -0.5, p ~ 0.38)
/// Every other cell is -6.0 (p ~ 0.0025).
#[derive(Default)]
pub struct KeywordScorer {
    pub batch_calls: AtomicUsize,
}

impl KeywordScorer {
    pub fn grid_for(text: &str) -> LogitGrid {
        let lower = text.to_lowercase();
        let mut grid = LogitGrid::filled(-6.0);
        if lower.contains("приложение") {
            grid = grid.with(APP, 2, 3.0);
        }
        if lower.contains("кешбэк") {
            grid = grid.with(CASHBACK, 0, 0.0).with(CASHBACK, 1, -1.0);
        }
        if lower.contains("обслуживание") {
            grid = grid.with(SERVICE, 1, -0.5);
        }
        grid
    }
}

#[async_trait]
impl AspectScorer for KeywordScorer {
    async fn score_text(&self, text: &str) -> Result<LogitGrid> {
        if text == BROKEN_TEXT {
            anyhow::bail!("Tokenization failed: unsupported input");
        }
        Ok(Self::grid_for(text))
    }

    async fn score_batch(&self, texts: &[String]) -> Result<Vec<Result<LogitGrid>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.score_text(text).await);
        }
        Ok(results)
    }
}

/// Scorer whose model is broken for every batch.
pub struct BrokenModelScorer;

#[async_trait]
impl AspectScorer for BrokenModelScorer {
    async fn score_text(&self, _text: &str) -> Result<LogitGrid> {
        anyhow::bail!("Encoder ONNX inference failed")
    }

    async fn score_batch(&self, _texts: &[String]) -> Result<Vec<Result<LogitGrid>>> {
        anyhow::bail!("Encoder ONNX inference failed")
    }
}

pub fn keyword_context() -> (InferenceContext, Arc<KeywordScorer>) {
    keyword_context_with(PipelineSettings::default())
}

pub fn keyword_context_with(settings: PipelineSettings) -> (InferenceContext, Arc<KeywordScorer>) {
    let scorer = Arc::new(KeywordScorer::default());
    let context = InferenceContext::new(scorer.clone(), settings);
    (context, scorer)
}
