// Per-topic decision rule.
//
// Every cell of the logit grid is squashed independently with a sigmoid (not
// a softmax across sentiments), so any number of topics can be detected at
// once and a topic may have no confident sentiment at all.
//
// A topic is detected when its best sentiment probability is strictly greater
// than the threshold. The assigned sentiment is the argmax, lowest index wins
// ties. A row holding NaN has no best value and is never detected.
//
// Logits far enough from zero saturate: below about -745 the probability is
// exactly 0.0, so such a topic stays undetected even at threshold 0.

use anyhow::Result;

use crate::labels::{Sentiment, NUM_SENTIMENTS, NUM_TOPICS, TOPICS};
use crate::model::traits::LogitGrid;

/// Threshold used when the caller doesn't supply one.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// A validated detection threshold in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            anyhow::bail!("threshold must be a number between 0 and 1, got {value}");
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

/// Sigmoid activation: maps any real number to (0, 1).
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Per-review probabilities, indexed `[topic][sentiment]`, values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreGrid {
    cells: [[f64; NUM_SENTIMENTS]; NUM_TOPICS],
}

impl ScoreGrid {
    pub fn from_logits(logits: &LogitGrid) -> Self {
        let mut cells = [[0.0_f64; NUM_SENTIMENTS]; NUM_TOPICS];
        for (row, logit_row) in cells.iter_mut().zip(logits.rows()) {
            for (cell, &logit) in row.iter_mut().zip(logit_row) {
                *cell = sigmoid(logit as f64);
            }
        }
        Self { cells }
    }

    pub fn rows(&self) -> &[[f64; NUM_SENTIMENTS]; NUM_TOPICS] {
        &self.cells
    }
}

/// One detected topic with its chosen sentiment.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicPrediction {
    pub topic: &'static str,
    pub sentiment: Sentiment,
    /// Probability of the chosen sentiment.
    pub confidence: f64,
}

/// Index and value of the largest entry; the first one wins on ties.
fn argmax(row: &[f64; NUM_SENTIMENTS]) -> (usize, f64) {
    let mut best = (0, row[0]);
    for (i, &p) in row.iter().enumerate().skip(1) {
        if p > best.1 {
            best = (i, p);
        }
    }
    best
}

/// Apply the threshold to every topic, in fixed topic order.
pub fn decide(grid: &ScoreGrid, threshold: Threshold) -> Vec<TopicPrediction> {
    grid.rows()
        .iter()
        .zip(TOPICS)
        .filter_map(|(row, topic)| {
            if row.iter().any(|p| p.is_nan()) {
                return None;
            }
            let (index, confidence) = argmax(row);
            if confidence <= threshold.value() {
                return None;
            }
            let sentiment = Sentiment::from_index(index)?;
            Some(TopicPrediction {
                topic,
                sentiment,
                confidence,
            })
        })
        .collect()
}
