// Aspect scorer trait: the seam between the pipeline and the model.
//
// The default implementation runs a local ONNX encoder plus the linear
// classification head. Tests plug in a stub that returns fixed grids, so the
// decision logic can be checked without real weights.

use anyhow::Result;
use async_trait::async_trait;

use crate::labels::{NUM_OUTPUTS, NUM_SENTIMENTS, NUM_TOPICS};

/// Raw (pre-sigmoid) head output for one review, indexed `[topic][sentiment]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogitGrid {
    cells: [[f32; NUM_SENTIMENTS]; NUM_TOPICS],
}

impl LogitGrid {
    pub fn new(cells: [[f32; NUM_SENTIMENTS]; NUM_TOPICS]) -> Self {
        Self { cells }
    }

    /// A grid with every cell set to `value`.
    pub fn filled(value: f32) -> Self {
        Self::new([[value; NUM_SENTIMENTS]; NUM_TOPICS])
    }

    /// Reshape a flat head output (`topic * NUM_SENTIMENTS + sentiment`).
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() != NUM_OUTPUTS {
            anyhow::bail!(
                "Expected {} head outputs ({} topics x {} sentiments), got {}",
                NUM_OUTPUTS,
                NUM_TOPICS,
                NUM_SENTIMENTS,
                values.len()
            );
        }

        let mut cells = [[0.0_f32; NUM_SENTIMENTS]; NUM_TOPICS];
        for (row, chunk) in cells.iter_mut().zip(values.chunks_exact(NUM_SENTIMENTS)) {
            row.copy_from_slice(chunk);
        }
        Ok(Self { cells })
    }

    pub fn rows(&self) -> &[[f32; NUM_SENTIMENTS]; NUM_TOPICS] {
        &self.cells
    }

    /// Set a single cell. Used to build fixtures.
    pub fn with(mut self, topic: usize, sentiment: usize, value: f32) -> Self {
        self.cells[topic][sentiment] = value;
        self
    }
}

/// Trait for turning review text into a logit grid.
#[async_trait]
pub trait AspectScorer: Send + Sync {
    /// Score a single review text.
    async fn score_text(&self, text: &str) -> Result<LogitGrid>;

    /// Score many texts, returning one entry per input in the same order.
    ///
    /// The outer `Result` fails the whole batch (e.g. the encoder itself
    /// broke); inner errors belong to a single text and must not affect the
    /// others. The default implementation calls `score_text` sequentially.
    async fn score_batch(&self, texts: &[String]) -> Result<Vec<Result<LogitGrid>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.score_text(text).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat_row_major() {
        let values: Vec<f32> = (0..NUM_OUTPUTS).map(|i| i as f32).collect();
        let grid = LogitGrid::from_flat(&values).unwrap();
        assert_eq!(grid.rows()[0], [0.0, 1.0, 2.0]);
        assert_eq!(grid.rows()[1], [3.0, 4.0, 5.0]);
        assert_eq!(grid.rows()[NUM_TOPICS - 1], [30.0, 31.0, 32.0]);
    }

    #[test]
    fn test_from_flat_rejects_wrong_length() {
        assert!(LogitGrid::from_flat(&[0.0; 32]).is_err());
        assert!(LogitGrid::from_flat(&[0.0; 34]).is_err());
        assert!(LogitGrid::from_flat(&[]).is_err());
    }

    #[test]
    fn test_with_sets_single_cell() {
        let grid = LogitGrid::filled(-5.0).with(7, 2, 3.0);
        assert_eq!(grid.rows()[7], [-5.0, -5.0, 3.0]);
        assert_eq!(grid.rows()[6], [-5.0, -5.0, -5.0]);
    }
}
