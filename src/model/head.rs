// Classification head: one linear layer from the pooled CLS vector to
// NUM_TOPICS * NUM_SENTIMENTS raw scores.
//
// Weights are stored as JSON in the PyTorch nn.Linear layout:
//   {"weight": [[f32; hidden]; 33], "bias": [f32; 33]}
// Row `t * 3 + s` of the weight matrix scores topic t, sentiment s.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::traits::LogitGrid;
use crate::labels::NUM_OUTPUTS;

#[derive(Deserialize)]
struct HeadFile {
    weight: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Fixed linear projection, immutable after loading.
#[derive(Debug, Clone)]
pub struct ClassificationHead {
    /// Row-major [NUM_OUTPUTS, hidden_size].
    weight: Vec<f32>,
    bias: Vec<f32>,
    hidden_size: usize,
}

impl ClassificationHead {
    /// Build a head from weight rows and bias, validating the shape.
    pub fn new(weight: Vec<Vec<f32>>, bias: Vec<f32>) -> Result<Self> {
        if weight.len() != NUM_OUTPUTS {
            anyhow::bail!(
                "Head weight has {} rows, expected {} (topics x sentiments)",
                weight.len(),
                NUM_OUTPUTS
            );
        }
        if bias.len() != NUM_OUTPUTS {
            anyhow::bail!(
                "Head bias has {} entries, expected {}",
                bias.len(),
                NUM_OUTPUTS
            );
        }

        let hidden_size = weight[0].len();
        if hidden_size == 0 {
            anyhow::bail!("Head weight rows are empty");
        }
        if let Some(row) = weight.iter().position(|r| r.len() != hidden_size) {
            anyhow::bail!(
                "Head weight row {} has {} columns, expected {}",
                row,
                weight[row].len(),
                hidden_size
            );
        }

        Ok(Self {
            weight: weight.into_iter().flatten().collect(),
            bias,
            hidden_size,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: HeadFile = serde_json::from_str(json).context("Invalid head weights JSON")?;
        Self::new(file.weight, file.bias)
    }

    /// Load head weights from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read head weights from {}", path.display()))?;
        let head = Self::from_json(&json)
            .with_context(|| format!("Failed to load head weights from {}", path.display()))?;

        debug!(
            hidden_size = head.hidden_size,
            outputs = NUM_OUTPUTS,
            "Loaded classification head"
        );
        Ok(head)
    }

    /// Input dimensionality the head expects (the encoder's hidden size).
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Project a pooled encoder vector to a logit grid.
    pub fn forward(&self, pooled: &[f32]) -> Result<LogitGrid> {
        if pooled.len() != self.hidden_size {
            anyhow::bail!(
                "Encoder hidden size {} does not match head input size {}",
                pooled.len(),
                self.hidden_size
            );
        }

        let logits: Vec<f32> = self
            .weight
            .chunks_exact(self.hidden_size)
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(pooled).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        LogitGrid::from_flat(&logits)
    }
}
