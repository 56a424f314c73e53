use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::model::files::{default_model_dir, missing_model_files};
use crate::model::onnx::EncoderOptions;
use crate::pipeline::decision::{Threshold, DEFAULT_THRESHOLD};
use crate::pipeline::{PipelineSettings, DEFAULT_MAX_BATCH_SIZE};

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing model.onnx, tokenizer.json and head.json
    pub model_dir: PathBuf,
    /// Tokenizer truncation length (ABSA_MAX_SEQ_LEN)
    pub max_sequence_length: usize,
    /// Padding token id (ABSA_PAD_ID, 0 for BERT vocabularies)
    pub pad_id: u32,
    /// Feed token_type_ids to the encoder (ABSA_TOKEN_TYPE_IDS)
    pub token_type_ids: bool,
    /// Threshold used when a request doesn't set one (ABSA_THRESHOLD)
    pub default_threshold: f64,
    /// Maximum reviews per request (ABSA_MAX_BATCH)
    pub max_batch_size: usize,
    /// Maximum reviews per encoder forward pass (ABSA_INFERENCE_BATCH)
    pub inference_batch_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Every setting has a default; a value that is present but unparseable
    /// is an error naming the variable.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_dir = lookup("ABSA_MODEL_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_model_dir);

        let config = Self {
            model_dir,
            max_sequence_length: parse_var(&lookup, "ABSA_MAX_SEQ_LEN", 512)?,
            pad_id: parse_var(&lookup, "ABSA_PAD_ID", 0)?,
            token_type_ids: parse_bool(&lookup, "ABSA_TOKEN_TYPE_IDS", true)?,
            default_threshold: parse_var(&lookup, "ABSA_THRESHOLD", DEFAULT_THRESHOLD)?,
            max_batch_size: parse_var(&lookup, "ABSA_MAX_BATCH", DEFAULT_MAX_BATCH_SIZE)?,
            inference_batch_size: parse_var(&lookup, "ABSA_INFERENCE_BATCH", 16)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_sequence_length == 0 {
            anyhow::bail!("ABSA_MAX_SEQ_LEN must be greater than zero");
        }
        if self.max_batch_size == 0 {
            anyhow::bail!("ABSA_MAX_BATCH must be greater than zero");
        }
        if self.inference_batch_size == 0 {
            anyhow::bail!("ABSA_INFERENCE_BATCH must be greater than zero");
        }
        Threshold::new(self.default_threshold).context("ABSA_THRESHOLD is invalid")?;
        Ok(())
    }

    /// Check that all model artifacts are present.
    /// Call this before loading the model.
    pub fn require_model(&self) -> Result<()> {
        let missing = missing_model_files(&self.model_dir);
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(|p| format!("  {}", p.display())).collect();
            anyhow::bail!(
                "Model files missing in {}:\n{}\n\
                 Set ABSA_MODEL_DIR to the directory holding model.onnx, tokenizer.json and head.json.",
                self.model_dir.display(),
                list.join("\n")
            );
        }
        Ok(())
    }

    pub fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            max_sequence_length: self.max_sequence_length,
            pad_id: self.pad_id,
            token_type_ids: self.token_type_ids,
            inference_batch_size: self.inference_batch_size,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            default_threshold: self.default_threshold,
            max_batch_size: self.max_batch_size,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value {raw:?}: {e}")),
        _ => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => anyhow::bail!("{key} must be true or false, got {other:?}"),
    }
}
