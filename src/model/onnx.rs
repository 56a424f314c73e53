// Local ONNX aspect scorer: BERT-style encoder + linear classification head.
//
// The encoder is exported to ONNX and produces last_hidden_state
// [batch, seq_len, hidden]. The first token (CLS) of each sequence is fed to
// the classification head, which yields an 11 x 3 logit grid per review.
//
// Reviews are tokenized one by one so a text the tokenizer rejects only
// fails itself; the surviving encodings are then padded and run through the
// encoder in batches.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{
    Encoding, Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy,
};
use tracing::{debug, info, warn};

use super::files::{ENCODER_FILE, HEAD_FILE, TOKENIZER_FILE};
use super::head::ClassificationHead;
use super::traits::{AspectScorer, LogitGrid};

/// Text used to check encoder/head compatibility at load time.
const PROBE_TEXT: &str = "Проверка совместимости модели";

/// Encoder settings that come from configuration.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Tokenizer truncation length.
    pub max_sequence_length: usize,
    /// Token id used to right-pad shorter sequences.
    pub pad_id: u32,
    /// Whether the encoder graph takes a token_type_ids input.
    pub token_type_ids: bool,
    /// Maximum number of reviews per encoder forward pass.
    pub inference_batch_size: usize,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            max_sequence_length: 512,
            pad_id: 0,
            token_type_ids: true,
            inference_batch_size: 16,
        }
    }
}

/// ONNX-backed scorer. Holds the session behind Arc<Mutex> because
/// `Session::run` takes `&mut self` and inference is offloaded to
/// spawn_blocking, which needs 'static handles.
pub struct OnnxAspectScorer {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    head: Arc<ClassificationHead>,
    options: Arc<EncoderOptions>,
}

impl OnnxAspectScorer {
    /// Load the encoder, tokenizer and head from `model_dir` and verify that
    /// they fit together by running one probe inference.
    ///
    /// Any failure here is fatal: the caller must not start serving.
    /// Callers check for missing files first with `Config::require_model`.
    pub fn load(model_dir: &Path, options: EncoderOptions) -> Result<Self> {
        let model_path = model_dir.join(ENCODER_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let head_path = model_dir.join(HEAD_FILE);

        if options.max_sequence_length == 0 {
            anyhow::bail!("max_sequence_length must be greater than zero");
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX encoder from {}", model_path.display()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: options.max_sequence_length,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure tokenizer truncation: {}", e))?;
        // Padding is done per encoder batch below.
        tokenizer.with_padding(None);

        let head = ClassificationHead::load(&head_path)?;

        let scorer = Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            head: Arc::new(head),
            options: Arc::new(options),
        };

        scorer
            .probe()
            .context("Encoder and classification head are incompatible")?;

        info!(
            model_dir = %model_dir.display(),
            hidden_size = scorer.head.hidden_size(),
            "Loaded ONNX aspect model"
        );
        Ok(scorer)
    }

    /// Hidden size shared by encoder and head.
    pub fn hidden_size(&self) -> usize {
        self.head.hidden_size()
    }

    /// Run one synchronous inference to make sure the encoder's hidden size
    /// matches the head.
    fn probe(&self) -> Result<()> {
        let encoding = self
            .tokenizer
            .encode(PROBE_TEXT, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let pooled = run_encoder(&self.session, &self.options, &[&encoding])?;
        let vector = pooled
            .first()
            .context("Encoder returned no output for the probe text")?;
        self.head.forward(vector)?;
        Ok(())
    }
}

#[async_trait]
impl AspectScorer for OnnxAspectScorer {
    async fn score_text(&self, text: &str) -> Result<LogitGrid> {
        let mut results = self.score_batch(&[text.to_string()]).await?;
        results.remove(0)
    }

    /// Tokenize each text, run batched forward passes, and project every CLS
    /// vector through the head. CPU-bound work runs on a blocking thread.
    async fn score_batch(&self, texts: &[String]) -> Result<Vec<Result<LogitGrid>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let head = Arc::clone(&self.head);
        let options = Arc::clone(&self.options);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            score_sync(&session, &tokenizer, &head, &options, &texts)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Synchronous scoring. Called from spawn_blocking.
fn score_sync(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    head: &ClassificationHead,
    options: &EncoderOptions,
    texts: &[String],
) -> Result<Vec<Result<LogitGrid>>> {
    let mut results: Vec<Option<Result<LogitGrid>>> = (0..texts.len()).map(|_| None).collect();
    let mut encoded: Vec<(usize, Encoding)> = Vec::with_capacity(texts.len());

    for (i, text) in texts.iter().enumerate() {
        match tokenizer.encode(text.as_str(), true) {
            Ok(encoding) if !encoding.get_ids().is_empty() => encoded.push((i, encoding)),
            Ok(_) => {
                results[i] = Some(Err(anyhow::anyhow!("Tokenizer produced no tokens")));
            }
            Err(e) => {
                warn!(index = i, error = %e, "Tokenization failed");
                results[i] = Some(Err(anyhow::anyhow!("Tokenization failed: {}", e)));
            }
        }
    }

    score_chunks(
        &encoded,
        options.inference_batch_size,
        head,
        &mut results,
        |encodings| run_encoder(session, options, encodings),
    )?;

    debug!(
        batch_size = texts.len(),
        encoded = encoded.len(),
        "Scored review batch"
    );

    Ok(results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(anyhow::anyhow!("Review was not scored"))))
        .collect())
}

/// Run `encode` over `encoded` in chunks of `chunk_size` and project each
/// pooled vector through the head into `results`.
///
/// A failing chunk only fails its own reviews. If no chunk succeeds the
/// model is considered broken and the first error is returned.
fn score_chunks<F>(
    encoded: &[(usize, Encoding)],
    chunk_size: usize,
    head: &ClassificationHead,
    results: &mut [Option<Result<LogitGrid>>],
    mut encode: F,
) -> Result<()>
where
    F: FnMut(&[&Encoding]) -> Result<Vec<Vec<f32>>>,
{
    let mut first_error = None;
    let mut succeeded = 0usize;

    for chunk in encoded.chunks(chunk_size.max(1)) {
        let encodings: Vec<&Encoding> = chunk.iter().map(|(_, enc)| enc).collect();
        let pooled = encode(&encodings).and_then(|pooled| {
            if pooled.len() != chunk.len() {
                anyhow::bail!(
                    "Encoder returned {} vectors for {} reviews",
                    pooled.len(),
                    chunk.len()
                );
            }
            Ok(pooled)
        });

        match pooled {
            Ok(pooled) => {
                succeeded += 1;
                for ((i, _), vector) in chunk.iter().zip(pooled) {
                    results[*i] = Some(head.forward(&vector));
                }
            }
            Err(e) => {
                warn!(reviews = chunk.len(), error = %e, "Encoder batch failed");
                for (i, _) in chunk {
                    results[*i] = Some(Err(anyhow::anyhow!("Encoder inference failed: {}", e)));
                }
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if succeeded == 0 => Err(e),
        _ => Ok(()),
    }
}

/// Right-padded encoder inputs for one batch, flattened row-major.
#[derive(Debug, PartialEq)]
struct PaddedBatch {
    shape: [i64; 2],
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

/// Right-pad every `(ids, attention_mask)` row to the longest one. Padding
/// positions get `pad_id` and a mask of 0.
fn pad_batch(rows: &[(&[u32], &[u32])], pad_id: u32) -> Result<PaddedBatch> {
    let batch_size = rows.len();
    let max_len = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);

    if batch_size == 0 || max_len == 0 {
        anyhow::bail!("Cannot run the encoder on an empty batch");
    }

    let mut input_ids: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for (ids, mask) in rows {
        if mask.len() != ids.len() {
            anyhow::bail!(
                "Attention mask has {} entries for {} tokens",
                mask.len(),
                ids.len()
            );
        }
        let pad_len = max_len - ids.len();

        input_ids.extend(ids.iter().map(|&id| id as i64));
        attention_mask.extend(mask.iter().map(|&m| m as i64));

        input_ids.extend(std::iter::repeat_n(pad_id as i64, pad_len));
        attention_mask.extend(std::iter::repeat_n(0i64, pad_len));
    }

    Ok(PaddedBatch {
        shape: [batch_size as i64, max_len as i64],
        input_ids,
        attention_mask,
    })
}

/// Check that an encoder output is `[batch, seq_len, hidden]` and return
/// the hidden size.
fn hidden_size_of(dims: &[i64], batch_size: usize, seq_len: usize, values: usize) -> Result<usize> {
    let [batch, seq, hidden] = dims else {
        anyhow::bail!("Encoder output has {} dimensions, expected 3", dims.len());
    };
    if *batch != batch_size as i64 || *seq != seq_len as i64 || *hidden <= 0 {
        anyhow::bail!(
            "Encoder output shape {:?} does not match batch {} x sequence {}",
            dims,
            batch_size,
            seq_len
        );
    }
    let hidden = *hidden as usize;
    if values != batch_size * seq_len * hidden {
        anyhow::bail!("Encoder output has {} values for shape {:?}", values, dims);
    }
    Ok(hidden)
}

/// Run the encoder on a batch of encodings and return each sequence's CLS
/// hidden state.
fn run_encoder(
    session: &Mutex<Session>,
    options: &EncoderOptions,
    encodings: &[&Encoding],
) -> Result<Vec<Vec<f32>>> {
    let rows: Vec<(&[u32], &[u32])> = encodings
        .iter()
        .map(|e| (e.get_ids(), e.get_attention_mask()))
        .collect();
    let batch = pad_batch(&rows, options.pad_id)?;
    let [batch_size, max_len] = batch.shape.map(|d| d as usize);
    let shape = batch.shape;

    let input_ids_tensor = Tensor::from_array((shape, batch.input_ids))
        .context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, batch.attention_mask))
        .context("Failed to create attention_mask tensor")?;

    let mut session = session
        .lock()
        .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

    // Token types are 0 throughout (single-sentence input).
    let outputs = if options.token_type_ids {
        let token_type_ids_tensor = Tensor::from_array((shape, vec![0i64; batch_size * max_len]))
            .context("Failed to create token_type_ids tensor")?;
        session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor
        })
    } else {
        session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor
        })
    }
    .context("Encoder ONNX inference failed")?;

    let (output_shape, hidden_states) = outputs[0]
        .try_extract_tensor::<f32>()
        .context("Failed to extract encoder output tensor")?;
    let hidden = hidden_size_of(&output_shape[..], batch_size, max_len, hidden_states.len())?;

    Ok(cls_vectors(hidden_states, batch_size, max_len, hidden))
}

/// Slice the first-token hidden state out of a flat [batch, seq, hidden] buffer.
fn cls_vectors(hidden_states: &[f32], batch_size: usize, seq_len: usize, hidden: usize) -> Vec<Vec<f32>> {
    (0..batch_size)
        .map(|i| {
            let offset = i * seq_len * hidden;
            hidden_states[offset..offset + hidden].to_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cls_vectors_takes_first_token() {
        // batch 2, seq 3, hidden 2
        let states: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let cls = cls_vectors(&states, 2, 3, 2);
        assert_eq!(cls, vec![vec![0.0, 1.0], vec![6.0, 7.0]]);
    }

    #[test]
    fn test_default_options() {
        let options = EncoderOptions::default();
        assert_eq!(options.max_sequence_length, 512);
        assert_eq!(options.pad_id, 0);
        assert!(options.token_type_ids);
        assert_eq!(options.inference_batch_size, 16);
    }

    #[test]
    fn test_load_fails_without_files() {
        let dir = std::env::temp_dir().join("absa-onnx-missing");
        assert!(OnnxAspectScorer::load(&dir, EncoderOptions::default()).is_err());
    }

    #[test]
    fn test_pad_batch_right_pads_shorter_rows() {
        let long: (&[u32], &[u32]) = (&[101, 7, 8, 102], &[1, 1, 1, 1]);
        let short: (&[u32], &[u32]) = (&[101, 102], &[1, 1]);
        let batch = pad_batch(&[short, long], 3).unwrap();

        assert_eq!(batch.shape, [2, 4]);
        // Row order follows the input.
        assert_eq!(batch.input_ids, vec![101, 102, 3, 3, 101, 7, 8, 102]);
        assert_eq!(batch.attention_mask, vec![1, 1, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_pad_batch_equal_lengths_need_no_padding() {
        let a: (&[u32], &[u32]) = (&[1, 2], &[1, 1]);
        let b: (&[u32], &[u32]) = (&[3, 4], &[1, 1]);
        let batch = pad_batch(&[a, b], 0).unwrap();
        assert_eq!(batch.shape, [2, 2]);
        assert_eq!(batch.input_ids, vec![1, 2, 3, 4]);
        assert!(batch.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_pad_batch_rejects_empty() {
        assert!(pad_batch(&[], 0).is_err());
        let empty: (&[u32], &[u32]) = (&[], &[]);
        assert!(pad_batch(&[empty], 0).is_err());
    }

    #[test]
    fn test_hidden_size_of_checks_every_dimension() {
        assert_eq!(hidden_size_of(&[2, 4, 8], 2, 4, 64).unwrap(), 8);
        assert!(hidden_size_of(&[2, 32], 2, 4, 64).is_err());
        assert!(hidden_size_of(&[1, 4, 16], 2, 4, 64).is_err());
        assert!(hidden_size_of(&[2, 8, 4], 2, 4, 64).is_err());
        assert!(hidden_size_of(&[2, 4, 8], 2, 4, 63).is_err());
    }

    fn head(hidden: usize) -> ClassificationHead {
        use crate::labels::NUM_OUTPUTS;
        ClassificationHead::new(vec![vec![0.5; hidden]; NUM_OUTPUTS], vec![0.0; NUM_OUTPUTS]).unwrap()
    }

    fn encoded(n: usize) -> Vec<(usize, Encoding)> {
        (0..n).map(|i| (i, Encoding::default())).collect()
    }

    #[test]
    fn test_score_chunks_isolates_failed_chunk() {
        let head = head(2);
        let encoded = encoded(5);
        let mut results: Vec<Option<Result<LogitGrid>>> = (0..5).map(|_| None).collect();
        let mut calls = 0;

        score_chunks(&encoded, 2, &head, &mut results, |encodings| {
            calls += 1;
            if calls == 2 {
                anyhow::bail!("out of memory");
            }
            Ok(vec![vec![1.0, 1.0]; encodings.len()])
        })
        .unwrap();

        let ok: Vec<bool> = results.iter().map(|r| matches!(r, Some(Ok(_)))).collect();
        assert_eq!(ok, vec![true, true, false, false, true]);
        let err = results[2].as_ref().unwrap().as_ref().unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_score_chunks_fails_when_every_chunk_fails() {
        let head = head(2);
        let encoded = encoded(3);
        let mut results: Vec<Option<Result<LogitGrid>>> = (0..3).map(|_| None).collect();

        let err = score_chunks(&encoded, 2, &head, &mut results, |_| {
            anyhow::bail!("session crashed")
        })
        .unwrap_err();
        assert!(err.to_string().contains("session crashed"));
    }

    #[test]
    fn test_score_chunks_rejects_short_encoder_output() {
        let head = head(2);
        let encoded = encoded(2);
        let mut results: Vec<Option<Result<LogitGrid>>> = (0..2).map(|_| None).collect();

        let err = score_chunks(&encoded, 4, &head, &mut results, |_| Ok(vec![vec![1.0, 1.0]]))
            .unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 reviews"));
    }
}
