// Model artifact locations.
//
// The service needs three files in one directory:
// 1. model.onnx:     the encoder export (last_hidden_state output)
// 2. tokenizer.json: the encoder's Hugging Face tokenizer
// 3. head.json:      the trained classification head weights
//
// By default they live in the platform data directory
// (~/.local/share/absa/models/ on Linux).

use std::path::{Path, PathBuf};

pub const ENCODER_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const HEAD_FILE: &str = "head.json";

/// Returns the default directory for model files.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("absa")
        .join("models")
}

/// Required artifacts that don't exist in `dir`.
pub fn missing_model_files(dir: &Path) -> Vec<PathBuf> {
    [ENCODER_FILE, TOKENIZER_FILE, HEAD_FILE]
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| !path.exists())
        .collect()
}

/// Check whether all three artifacts exist.
pub fn model_files_present(dir: &Path) -> bool {
    missing_model_files(dir).is_empty()
}
