// Classification head loading from disk and its fit with the pipeline.
//
// Writes small head.json files to a temp directory; no ONNX encoder needed.

use absa::labels::{NUM_OUTPUTS, NUM_TOPICS};
use absa::model::head::ClassificationHead;
use absa::pipeline::decision::{decide, ScoreGrid, Threshold};
use serde_json::json;

fn write_head(name: &str, contents: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("absa-head-{name}"));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("head.json");
    std::fs::write(&path, contents).unwrap();
    path
}

/// A head over a 2-dim hidden state where every output is x[0] - x[1],
/// except output `t * 3 + s`, which is x[0] + x[1].
fn head_json(topic: usize, sentiment: usize) -> String {
    let weight: Vec<Vec<f32>> = (0..NUM_OUTPUTS)
        .map(|i| {
            if i == topic * 3 + sentiment {
                vec![1.0, 1.0]
            } else {
                vec![1.0, -1.0]
            }
        })
        .collect();
    json!({ "weight": weight, "bias": vec![0.0; NUM_OUTPUTS] }).to_string()
}

#[test]
fn loaded_head_drives_the_decision_rule() {
    let path = write_head("drives", &head_json(7, 2));
    let head = ClassificationHead::load(&path).unwrap();
    assert_eq!(head.hidden_size(), 2);

    // x = [2, 3]: the chosen cell gets 5.0, every other cell -1.0.
    let logits = head.forward(&[2.0, 3.0]).unwrap();
    let detected = decide(&ScoreGrid::from_logits(&logits), Threshold::default());

    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0].topic, "Кешбэк");
    assert_eq!(detected[0].sentiment.label(), "Положительно");

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn hidden_size_mismatch_is_an_error() {
    let path = write_head("mismatch", &head_json(0, 0));
    let head = ClassificationHead::load(&path).unwrap();
    assert!(head.forward(&[1.0; 768]).is_err());
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn head_for_wrong_topic_count_fails_to_load() {
    let weight = vec![vec![0.0_f32; 4]; (NUM_TOPICS - 1) * 3];
    let contents = json!({ "weight": weight, "bias": vec![0.0; (NUM_TOPICS - 1) * 3] }).to_string();
    let path = write_head("topics", &contents);

    let err = ClassificationHead::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("expected 33"));

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn malformed_head_file_fails_to_load() {
    let path = write_head("malformed", "{\"weight\": [[1.0]]");
    assert!(ClassificationHead::load(&path).is_err());
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn missing_head_file_names_the_path() {
    let path = std::env::temp_dir().join("absa-head-absent").join("head.json");
    let err = ClassificationHead::load(&path).unwrap_err();
    assert!(err.to_string().contains("head.json"));
}
