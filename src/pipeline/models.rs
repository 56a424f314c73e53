// Request and result types that flow through the pipeline and the API.

use serde::{Deserialize, Serialize};

use super::decision::TopicPrediction;

/// One review to analyze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub text: String,
}

/// Detected topics and sentiments for one review.
///
/// `topics[i]` and `sentiments[i]` always belong together. When the review
/// could not be processed, both lists are empty and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub id: i64,
    pub text: String,
    pub topics: Vec<String>,
    pub sentiments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReviewResult {
    pub fn from_predictions(review: &Review, predictions: &[TopicPrediction]) -> Self {
        let (topics, sentiments) = predictions
            .iter()
            .map(|p| (p.topic.to_string(), p.sentiment.label().to_string()))
            .unzip();

        Self {
            id: review.id,
            text: review.text.clone(),
            topics,
            sentiments,
            error: None,
        }
    }

    pub fn failed(review: &Review, error: impl Into<String>) -> Self {
        Self {
            id: review.id,
            text: review.text.clone(),
            topics: Vec::new(),
            sentiments: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Body of `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<Review>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Response of `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub results: Vec<ReviewResult>,
}
