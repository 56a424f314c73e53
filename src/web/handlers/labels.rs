// GET /labels: the label space clients can expect in /predict results.

use axum::response::IntoResponse;
use axum::Json;

use crate::labels::{sentiment_labels, TOPICS};

pub async fn get_labels() -> impl IntoResponse {
    Json(serde_json::json!({
        "topics": TOPICS,
        "sentiments": sentiment_labels(),
    }))
}
