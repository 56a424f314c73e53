// POST /predict: topics and sentiments for a batch of reviews.
//
// Body:  {"data": [{"id": 1, "text": "..."}], "threshold": 0.3}
// Query: ?threshold=0.3 (takes precedence over the body field)
//
// Returns 422 for a malformed body, 400 for a bad threshold and 413 when the
// batch exceeds the configured cap. All of these are decided before the
// model runs.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::pipeline::models::{PredictRequest, PredictResponse};
use crate::web::{api_error, AppState};

#[derive(Deserialize)]
pub struct PredictQuery {
    pub threshold: Option<f64>,
}

/// POST /predict: run the pipeline over every review in the request.
pub async fn predict(
    State(state): State<AppState>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return api_error(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return api_error(rejection.status(), &rejection.body_text()),
    };

    let threshold = match state
        .inference
        .threshold(query.threshold.or(request.threshold))
    {
        Ok(threshold) => threshold,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    if let Err(e) = state.inference.check_batch_size(request.data.len()) {
        return api_error(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string());
    }

    match state.inference.predict(&request.data, threshold).await {
        Ok(results) => Json(PredictResponse { results }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, reviews = request.data.len(), "Prediction failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed")
        }
    }
}
