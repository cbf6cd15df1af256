use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::features::FeatureRow;
use crate::model::{PredictError, Predictor, EXPLAIN_STEP};
use crate::types::{Explanation, PredictRequest, PredictResponse};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub mdl: Arc<dyn Predictor>,
}

pub fn router(mdl: Arc<dyn Predictor>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .with_state(AppState { mdl })
}

// ---------- Handler ----------

async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, (StatusCode, Json<serde_json::Value>)> {
    let row = FeatureRow::from_request(&payload);
    let out = respond(state.mdl.as_ref(), &row)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))?;
    tracing::debug!(prediction = out.prediction, "served prediction");
    Ok(Json(out))
}

/// Score one row. Only classification can fail the request; probabilities
/// and the explanation degrade to `None`.
pub fn respond(mdl: &dyn Predictor, row: &FeatureRow) -> Result<PredictResponse, PredictError> {
    let rows = std::slice::from_ref(row);

    let labels = mdl.predict(rows)?;
    let prediction = labels
        .first()
        .ok_or_else(|| PredictError::Malformed("model returned no labels".into()))?
        .to_i64()?;

    let probabilities = optional("probabilities", mdl.predict_proba(rows))
        .and_then(|mut p| if p.is_empty() { None } else { Some(p.swap_remove(0)) });

    let explanation = optional("explanation", mdl.feature_importances(EXPLAIN_STEP))
        .map(|feature_importances| Explanation {
            feature_importances,
        });

    Ok(PredictResponse {
        prediction,
        probabilities,
        explanation,
    })
}

/// Unsupported operations are expected and stay quiet; anything else is a
/// defect in the artifact and is logged before being dropped.
fn optional<T>(field: &'static str, res: Result<T, PredictError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(PredictError::Unsupported(op)) => {
            tracing::debug!(field, "{} unavailable", op);
            None
        }
        Err(e) => {
            tracing::warn!(field, error = %e, "omitting field");
            None
        }
    }
}
