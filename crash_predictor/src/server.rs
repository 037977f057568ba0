use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    bounds::Bounds,
    session::{Evaluation, Session},
    types::{PredictionInput, PredictionView},
};

const INDEX_HTML: &str = include_str!("../static/index.html");

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, e: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": e.to_string() })))
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub log_predictions: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/predict", post(predict))
        .route("/api/bounds", get(bounds))
        .route("/api/evaluate", get(evaluate))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

// ---------- Handlers ----------

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionInput>, JsonRejection>,
) -> Result<Json<PredictionView>, ApiError> {
    // Undecodable bodies (e.g. a day that does not fit in u8) still answer in JSON
    let Json(input) = payload.map_err(|e| api_error(e.status(), e.body_text()))?;
    input
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let view = state.session.predict(&input).map_err(|e| {
        tracing::error!("prediction failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    if state.log_predictions {
        tracing::info!(
            "predict lat_scaled={:.4} lon_scaled={:.4} day={} -> {:.3} at ({:.6}, {:.6})",
            input.latitude_scaled,
            input.longitude_scaled,
            input.day_of_week,
            view.prediction,
            view.marker.lat,
            view.marker.lon
        );
    }
    Ok(Json(view))
}

async fn bounds(State(state): State<AppState>) -> Json<Bounds> {
    Json(state.session.bounds)
}

async fn evaluate(State(state): State<AppState>) -> Result<Json<Evaluation>, ApiError> {
    state
        .session
        .evaluate()
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
}
