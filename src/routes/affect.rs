use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::affect::ExpressionScores;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/expressions", post(expressions))
}

#[derive(Debug, Deserialize)]
struct ExpressionsRequest {
    student_id: String,
    expressions: ExpressionScores,
}

/// Ingest a raw expression sample: map to cognitive state, smooth, merge
/// into the student record and return the intervene decision.
async fn expressions(
    State(state): State<AppState>,
    Json(req): Json<ExpressionsRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = state
        .engine()
        .ingest_affect(&req.student_id, req.expressions)
        .await?;
    Ok(ok(response))
}
