use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::orchestrator::SubmissionRequest;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/hint", post(hint))
        .route("/history/:student_id", get(history))
}

/// The primary nine-step pipeline entry point.
async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmissionRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = state.engine().process_submission(req).await?;
    Ok(ok(response))
}

/// Standalone hint: the student asked for help without submitting.
async fn hint(
    State(state): State<AppState>,
    Json(req): Json<SubmissionRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = state.engine().request_hint(req).await?;
    Ok(ok(response))
}

async fn history(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let submissions = state.store().get_student_submissions(&student_id, 50)?;
    let hints = state.store().get_hint_history(&student_id, 50)?;
    Ok(ok(serde_json::json!({
        "student_id": student_id,
        "submissions": submissions,
        "hints": hints,
    })))
}
