use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use serde::Deserialize;

use crate::constants::MAX_AUDIO_BYTES;
use crate::response::{created, ok, AppError};
use crate::services::llm::AudioFormat;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/answer", post(answer))
        .route("/answer-audio", post(answer_audio))
        .route("/verdict/:session_id", get(verdict))
        .route("/history/:student_id", get(history))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    student_id: String,
    problem_id: String,
    code: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    concept: Option<String>,
}

fn default_language() -> String {
    "python".to_string()
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = state
        .engine()
        .start_viva(
            &req.student_id,
            &req.problem_id,
            &req.code,
            &req.language,
            req.concept,
        )
        .await?;
    Ok(created(response))
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    session_id: String,
    answer_text: String,
}

async fn answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = state
        .engine()
        .answer_viva(&req.session_id, &req.answer_text)
        .await?;
    Ok(ok(response))
}

#[derive(Debug, Deserialize)]
struct AudioAnswerRequest {
    session_id: String,
    /// Base64-encoded audio payload (raw or `data:` URL).
    audio_base64: String,
    #[serde(default = "default_audio_format")]
    format: String,
}

fn default_audio_format() -> String {
    "webm".to_string()
}

async fn answer_audio(
    State(state): State<AppState>,
    Json(req): Json<AudioAnswerRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let format = AudioFormat::from_ext(&req.format)
        .ok_or_else(|| AppError::invalid_input("supported audio formats: wav, mp3, m4a, webm"))?;

    let payload = req
        .audio_base64
        .rsplit(',')
        .next()
        .unwrap_or(req.audio_base64.as_str());
    let audio = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| AppError::invalid_input("audio_base64 is not valid base64"))?;

    if audio.is_empty() {
        return Err(AppError::invalid_input("audio payload is empty"));
    }
    if audio.len() > MAX_AUDIO_BYTES {
        return Err(AppError::payload_too_large("audio payload exceeds the limit"));
    }

    let response = state
        .engine()
        .answer_viva_audio(&req.session_id, audio, format)
        .await?;
    Ok(ok(response))
}

async fn verdict(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let response = state.engine().viva_verdict(&session_id).await?;
    Ok(ok(response))
}

async fn history(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let stats = state.store().get_viva_stats(&student_id)?;
    let sessions: Vec<serde_json::Value> = state
        .store()
        .get_student_viva_sessions(&student_id)?
        .into_iter()
        .map(|s| {
            serde_json::json!({
                "session_id": s.session_id,
                "problem_id": s.problem_id,
                "status": s.status,
                "verdict": s.verdict,
                "overall_score": s.overall_score,
                "questions_answered": s.turns.len(),
                "updated_at": s.updated_at,
            })
        })
        .collect();
    Ok(ok(serde_json::json!({
        "student_id": student_id,
        "stats": stats,
        "sessions": sessions,
    })))
}
