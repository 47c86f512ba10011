mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app;
use common::http::{assert_json_error, assert_status_ok_json, request, response_json};

const FACTORIAL: &str =
    "def factorial(n):\n    if n == 0:\n        return 1\n    return n * factorial(n-1)";

async fn start_session(app: &axum::Router) -> (String, usize) {
    let payload = json!({
        "student_id": "s1",
        "problem_id": "factorial",
        "code": FACTORIAL,
        "concept": "recursion",
    });
    let resp = request(app, Method::POST, "/api/viva/start", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    (
        body["data"]["session_id"].as_str().unwrap().to_string(),
        body["data"]["total_questions"].as_u64().unwrap() as usize,
    )
}

#[tokio::test]
async fn start_returns_three_questions_and_the_first_prompt() {
    let test_app = spawn_test_app().await;
    let (session_id, total) = start_session(&test_app.app).await;

    assert!(!session_id.is_empty());
    assert_eq!(total, 3);
}

#[tokio::test]
async fn answer_flow_walks_all_questions_and_scores_each() {
    let test_app = spawn_test_app().await;
    let (session_id, total) = start_session(&test_app.app).await;

    let mut remaining = total;
    for i in 0..total {
        let payload = json!({
            "session_id": session_id,
            "answer_text": "It calls itself and the base case returns one when n is zero",
        });
        let resp = request(&test_app.app, Method::POST, "/api/viva/answer", Some(payload)).await;
        let (status, _, body) = response_json(resp).await;
        assert_status_ok_json(status, &body);

        let data = &body["data"];
        let combined = data["combined_score"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&combined));
        remaining = data["remaining_questions"].as_u64().unwrap() as usize;
        assert_eq!(remaining, total - i - 1);

        if remaining > 0 {
            assert!(data["next_question"].as_str().is_some());
        } else {
            assert!(data.get("next_question").is_none());
        }
    }
    assert_eq!(remaining, 0);

    // One extra answer is a conflict, not a crash.
    let payload = json!({ "session_id": session_id, "answer_text": "more words" });
    let resp = request(&test_app.app, Method::POST, "/api/viva/answer", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_json_error(&body, "VIVA_COMPLETE");
}

#[tokio::test]
async fn verdict_after_all_answers_is_final_and_idempotent() {
    let test_app = spawn_test_app().await;
    let (session_id, total) = start_session(&test_app.app).await;

    for _ in 0..total {
        let payload = json!({
            "session_id": session_id,
            "answer_text": "recursion stops at the base case which returns one",
        });
        let resp = request(&test_app.app, Method::POST, "/api/viva/answer", Some(payload)).await;
        assert!(resp.status().is_success());
    }

    let path = format!("/api/viva/verdict/{session_id}");
    let resp = request(&test_app.app, Method::GET, &path, None).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let verdict = body["data"]["verdict"].as_str().unwrap().to_string();
    assert_ne!(verdict, "INCONCLUSIVE");
    assert!(body["data"]["overall_score"].as_f64().is_some());
    assert_eq!(body["data"]["questions_answered"], 3);

    let resp = request(&test_app.app, Method::GET, &path, None).await;
    let (_, _, body) = response_json(resp).await;
    assert_eq!(body["data"]["verdict"], verdict);
}

#[tokio::test]
async fn verdict_with_one_answer_is_inconclusive_and_session_stays_active() {
    let test_app = spawn_test_app().await;
    let (session_id, _) = start_session(&test_app.app).await;

    let payload = json!({ "session_id": session_id, "answer_text": "the base case returns one" });
    let resp = request(&test_app.app, Method::POST, "/api/viva/answer", Some(payload)).await;
    assert!(resp.status().is_success());

    let path = format!("/api/viva/verdict/{session_id}");
    let resp = request(&test_app.app, Method::GET, &path, None).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["verdict"], "INCONCLUSIVE");
    assert!(body["data"].get("overall_score").is_none());

    // Still answerable afterwards.
    let payload = json!({ "session_id": session_id, "answer_text": "the loop invariant holds" });
    let resp = request(&test_app.app, Method::POST, "/api/viva/answer", Some(payload)).await;
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let test_app = spawn_test_app().await;

    let payload = json!({ "session_id": "does-not-exist", "answer_text": "hello" });
    let resp = request(&test_app.app, Method::POST, "/api/viva/answer", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_error(&body, "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn unparseable_code_cannot_start_a_viva() {
    let test_app = spawn_test_app().await;

    let payload = json!({
        "student_id": "s1",
        "problem_id": "p1",
        "code": "def broken(:\n    pass",
    });
    let resp = request(&test_app.app, Method::POST, "/api/viva/start", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_INPUT");
}

#[tokio::test]
async fn audio_answer_with_unknown_format_is_rejected() {
    let test_app = spawn_test_app().await;
    let (session_id, _) = start_session(&test_app.app).await;

    let payload = json!({
        "session_id": session_id,
        "audio_base64": "AAAA",
        "format": "flac",
    });
    let resp =
        request(&test_app.app, Method::POST, "/api/viva/answer-audio", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_INPUT");
}

#[tokio::test]
async fn audio_answer_with_llm_down_reports_transcription_unavailable() {
    let test_app = spawn_test_app().await;
    let (session_id, _) = start_session(&test_app.app).await;

    let payload = json!({
        "session_id": session_id,
        "audio_base64": "AAAAAAAAAAAAAAAA",
        "format": "webm",
    });
    let resp =
        request(&test_app.app, Method::POST, "/api/viva/answer-audio", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "TRANSCRIPTION_UNAVAILABLE");
}
