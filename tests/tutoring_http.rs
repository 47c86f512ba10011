mod common;

use axum::http::Method;
use serde_json::json;

use common::app::spawn_test_app;
use common::http::{assert_json_error, assert_status_ok_json, request, response_json};

fn missing_base_case_submission() -> serde_json::Value {
    json!({
        "student_id": "s1",
        "problem_id": "factorial",
        "code": "def factorial(n):\n    return n * factorial(n-1)",
        "language": "python",
        "problem_description": "Compute n!",
        "concept": "recursion",
    })
}

#[tokio::test]
async fn missing_base_case_yields_level_one_socratic_hint() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/tutoring/submit",
        Some(missing_base_case_submission()),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let data = &body["data"];
    assert_eq!(data["analysis"]["algorithm_pattern"], "recursive");
    assert!(data["analysis"]["issues"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i == "missing_base_case"));

    assert_eq!(data["hint"]["should_intervene"], true);
    assert_eq!(data["hint"]["hint_level"], 1);
    let hint_text = data["hint"]["hint_text"].as_str().unwrap();
    assert!(hint_text.contains('?'));
    assert!(!hint_text.contains("return 1"));
    assert!(!hint_text.contains("```"));
}

#[tokio::test]
async fn sandbox_down_degrades_execution_but_not_the_pipeline() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/tutoring/submit",
        Some(missing_base_case_submission()),
    )
    .await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let data = &body["data"];
    assert!(data["execution"]["passed"].is_null());
    assert_eq!(data["execution"]["status"], "unknown");
    // No observation: mastery stays at the prior, local authority.
    assert_eq!(data["mastery"]["source"], "local");
    let p = data["mastery"]["p_mastery"].as_f64().unwrap();
    assert!((p - 0.1).abs() < 1e-9);
    // The analyzer still drives a hint.
    assert_eq!(data["hint"]["should_intervene"], true);
}

#[tokio::test]
async fn frustrated_submission_gets_the_gentle_path() {
    let test_app = spawn_test_app().await;

    let mut payload = missing_base_case_submission();
    payload["affect_signals"] = json!({ "angry": 0.9, "fearful": 0.8, "sad": 0.9 });

    let resp = request(&test_app.app, Method::POST, "/api/tutoring/submit", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let data = &body["data"];
    assert_eq!(data["hint"]["hint_path"], "gentle");
    let hint_text = data["hint"]["hint_text"].as_str().unwrap();
    assert!(hint_text.contains("take a breath"));
    assert!(data["affect"]["frustration"].as_f64().unwrap() > 0.7);
}

#[tokio::test]
async fn hint_level_escalates_on_repeat_submissions() {
    let test_app = spawn_test_app().await;

    for expected_level in 1..=3u8 {
        let resp = request(
            &test_app.app,
            Method::POST,
            "/api/tutoring/submit",
            Some(missing_base_case_submission()),
        )
        .await;
        let (_, _, body) = response_json(resp).await;
        assert_eq!(
            body["data"]["hint"]["hint_level"],
            serde_json::json!(expected_level)
        );
    }

    // Without three failed executions + high frustration, level 4 stays
    // out of reach.
    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/tutoring/submit",
        Some(missing_base_case_submission()),
    )
    .await;
    let (_, _, body) = response_json(resp).await;
    assert_eq!(body["data"]["hint"]["hint_level"], serde_json::json!(3));
}

#[tokio::test]
async fn syntax_error_suppresses_hint_but_returns_analysis() {
    let test_app = spawn_test_app().await;

    let payload = json!({
        "student_id": "s1",
        "problem_id": "p1",
        "code": "def broken(:\n    pass",
    });
    let resp = request(&test_app.app, Method::POST, "/api/tutoring/submit", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let data = &body["data"];
    assert_eq!(data["analysis"]["is_valid"], false);
    assert_eq!(data["hint"]["should_intervene"], false);
    assert!(data["hint"].get("hint_text").is_none());
}

#[tokio::test]
async fn empty_code_is_rejected_as_invalid_input() {
    let test_app = spawn_test_app().await;

    let payload = json!({
        "student_id": "s1",
        "problem_id": "p1",
        "code": "   ",
    });
    let resp = request(&test_app.app, Method::POST, "/api/tutoring/submit", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_INPUT");
}

#[tokio::test]
async fn unsupported_language_is_rejected() {
    let test_app = spawn_test_app().await;

    let payload = json!({
        "student_id": "s1",
        "problem_id": "p1",
        "code": "int main() { return 0; }",
        "language": "c",
    });
    let resp = request(&test_app.app, Method::POST, "/api/tutoring/submit", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_json_error(&body, "INVALID_INPUT");
}

#[tokio::test]
async fn standalone_hint_always_helps_on_parseable_code() {
    let test_app = spawn_test_app().await;

    let payload = json!({
        "student_id": "s2",
        "problem_id": "sum",
        "code": "def total(xs):\n    t = 0\n    for x in xs:\n        t += x\n    return t",
        "problem_description": "Sum a list",
    });
    let resp = request(&test_app.app, Method::POST, "/api/tutoring/hint", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let data = &body["data"];
    assert_eq!(data["hint"]["should_intervene"], true);
    assert!(data["hint"]["hint_text"].as_str().is_some());
}

#[tokio::test]
async fn affect_ingestion_smooths_and_reports_interventions() {
    let test_app = spawn_test_app().await;

    // Zero-expression sample maps to an all-zero cognitive state.
    let payload = json!({
        "student_id": "s3",
        "expressions": {},
    });
    let resp = request(&test_app.app, Method::POST, "/api/affect/expressions", Some(payload)).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);
    let affect = &body["data"]["affect"];
    assert_eq!(affect["engagement"].as_f64().unwrap(), 0.0);
    assert_eq!(affect["frustration"].as_f64().unwrap(), 0.0);
    assert_eq!(affect["should_intervene"], false);

    // A strongly angry stream pushes the smoothed state over the
    // intervention threshold.
    for _ in 0..10 {
        let payload = json!({
            "student_id": "s3",
            "expressions": { "angry": 1.0, "fearful": 1.0, "sad": 1.0 },
        });
        let resp =
            request(&test_app.app, Method::POST, "/api/affect/expressions", Some(payload)).await;
        assert!(resp.status().is_success());
    }

    let payload = json!({
        "student_id": "s3",
        "expressions": { "angry": 1.0, "fearful": 1.0, "sad": 1.0 },
    });
    let resp = request(&test_app.app, Method::POST, "/api/affect/expressions", Some(payload)).await;
    let (_, _, body) = response_json(resp).await;
    assert_eq!(body["data"]["affect"]["should_intervene"], true);
}

#[tokio::test]
async fn history_endpoint_returns_submissions_and_hints() {
    let test_app = spawn_test_app().await;

    let resp = request(
        &test_app.app,
        Method::POST,
        "/api/tutoring/submit",
        Some(missing_base_case_submission()),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = request(&test_app.app, Method::GET, "/api/tutoring/history/s1", None).await;
    let (status, _, body) = response_json(resp).await;
    assert_status_ok_json(status, &body);

    let data = &body["data"];
    assert_eq!(data["submissions"].as_array().unwrap().len(), 1);
    assert_eq!(data["hints"].as_array().unwrap().len(), 1);
    assert_eq!(data["submissions"][0]["hint_emitted"], true);
}
