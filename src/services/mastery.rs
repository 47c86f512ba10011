//! Client for the remote mastery service (`POST /submit`).
//!
//! The remote service owns the canonical mastery value. When it answers,
//! its value wins; when it is unreachable the local BKT result becomes
//! authoritative and is reconciled later by the `mastery_reconcile` worker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MasteryConfig;

#[derive(Debug, Error)]
pub enum MasteryError {
    #[error("mastery service unreachable: {0}")]
    Unreachable(String),
    #[error("mastery service returned an invalid response: {0}")]
    BadResponse(String),
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    student_id: &'a str,
    concept: &'a str,
    correct: Option<bool>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    p_mastery: f64,
}

#[derive(Debug, Clone)]
pub struct MasteryClient {
    base_url: String,
    client: reqwest::Client,
}

impl MasteryClient {
    pub fn new(config: &MasteryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Report an observation and receive the canonical mastery value.
    pub async fn submit(
        &self,
        student_id: &str,
        concept: &str,
        correct: Option<bool>,
        timestamp: DateTime<Utc>,
    ) -> Result<f64, MasteryError> {
        let url = format!("{}/submit", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&SubmitRequest {
                student_id,
                concept,
                correct,
                timestamp,
            })
            .send()
            .await
            .map_err(|e| MasteryError::Unreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MasteryError::Unreachable(format!("HTTP {}", resp.status())));
        }

        let parsed: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| MasteryError::BadResponse(e.to_string()))?;

        if !(0.0..=1.0).contains(&parsed.p_mastery) {
            return Err(MasteryError::BadResponse(format!(
                "p_mastery out of range: {}",
                parsed.p_mastery
            )));
        }
        Ok(parsed.p_mastery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_service_is_a_typed_error() {
        let client = MasteryClient::new(&MasteryConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        });
        let result = client.submit("s1", "recursion", Some(true), Utc::now()).await;
        assert!(matches!(result, Err(MasteryError::Unreachable(_))));
    }
}
