//! Client for the external code-execution sandbox (`POST /run`).
//!
//! The service never executes untrusted code itself. When the sandbox is
//! unreachable the outcome degrades to `Unknown` — the pipeline continues
//! and the BKT stage skips its observation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SandboxConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "RTE")]
    Rte,
    #[serde(rename = "TLE")]
    Tle,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Rte => "RTE",
            Self::Tle => "TLE",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// None when the sandbox could not be reached at all.
    pub passed: Option<bool>,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecutionOutcome {
    pub fn unknown() -> Self {
        Self {
            passed: None,
            status: ExecutionStatus::Unknown,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    code: &'a str,
    stdin: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    exit_code: Option<i32>,
    status: ExecutionStatus,
}

#[derive(Debug, Clone)]
pub struct SandboxClient {
    base_url: String,
    client: reqwest::Client,
}

impl SandboxClient {
    pub fn new(config: &SandboxConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Run a submission. Infallible by design: transport problems come back
    /// as an `Unknown` outcome, not an error.
    pub async fn run(&self, code: &str, stdin: &str) -> ExecutionOutcome {
        let url = format!("{}/run", self.base_url);
        let result = self
            .client
            .post(&url)
            .json(&RunRequest { code, stdin })
            .send()
            .await;

        let resp = match result {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Sandbox returned non-success status");
                return ExecutionOutcome::unknown();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sandbox unreachable");
                return ExecutionOutcome::unknown();
            }
        };

        match resp.json::<RunResponse>().await {
            Ok(run) => {
                let passed = match run.status {
                    ExecutionStatus::Ok => Some(true),
                    ExecutionStatus::Rte | ExecutionStatus::Tle => Some(false),
                    ExecutionStatus::Unknown => None,
                };
                ExecutionOutcome {
                    passed,
                    status: run.status,
                    stdout: run.stdout,
                    stderr: run.stderr,
                    exit_code: run.exit_code,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sandbox response decode failed");
                ExecutionOutcome::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_sandbox_degrades_to_unknown() {
        let client = SandboxClient::new(&SandboxConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        });
        let outcome = client.run("print(1)", "").await;
        assert_eq!(outcome.status, ExecutionStatus::Unknown);
        assert_eq!(outcome.passed, None);
    }

    #[test]
    fn status_wire_names_match_contract() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Ok).unwrap(),
            "\"OK\""
        );
        assert_eq!(
            serde_json::from_str::<ExecutionStatus>("\"TLE\"").unwrap(),
            ExecutionStatus::Tle
        );
    }

    #[test]
    fn run_response_tolerates_null_exit_code() {
        let parsed: RunResponse =
            serde_json::from_str(r#"{"stdout":"","stderr":"timeout","exit_code":null,"status":"TLE"}"#)
                .unwrap();
        assert_eq!(parsed.status, ExecutionStatus::Tle);
        assert!(parsed.exit_code.is_none());
    }
}
