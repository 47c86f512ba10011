//! LLM client: prompted text completions and audio transcription against an
//! OpenAI-compatible endpoint.
//!
//! Every call carries a purpose tag that selects the output validator, and
//! fails closed: one retry with backoff, then a typed `Unavailable` that
//! callers translate into their deterministic fallback. Nothing here ever
//! reaches the orchestrator as a panic or a raw transport error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::LLMConfig;

/// Single retry per the degradation contract: transient failure gets one
/// more chance, then callers fall back.
const MAX_RETRIES: usize = 1;
const BASE_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmPurpose {
    Hint,
    QuestionGen,
    AnswerScore,
    ProblemGen,
}

impl LlmPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::QuestionGen => "question_gen",
            Self::AnswerScore => "answer_score",
            Self::ProblemGen => "problem_gen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    M4a,
    Webm,
}

impl AudioFormat {
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "m4a" => Some(Self::M4a),
            "webm" => Some(Self::Webm),
            _ => None,
        }
    }

    pub fn ext(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Webm => "webm",
        }
    }

    fn mime(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Webm => "audio/webm",
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm is disabled")]
    Disabled,
    #[error("llm unavailable: {0}")]
    Unavailable(String),
    #[error("llm returned an unusable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: &LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Prompted completion. Returns validated text or a typed failure the
    /// caller handles via its deterministic fallback.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        purpose: LlmPurpose,
    ) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        if self.config.mock {
            let text = mock_completion(purpose);
            validate_output(purpose, &text)?;
            return Ok(text);
        }

        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                ChatMessage { role: "system".into(), content: system.into() },
                ChatMessage { role: "user".into(), content: user.into() },
            ],
            "stream": false,
            "temperature": 0.7,
        });

        let body = self.post_with_retry(&url, &payload, purpose).await?;
        let parsed: ChatResponse = serde_json::from_slice(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("chat decode: {e}")))?;
        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;
        validate_output(purpose, &text)?;
        Ok(text)
    }

    /// Transcribe an audio answer via the multipart transcription endpoint.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        format: AudioFormat,
    ) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        if self.config.mock {
            return Ok("mock transcript".to_string());
        }

        let url = format!(
            "{}/audio/transcriptions",
            self.config.api_url.trim_end_matches('/')
        );

        let mut attempt = 0usize;
        loop {
            let part = reqwest::multipart::Part::bytes(audio.clone())
                .file_name(format!("answer.{}", format.ext()))
                .mime_str(format.mime())
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            let form = reqwest::multipart::Form::new()
                .text("model", self.config.transcription_model.clone())
                .part("file", part);

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .multipart(form)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: TranscriptionResponse = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::InvalidResponse(format!("transcript decode: {e}")))?;
                    let text = parsed.text.trim().to_string();
                    if text.is_empty() {
                        return Err(LlmError::InvalidResponse("no speech detected".to_string()));
                    }
                    return Ok(text);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        self.backoff(attempt, "transcription").await;
                        continue;
                    }
                    return Err(LlmError::Unavailable(format!("HTTP {status}")));
                }
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        self.backoff(attempt, "transcription").await;
                        continue;
                    }
                    return Err(LlmError::Unavailable(e.to_string()));
                }
            }
        }
    }

    async fn post_with_retry(
        &self,
        url: &str,
        payload: &serde_json::Value,
        purpose: LlmPurpose,
    ) -> Result<Vec<u8>, LlmError> {
        let mut attempt = 0usize;
        loop {
            let result = self
                .client
                .post(url)
                .bearer_auth(&self.config.api_key)
                .json(payload)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|e| LlmError::Unavailable(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        self.backoff(attempt, purpose.as_str()).await;
                        continue;
                    }
                    return Err(LlmError::Unavailable(format!("HTTP {status}")));
                }
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        attempt += 1;
                        self.backoff(attempt, purpose.as_str()).await;
                        continue;
                    }
                    return Err(LlmError::Unavailable(e.to_string()));
                }
            }
        }
    }

    async fn backoff(&self, attempt: usize, purpose: &str) {
        let delay = Duration::from_millis(BASE_BACKOFF_MS * (1 << attempt.min(4)));
        tracing::warn!(attempt, purpose, delay_ms = delay.as_millis() as u64, "LLM call failed, retrying");
        sleep(delay).await;
    }
}

/// Purpose-specific sanity checks. An LLM answer that fails its validator
/// is treated exactly like an unavailable LLM by callers.
fn validate_output(purpose: LlmPurpose, text: &str) -> Result<(), LlmError> {
    match purpose {
        LlmPurpose::Hint | LlmPurpose::ProblemGen => {
            if text.trim().is_empty() {
                return Err(LlmError::InvalidResponse("empty output".to_string()));
            }
            Ok(())
        }
        LlmPurpose::QuestionGen => {
            let parsed: Vec<String> = serde_json::from_str(extract_json(text))
                .map_err(|e| LlmError::InvalidResponse(format!("question list: {e}")))?;
            if parsed.iter().all(|q| q.trim().is_empty()) {
                return Err(LlmError::InvalidResponse("no usable questions".to_string()));
            }
            Ok(())
        }
        LlmPurpose::AnswerScore => {
            let parsed: serde_json::Value = serde_json::from_str(extract_json(text))
                .map_err(|e| LlmError::InvalidResponse(format!("score object: {e}")))?;
            match parsed.get("score").and_then(|s| s.as_f64()) {
                Some(score) if (0.0..=1.0).contains(&score) => Ok(()),
                _ => Err(LlmError::InvalidResponse("score out of range".to_string())),
            }
        }
    }
}

/// Strip markdown fences the model sometimes wraps JSON in.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn mock_completion(purpose: LlmPurpose) -> String {
    match purpose {
        LlmPurpose::Hint => {
            "What should your function do for the smallest possible input?".to_string()
        }
        LlmPurpose::QuestionGen => serde_json::json!([
            "What does your function return for the smallest input?",
            "What stays true on every pass through your main logic?",
            "What is the time complexity of your approach, and could it be improved?"
        ])
        .to_string(),
        LlmPurpose::AnswerScore => serde_json::json!({ "score": 0.6 }).to_string(),
        LlmPurpose::ProblemGen => {
            "Write a function that returns the n-th Fibonacci number.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(enabled: bool, mock: bool) -> LLMConfig {
        LLMConfig {
            enabled,
            mock,
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: String::new(),
            model: "test-model".to_string(),
            transcription_model: "test-whisper".to_string(),
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn disabled_client_returns_typed_error() {
        let client = LlmClient::new(&test_config(false, true));
        let result = client.complete("sys", "user", LlmPurpose::Hint).await;
        assert!(matches!(result, Err(LlmError::Disabled)));
    }

    #[tokio::test]
    async fn mock_mode_returns_valid_output_per_purpose() {
        let client = LlmClient::new(&test_config(true, true));
        for purpose in [
            LlmPurpose::Hint,
            LlmPurpose::QuestionGen,
            LlmPurpose::AnswerScore,
            LlmPurpose::ProblemGen,
        ] {
            let text = client.complete("sys", "user", purpose).await.unwrap();
            assert!(validate_output(purpose, &text).is_ok());
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_becomes_unavailable() {
        let client = LlmClient::new(&test_config(true, false));
        let result = client.complete("sys", "user", LlmPurpose::Hint).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
    }

    #[test]
    fn score_validator_rejects_out_of_range() {
        assert!(validate_output(LlmPurpose::AnswerScore, r#"{"score": 1.4}"#).is_err());
        assert!(validate_output(LlmPurpose::AnswerScore, r#"{"score": 0.4}"#).is_ok());
        assert!(validate_output(LlmPurpose::AnswerScore, "not json").is_err());
    }

    #[test]
    fn question_validator_accepts_fenced_json() {
        let text = "```json\n[\"q1\", \"q2\", \"q3\"]\n```";
        assert!(validate_output(LlmPurpose::QuestionGen, text).is_ok());
    }

    #[test]
    fn audio_format_parsing() {
        assert_eq!(AudioFormat::from_ext("WAV"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_ext(".webm"), Some(AudioFormat::Webm));
        assert_eq!(AudioFormat::from_ext("flac"), None);
    }
}
