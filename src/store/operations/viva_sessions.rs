use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VivaStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VivaVerdict {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "WEAK")]
    Weak,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "INCONCLUSIVE")]
    Inconclusive,
}

impl VivaVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Weak => "WEAK",
            Self::Fail => "FAIL",
            Self::Inconclusive => "INCONCLUSIVE",
        }
    }
}

/// What a generated question interrogates. Every session covers all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionFocus {
    EdgeCase,
    Invariant,
    Complexity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VivaQuestion {
    pub index: usize,
    pub text: String,
    pub focus: QuestionFocus,
    /// Concepts a good answer is expected to touch.
    pub expected_concepts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VivaTurn {
    pub question_index: usize,
    pub answer_text: String,
    pub llm_score: f64,
    pub overlap_score: f64,
    pub combined_score: f64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VivaSessionRecord {
    pub session_id: String,
    pub student_id: String,
    pub problem_id: String,
    pub code_snapshot: String,
    /// Concept the verdict's BKT update targets.
    pub concept: String,
    /// All concepts the analyzer extracted from the snapshot; the overlap
    /// score for every answer is computed against these.
    pub concepts: Vec<String>,
    pub questions: Vec<VivaQuestion>,
    pub turns: Vec<VivaTurn>,
    pub status: VivaStatus,
    pub verdict: Option<VivaVerdict>,
    pub overall_score: Option<f64>,
    pub synonyms_version: u32,
    pub created_at: DateTime<Utc>,
    /// Last answer time; drives the inactivity timeout.
    pub updated_at: DateTime<Utc>,
}

impl VivaSessionRecord {
    pub fn remaining_questions(&self) -> usize {
        self.questions.len().saturating_sub(self.turns.len())
    }

    pub fn current_question(&self) -> Option<&VivaQuestion> {
        self.questions.get(self.turns.len())
    }

    pub fn is_expired(&self, timeout_secs: i64, now: DateTime<Utc>) -> bool {
        self.status == VivaStatus::Active
            && now - self.updated_at > Duration::seconds(timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VivaStats {
    pub total_sessions: u32,
    pub completed_sessions: u32,
    pub passed_sessions: u32,
    pub pass_rate: f64,
}

impl Store {
    pub fn create_viva_session(&self, session: &VivaSessionRecord) -> Result<(), StoreError> {
        let key = keys::viva_session_key(&session.session_id);
        let index_key = keys::viva_student_index_key(&session.student_id, &session.session_id);
        let session_bytes = Self::serialize(session)?;

        let key_bytes = key.as_bytes().to_vec();
        let index_key_bytes = index_key.as_bytes().to_vec();

        (&self.viva_sessions, &self.viva_by_student)
            .transaction(move |(tx_sessions, tx_index)| {
                tx_sessions.insert(key_bytes.as_slice(), session_bytes.as_slice())?;
                tx_index.insert(index_key_bytes.as_slice(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => {
                    StoreError::Sled(sled::Error::Unsupported("transaction aborted".into()))
                }
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;
        Ok(())
    }

    pub fn get_viva_session(
        &self,
        session_id: &str,
    ) -> Result<Option<VivaSessionRecord>, StoreError> {
        let key = keys::viva_session_key(session_id);
        match self.viva_sessions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 使用 CAS 保护会话更新，防止并发写入丢失。
    pub fn update_viva_session(&self, session: &VivaSessionRecord) -> Result<(), StoreError> {
        let key = keys::viva_session_key(&session.session_id);
        let new_bytes = Self::serialize(session)?;

        for _ in 0..MAX_CAS_RETRIES {
            let old_raw = self.viva_sessions.get(key.as_bytes())?;
            match self.viva_sessions.compare_and_swap(
                key.as_bytes(),
                old_raw,
                Some(new_bytes.as_slice()),
            )? {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "viva_session".to_string(),
            key: session.session_id.clone(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn get_student_viva_sessions(
        &self,
        student_id: &str,
    ) -> Result<Vec<VivaSessionRecord>, StoreError> {
        let prefix = keys::viva_student_index_prefix(student_id);
        let mut sessions = Vec::new();
        for item in self.viva_by_student.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let key_str = String::from_utf8(k.to_vec()).unwrap_or_default();
            if let Some(session_id) = key_str.rsplit(':').next() {
                if let Some(session) = self.get_viva_session(session_id)? {
                    sessions.push(session);
                }
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Aggregate viva stats for one student: attempts, completions and
    /// pass rate over completed sessions.
    pub fn get_viva_stats(&self, student_id: &str) -> Result<VivaStats, StoreError> {
        let sessions = self.get_student_viva_sessions(student_id)?;
        let total = sessions.len() as u32;
        let completed = sessions
            .iter()
            .filter(|s| s.status == VivaStatus::Completed)
            .count() as u32;
        let passed = sessions
            .iter()
            .filter(|s| s.verdict == Some(VivaVerdict::Pass))
            .count() as u32;
        let pass_rate = if completed > 0 {
            passed as f64 / completed as f64
        } else {
            0.0
        };
        Ok(VivaStats {
            total_sessions: total,
            completed_sessions: completed,
            passed_sessions: passed,
            pass_rate,
        })
    }

    /// All sessions still marked active; the expiry worker decides which
    /// have timed out.
    pub fn list_active_viva_sessions(&self) -> Result<Vec<VivaSessionRecord>, StoreError> {
        let mut sessions = Vec::new();
        for item in self.viva_sessions.iter() {
            let (_, raw) = item?;
            match Self::deserialize::<VivaSessionRecord>(&raw) {
                Ok(session) if session.status == VivaStatus::Active => sessions.push(session),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable viva session"),
            }
        }
        Ok(sessions)
    }
}
