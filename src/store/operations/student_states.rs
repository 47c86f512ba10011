use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::affect::{CognitiveSmoother, CognitiveState};
use crate::constants::{P_MASTERY_MAX, P_MASTERY_MIN};
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterySource {
    Remote,
    Local,
}

impl MasterySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMastery {
    pub p_mastery: f64,
    pub attempts: u32,
    pub correct: u32,
    pub source: MasterySource,
    /// True while the local value has not been confirmed by the remote
    /// mastery service.
    pub dirty: bool,
    pub updated_at: DateTime<Utc>,
}

/// Compact entry mirrored into the student record so hint escalation can
/// read history without scanning the hints tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintSummary {
    pub problem_id: String,
    pub level: u8,
    pub timestamp: DateTime<Utc>,
    pub teaching_focus: String,
}

/// One record per student. Exclusively owned by the store; the engine
/// serializes all writes through a per-student lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentState {
    pub student_id: String,
    /// Latest smoothed cognitive state.
    pub affect: CognitiveState,
    pub smoother: CognitiveSmoother,
    pub mastery: BTreeMap<String, ConceptMastery>,
    /// Hint level register per problem; resets when a submission passes.
    pub hint_levels: BTreeMap<String, u8>,
    pub submission_counts: BTreeMap<String, u32>,
    pub failed_counts: BTreeMap<String, u32>,
    pub hint_history: Vec<HintSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentState {
    pub fn new(student_id: &str) -> Self {
        let now = Utc::now();
        Self {
            student_id: student_id.to_string(),
            affect: CognitiveState {
                engagement: 0.5,
                ..CognitiveState::default()
            },
            smoother: CognitiveSmoother::default(),
            mastery: BTreeMap::new(),
            hint_levels: BTreeMap::new(),
            submission_counts: BTreeMap::new(),
            failed_counts: BTreeMap::new(),
            hint_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mastery_for(&self, concept: &str, prior: f64) -> f64 {
        self.mastery
            .get(concept)
            .map(|m| m.p_mastery)
            .unwrap_or(prior)
    }

    /// Write a mastery value, clamped to the persisted probability range.
    pub fn set_mastery(
        &mut self,
        concept: &str,
        p_mastery: f64,
        source: MasterySource,
        correct: Option<bool>,
    ) {
        let now = Utc::now();
        let entry = self
            .mastery
            .entry(concept.to_string())
            .or_insert(ConceptMastery {
                p_mastery: p_mastery.clamp(P_MASTERY_MIN, P_MASTERY_MAX),
                attempts: 0,
                correct: 0,
                source,
                dirty: false,
                updated_at: now,
            });
        entry.p_mastery = p_mastery.clamp(P_MASTERY_MIN, P_MASTERY_MAX);
        entry.source = source;
        entry.dirty = source == MasterySource::Local;
        entry.updated_at = now;
        if let Some(correct) = correct {
            entry.attempts += 1;
            if correct {
                entry.correct += 1;
            }
        }
    }

    pub fn hint_level(&self, problem_id: &str) -> u8 {
        self.hint_levels.get(problem_id).copied().unwrap_or(0)
    }

    pub fn failed_attempts(&self, problem_id: &str) -> u32 {
        self.failed_counts.get(problem_id).copied().unwrap_or(0)
    }
}

impl Store {
    pub fn get_student_state(&self, student_id: &str) -> Result<Option<StudentState>, StoreError> {
        let key = keys::student_state_key(student_id);
        match self.student_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_or_init_student_state(&self, student_id: &str) -> Result<StudentState, StoreError> {
        Ok(self
            .get_student_state(student_id)?
            .unwrap_or_else(|| StudentState::new(student_id)))
    }

    pub fn upsert_student_state(&self, state: &StudentState) -> Result<(), StoreError> {
        let key = keys::student_state_key(&state.student_id);
        self.student_states
            .insert(key.as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }

    /// Full scan, used by the reconcile worker. Rows that fail to decode
    /// are skipped so one corrupt record cannot stall reconciliation.
    pub fn list_student_states(&self) -> Result<Vec<StudentState>, StoreError> {
        let mut states = Vec::new();
        for item in self.student_states.iter() {
            let (_, raw) = item?;
            match Self::deserialize::<StudentState>(&raw) {
                Ok(state) => states.push(state),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable student state"),
            }
        }
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn upsert_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("states.sled").to_str().unwrap()).unwrap();

        let mut state = StudentState::new("s1");
        state.set_mastery("recursion", 0.42, MasterySource::Local, Some(true));
        store.upsert_student_state(&state).unwrap();

        let loaded = store.get_student_state("s1").unwrap().unwrap();
        let mastery = loaded.mastery.get("recursion").unwrap();
        assert!((mastery.p_mastery - 0.42).abs() < 1e-9);
        assert!(mastery.dirty);
        assert_eq!(mastery.attempts, 1);
    }

    #[test]
    fn mastery_values_are_clamped() {
        let mut state = StudentState::new("s1");
        state.set_mastery("loops", 1.7, MasterySource::Remote, None);
        assert!((state.mastery_for("loops", 0.1) - 0.99).abs() < 1e-9);
        state.set_mastery("loops", -0.5, MasterySource::Remote, None);
        assert!((state.mastery_for("loops", 0.1) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn remote_write_clears_dirty_flag() {
        let mut state = StudentState::new("s1");
        state.set_mastery("loops", 0.3, MasterySource::Local, Some(false));
        assert!(state.mastery.get("loops").unwrap().dirty);
        state.set_mastery("loops", 0.35, MasterySource::Remote, None);
        assert!(!state.mastery.get("loops").unwrap().dirty);
    }

    #[test]
    fn unknown_concept_falls_back_to_prior() {
        let state = StudentState::new("s1");
        assert!((state.mastery_for("graphs", 0.1) - 0.1).abs() < 1e-9);
    }
}
