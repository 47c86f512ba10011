use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::sandbox::ExecutionStatus;
use crate::store::keys;
use crate::store::operations::student_states::MasterySource;
use crate::store::{Store, StoreError};

/// One row per processed submission, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub student_id: String,
    pub problem_id: String,
    pub timestamp: DateTime<Utc>,
    pub code: String,
    pub analysis_summary: String,
    pub algorithm_pattern: String,
    pub execution_passed: Option<bool>,
    pub execution_status: ExecutionStatus,
    pub concept: String,
    pub mastery_before: f64,
    pub mastery_after: f64,
    pub mastery_source: MasterySource,
    pub bkt_explanation: String,
    /// Version of the affect→BKT modulation coefficients in force.
    pub modulation_version: u32,
    pub hint_emitted: bool,
}

impl Store {
    pub fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let key = keys::submission_key(
            &record.student_id,
            record.timestamp.timestamp_millis(),
            &record.id,
        );
        self.submissions
            .insert(key.as_bytes(), Self::serialize(record)?)?;
        Ok(())
    }

    /// Newest first (reverse-timestamp keys).
    pub fn get_student_submissions(
        &self,
        student_id: &str,
        limit: usize,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let prefix = keys::submission_prefix(student_id);
        let mut records = Vec::new();
        for item in self.submissions.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            records.push(Self::deserialize::<SubmissionRecord>(&raw)?);
            if records.len() >= limit {
                break;
            }
        }
        Ok(records)
    }

    pub fn count_student_submissions(&self, student_id: &str) -> Result<usize, StoreError> {
        let prefix = keys::submission_prefix(student_id);
        let mut count = 0usize;
        for item in self.submissions.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }
}
