use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};
use crate::tutoring::HintPath;

/// Append-only log of every hint delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintRecord {
    pub id: String,
    pub student_id: String,
    pub problem_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: u8,
    pub path: HintPath,
    pub teaching_focus: String,
    pub hint_text: String,
}

impl Store {
    pub fn record_hint(&self, record: &HintRecord) -> Result<(), StoreError> {
        let key = keys::hint_key(
            &record.student_id,
            record.timestamp.timestamp_millis(),
            &record.id,
        );
        self.hints.insert(key.as_bytes(), Self::serialize(record)?)?;
        Ok(())
    }

    /// Newest first.
    pub fn get_hint_history(
        &self,
        student_id: &str,
        limit: usize,
    ) -> Result<Vec<HintRecord>, StoreError> {
        let prefix = keys::hint_prefix(student_id);
        let mut records = Vec::new();
        for item in self.hints.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            records.push(Self::deserialize::<HintRecord>(&raw)?);
            if records.len() >= limit {
                break;
            }
        }
        Ok(records)
    }

    /// Most recent hint for one problem, if any. Feeds the next prompt so
    /// the LLM escalates instead of repeating itself.
    pub fn last_hint_for(
        &self,
        student_id: &str,
        problem_id: &str,
    ) -> Result<Option<HintRecord>, StoreError> {
        let prefix = keys::hint_prefix(student_id);
        for item in self.hints.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let record: HintRecord = Self::deserialize(&raw)?;
            if record.problem_id == problem_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    fn sample(id: &str, problem: &str, level: u8, at: DateTime<Utc>) -> HintRecord {
        HintRecord {
            id: id.to_string(),
            student_id: "s1".to_string(),
            problem_id: problem.to_string(),
            timestamp: at,
            level,
            path: HintPath::Socratic,
            teaching_focus: "missing_base_case".to_string(),
            hint_text: "What should your function return in the simplest case?".to_string(),
        }
    }

    #[test]
    fn last_hint_for_problem_is_the_newest() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("hints.sled").to_str().unwrap()).unwrap();

        let now = Utc::now();
        store
            .record_hint(&sample("h1", "p1", 1, now - Duration::seconds(30)))
            .unwrap();
        store.record_hint(&sample("h2", "p1", 2, now)).unwrap();
        store.record_hint(&sample("h3", "p2", 1, now)).unwrap();

        let last = store.last_hint_for("s1", "p1").unwrap().unwrap();
        assert_eq!(last.id, "h2");
        assert_eq!(last.level, 2);
    }

    #[test]
    fn history_is_append_only_and_ordered() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("hints2.sled").to_str().unwrap()).unwrap();

        let now = Utc::now();
        for i in 0..3 {
            store
                .record_hint(&sample(
                    &format!("h{i}"),
                    "p1",
                    i as u8 + 1,
                    now - Duration::seconds(30 - i as i64),
                ))
                .unwrap();
        }
        let history = store.get_hint_history("s1", 10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, "h2");
    }
}
