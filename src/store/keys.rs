pub fn student_state_key(student_id: &str) -> String {
    student_id.to_string()
}

/// Append-only submission key: newest-first iteration via reversed
/// timestamp.
pub fn submission_key(student_id: &str, timestamp_ms: i64, submission_id: &str) -> String {
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    format!("{}:{:020}:{}", student_id, reverse_ts, submission_id)
}

pub fn submission_prefix(student_id: &str) -> String {
    format!("{}:", student_id)
}

pub fn hint_key(student_id: &str, timestamp_ms: i64, hint_id: &str) -> String {
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    format!("{}:{:020}:{}", student_id, reverse_ts, hint_id)
}

pub fn hint_prefix(student_id: &str) -> String {
    format!("{}:", student_id)
}

pub fn viva_session_key(session_id: &str) -> String {
    session_id.to_string()
}

pub fn viva_student_index_key(student_id: &str, session_id: &str) -> String {
    format!("user:{}:{}", student_id, session_id)
}

pub fn viva_student_index_prefix(student_id: &str) -> String {
    format!("user:{}:", student_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_keys_order_newest_first() {
        let newer = submission_key("s1", 2_000, "b");
        let older = submission_key("s1", 1_000, "a");
        assert!(newer < older);
    }

    #[test]
    fn viva_index_prefix_scopes_one_student() {
        let key = viva_student_index_key("s1", "sess");
        assert!(key.starts_with(&viva_student_index_prefix("s1")));
        assert!(!key.starts_with(&viva_student_index_prefix("s10")));
    }
}
