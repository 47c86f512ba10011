/// Sled tree 名称常量。
///
/// 修改 tree 名称会导致已有数据不可访问，请勿随意更改。
pub const STUDENT_STATES: &str = "student_states";
pub const SUBMISSIONS: &str = "submissions";
pub const HINTS: &str = "hints";
pub const VIVA_SESSIONS: &str = "viva_sessions";

// Secondary index trees
pub const VIVA_BY_STUDENT: &str = "idx_viva_by_student";
