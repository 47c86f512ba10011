/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 情感平滑窗口大小（最近 N 个采样的滑动平均）
pub const AFFECT_WINDOW_SIZE: usize = 10;

/// Number of viva questions generated per session.
pub const VIVA_QUESTION_COUNT: usize = 3;

/// Minimum answered turns before a viva verdict is meaningful.
pub const VIVA_MIN_ANSWERED: usize = 2;

/// Fixed weights for combining LLM and overlap scores on a viva answer.
pub const VIVA_LLM_WEIGHT: f64 = 0.7;
pub const VIVA_OVERLAP_WEIGHT: f64 = 0.3;

/// Probability floor/ceiling applied to every persisted mastery value.
pub const P_MASTERY_MIN: f64 = 0.01;
pub const P_MASTERY_MAX: f64 = 0.99;

/// Floor/ceiling for BKT working parameters after affect modulation.
pub const BKT_PARAM_MIN: f64 = 0.01;
pub const BKT_PARAM_MAX: f64 = 0.9;

/// Maximum accepted audio payload for viva answers (raw bytes, pre-decode).
pub const MAX_AUDIO_BYTES: usize = 12 * 1024 * 1024;

/// 提示等级上限（4 = 直接提示，仅在多次失败且高挫败时可达）
pub const MAX_HINT_LEVEL: u8 = 4;

/// Failed attempts on the same problem required before level 4 is reachable.
pub const DIRECT_HINT_MIN_ATTEMPTS: u32 = 3;
