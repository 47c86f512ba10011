use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub max_in_flight_submissions: usize,
    pub sandbox: SandboxConfig,
    pub mastery: MasteryConfig,
    pub llm: LLMConfig,
    pub bkt: BktConfig,
    pub viva: VivaConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MasteryConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct LLMConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub transcription_model: String,
    pub timeout_secs: u64,
}

/// Default four-parameter BKT set; per-concept overrides live in the store.
#[derive(Debug, Clone)]
pub struct BktConfig {
    pub p_init: f64,
    pub p_learn: f64,
    pub p_slip: f64,
    pub p_guess: f64,
}

#[derive(Debug, Clone)]
pub struct VivaConfig {
    /// Inactivity window after which an active session is abandoned.
    pub session_timeout_secs: i64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_mastery_reconcile: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("cors_origin", &self.cors_origin)
            .field("max_in_flight_submissions", &self.max_in_flight_submissions)
            .field("sandbox", &self.sandbox)
            .field("mastery", &self.mastery)
            .field("llm", &self.llm)
            .field("bkt", &self.bkt)
            .field("viva", &self.viva)
            .field("worker", &self.worker)
            .finish()
    }
}

impl fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("model", &self.model)
            .field("transcription_model", &self.transcription_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 8002_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/tutor.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            max_in_flight_submissions: env_or_parse("MAX_IN_FLIGHT_SUBMISSIONS", 64_usize),
            sandbox: SandboxConfig {
                base_url: env_or("SANDBOX_URL", "http://localhost:8000"),
                timeout_secs: env_or_parse("SANDBOX_TIMEOUT_SECS", 6_u64),
            },
            mastery: MasteryConfig {
                base_url: env_or("MASTERY_URL", "http://localhost:8001"),
                timeout_secs: env_or_parse("MASTERY_TIMEOUT_SECS", 5_u64),
            },
            llm: LLMConfig {
                enabled: env_or_bool("LLM_ENABLED", false),
                mock: env_or_bool("LLM_MOCK", true),
                api_url: env_or("LLM_API_URL", "https://api.groq.com/openai/v1"),
                api_key: env_or("LLM_API_KEY", ""),
                model: env_or("LLM_MODEL", "llama-3.3-70b-versatile"),
                transcription_model: env_or("LLM_TRANSCRIPTION_MODEL", "whisper-large-v3"),
                timeout_secs: env_or_parse("LLM_TIMEOUT_SECS", 8_u64),
            },
            bkt: BktConfig {
                p_init: env_or_parse("BKT_P_INIT", 0.1_f64),
                p_learn: env_or_parse("BKT_P_LEARN", 0.1_f64),
                p_slip: env_or_parse("BKT_P_SLIP", 0.1_f64),
                p_guess: env_or_parse("BKT_P_GUESS", 0.2_f64),
            },
            viva: VivaConfig {
                session_timeout_secs: env_or_parse("VIVA_SESSION_TIMEOUT_SECS", 900_i64),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_mastery_reconcile: env_or_bool("ENABLE_MASTERY_RECONCILE_WORKER", true),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
