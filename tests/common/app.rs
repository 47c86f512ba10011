use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use tutor_backend::config::{
    BktConfig, Config, LLMConfig, MasteryConfig, SandboxConfig, VivaConfig, WorkerConfig,
};
use tutor_backend::orchestrator::TutorEngine;
use tutor_backend::routes::build_router;
use tutor_backend::state::AppState;
use tutor_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

/// Spawn the app with every external service pointed at an unreachable
/// port, so tests exercise the documented degraded paths deterministically.
/// 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态。
pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("tutor-test.sled");

    let config = Config {
        host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        port: 0,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "*".to_string(),
        max_in_flight_submissions: 8,
        sandbox: SandboxConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        },
        mastery: MasteryConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        },
        llm: LLMConfig {
            enabled: false,
            mock: false,
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            transcription_model: String::new(),
            timeout_secs: 1,
        },
        bkt: BktConfig {
            p_init: 0.1,
            p_learn: 0.1,
            p_slip: 0.1,
            p_guess: 0.2,
        },
        viva: VivaConfig {
            session_timeout_secs: 900,
        },
        worker: WorkerConfig {
            is_leader: false,
            enable_mastery_reconcile: false,
        },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let engine = Arc::new(TutorEngine::new(Arc::new(config.clone()), store.clone()));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, engine, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}
