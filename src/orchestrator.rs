//! Integration orchestrator: the nine-step pipeline binding analyzer,
//! sandbox, affect adapter, BKT, tutoring state machine, LLM and store.
//!
//! Per-student work is serialized through a lock map so submissions for
//! one student apply in arrival order; total in-flight submissions are
//! bounded by a process-wide semaphore. Every external dependency has a
//! documented degraded path — nothing in here crashes the request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use crate::affect::{self, CognitiveState, ExpressionScores};
use crate::analyzer::{AnalyzerError, CodeAnalysisResult, CodeAnalyzer};
use crate::bkt::{self, BktParams, BKT_MODULATION_VERSION};
use crate::config::Config;
use crate::overlap::SYNONYMS_VERSION;
use crate::response::AppError;
use crate::services::llm::{AudioFormat, LlmClient, LlmError, LlmPurpose};
use crate::services::mastery::MasteryClient;
use crate::services::sandbox::{ExecutionOutcome, SandboxClient};
use crate::store::operations::hints::HintRecord;
use crate::store::operations::student_states::{MasterySource, StudentState};
use crate::store::operations::submissions::SubmissionRecord;
use crate::store::operations::viva_sessions::{
    VivaSessionRecord, VivaStatus, VivaTurn, VivaVerdict,
};
use crate::store::Store;
use crate::tutoring::{self, prompts, HintPath, TutoringEvent, TutoringStage};
use crate::viva::{self, VivaEngine};

pub struct TutorEngine {
    config: Arc<Config>,
    store: Arc<Store>,
    analyzer: CodeAnalyzer,
    llm: LlmClient,
    sandbox: SandboxClient,
    mastery: MasteryClient,
    viva: VivaEngine,
    student_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    session_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    submit_permits: Arc<Semaphore>,
}

// ── request / response shapes (canonical wire format) ──────

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub student_id: String,
    pub problem_id: String,
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub problem_description: String,
    #[serde(default)]
    pub stdin: String,
    #[serde(default)]
    pub affect_signals: Option<ExpressionScores>,
    #[serde(default)]
    pub concept: Option<String>,
}

fn default_language() -> String {
    "python".to_string()
}

#[derive(Debug, Serialize)]
pub struct AnalysisView {
    pub is_valid: bool,
    pub algorithm_pattern: String,
    pub issues: Vec<String>,
    pub function_count: u32,
    pub has_recursion: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecutionView {
    pub passed: Option<bool>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MasteryView {
    pub concept: String,
    pub p_mastery: f64,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct HintView {
    pub should_intervene: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_path: Option<HintPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teaching_focus: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AffectView {
    pub frustration: f64,
    pub engagement: f64,
    pub confusion: f64,
    pub boredom: f64,
    pub should_intervene: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub student_id: String,
    pub problem_id: String,
    pub analysis: AnalysisView,
    pub execution: ExecutionView,
    pub mastery: MasteryView,
    pub hint: HintView,
    pub affect: AffectView,
}

#[derive(Debug, Serialize)]
pub struct VivaStartResponse {
    pub session_id: String,
    pub question: String,
    pub question_index: usize,
    pub total_questions: usize,
}

#[derive(Debug, Serialize)]
pub struct VivaAnswerResponse {
    pub session_id: String,
    pub llm_score: f64,
    pub overlap_score: f64,
    pub combined_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
    pub remaining_questions: usize,
}

#[derive(Debug, Serialize)]
pub struct VivaVerdictResponse {
    pub session_id: String,
    pub verdict: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    pub questions_answered: usize,
}

#[derive(Debug, Serialize)]
pub struct AffectIngestResponse {
    pub student_id: String,
    pub affect: AffectView,
}

impl TutorEngine {
    pub fn new(config: Arc<Config>, store: Arc<Store>) -> Self {
        let llm = LlmClient::new(&config.llm);
        Self {
            sandbox: SandboxClient::new(&config.sandbox),
            mastery: MasteryClient::new(&config.mastery),
            viva: VivaEngine::new(llm.clone()),
            analyzer: CodeAnalyzer::new(),
            submit_permits: Arc::new(Semaphore::new(config.max_in_flight_submissions.max(1))),
            student_locks: Arc::new(Mutex::new(HashMap::new())),
            session_locks: Arc::new(Mutex::new(HashMap::new())),
            llm,
            config,
            store,
        }
    }

    // ══════════════════════════════════════════════
    // SUBMISSION PIPELINE
    // ══════════════════════════════════════════════

    pub async fn process_submission(
        &self,
        req: SubmissionRequest,
    ) -> Result<SubmissionResponse, AppError> {
        validate_submission(&req)?;

        let _permit = self
            .submit_permits
            .acquire()
            .await
            .map_err(|_| AppError::internal("submission semaphore closed"))?;

        // Step 1: analyze (pure)
        let analysis = match self.analyzer.analyze(&req.code, &req.language) {
            Ok(analysis) => analysis,
            Err(AnalyzerError::UnsupportedLanguage(lang)) => {
                return Err(AppError::invalid_input(&format!(
                    "unsupported language: {lang}"
                )))
            }
        };

        // Step 2: execute against the sandbox
        let execution = self.sandbox.run(&req.code, &req.stdin).await;

        // Steps 3-8 mutate student state and must apply in arrival order.
        let lock = acquire_lock(&self.student_locks, &req.student_id).await;
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .get_or_init_student_state(&req.student_id)
            .map_err(|e| AppError::internal(&e.to_string()))?;

        // Step 3: fold affect signals into the smoothed state
        let smoothed = match &req.affect_signals {
            Some(expressions) => {
                let cognitive = affect::expressions_to_cognition(expressions);
                state.smoother.smooth(cognitive)
            }
            None => state.smoother.current(),
        };
        state.affect = smoothed;

        // Step 4: BKT update on the targeted concept, remote preferred
        let concept = req
            .concept
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| analysis.primary_concept().map(|c| c.to_string()))
            .unwrap_or_else(|| "general_programming".to_string());

        let mastery_before = state.mastery_for(&concept, self.config.bkt.p_init);
        let (mastery_after, mastery_source, bkt_explanation) = self
            .apply_bkt_observation(&mut state, &concept, execution.passed, &smoothed)
            .await;

        // Step 5: intervention decision
        let affect_wants_help = affect::should_intervene(&smoothed);
        let code_needs_help =
            !analysis.issues.is_empty() || execution.passed == Some(false);
        let should_intervene = analysis.is_valid && (affect_wants_help || code_needs_help);

        // Track attempts before hint-level escalation reads them. A
        // passing run resets the escalation register for the problem.
        *state
            .submission_counts
            .entry(req.problem_id.clone())
            .or_insert(0) += 1;
        match execution.passed {
            Some(false) => {
                *state.failed_counts.entry(req.problem_id.clone()).or_insert(0) += 1;
            }
            Some(true) => {
                state.hint_levels.remove(&req.problem_id);
                state.failed_counts.remove(&req.problem_id);
            }
            None => {}
        }

        // Steps 6-7: hint generation + tone adjustment
        let mut hint_view = HintView {
            should_intervene,
            hint_text: None,
            hint_level: None,
            hint_path: None,
            teaching_focus: None,
        };
        let mut emitted_hint: Option<HintRecord> = None;

        if should_intervene {
            let (record, view) = self
                .produce_hint(&req, &analysis, &mut state, &smoothed, mastery_after)
                .await;
            hint_view = view;
            emitted_hint = Some(record);
        }

        // Step 8: persist (failures are logged, never fatal)
        state.updated_at = Utc::now();
        if let Some(record) = &emitted_hint {
            if let Err(e) = self.store.record_hint(record) {
                tracing::error!(error = %e, "Failed to persist hint record");
            }
        }
        let submission = SubmissionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: req.student_id.clone(),
            problem_id: req.problem_id.clone(),
            timestamp: Utc::now(),
            code: req.code.clone(),
            analysis_summary: analysis.summary.clone(),
            algorithm_pattern: analysis.algorithm_pattern.as_str().to_string(),
            execution_passed: execution.passed,
            execution_status: execution.status,
            concept: concept.clone(),
            mastery_before,
            mastery_after,
            mastery_source,
            bkt_explanation,
            modulation_version: BKT_MODULATION_VERSION,
            hint_emitted: emitted_hint.is_some(),
        };
        if let Err(e) = self.store.record_submission(&submission) {
            tracing::error!(error = %e, "Failed to persist submission record");
        }
        if let Err(e) = self.store.upsert_student_state(&state) {
            tracing::error!(error = %e, "Failed to persist student state");
        }

        // Step 9: assemble the response
        Ok(SubmissionResponse {
            student_id: req.student_id,
            problem_id: req.problem_id,
            analysis: analysis_view(&analysis),
            execution: execution_view(&execution),
            mastery: MasteryView {
                concept,
                p_mastery: mastery_after,
                source: mastery_source.as_str().to_string(),
            },
            hint: hint_view,
            affect: affect_view(&smoothed, affect_wants_help),
        })
    }

    /// BKT step: no observation when the execution outcome is unknown.
    /// The remote service owns the canonical value; when unreachable the
    /// local result stands and is marked for reconciliation.
    async fn apply_bkt_observation(
        &self,
        state: &mut StudentState,
        concept: &str,
        passed: Option<bool>,
        smoothed: &CognitiveState,
    ) -> (f64, MasterySource, String) {
        let before = state.mastery_for(concept, self.config.bkt.p_init);

        let Some(correct) = passed else {
            return (
                before,
                MasterySource::Local,
                "execution outcome unknown; no observation applied".to_string(),
            );
        };

        let params = bkt::modulate(BktParams::from_config(&self.config.bkt), smoothed);
        let local_new = bkt::update(before, correct, &params);

        match self
            .mastery
            .submit(&state.student_id, concept, Some(correct), Utc::now())
            .await
        {
            Ok(remote_p) => {
                state.set_mastery(concept, remote_p, MasterySource::Remote, Some(correct));
                let explanation = bkt::explain(smoothed, before, remote_p);
                (remote_p, MasterySource::Remote, explanation)
            }
            Err(e) => {
                tracing::warn!(error = %e, concept, "Mastery service unreachable, local BKT is authoritative");
                state.set_mastery(concept, local_new, MasterySource::Local, Some(correct));
                let explanation = bkt::explain(smoothed, before, local_new);
                (local_new, MasterySource::Local, explanation)
            }
        }
    }

    /// Walk the hint stages of the state machine and produce the final,
    /// tone-adjusted hint plus its persistence record.
    async fn produce_hint(
        &self,
        req: &SubmissionRequest,
        analysis: &CodeAnalysisResult,
        state: &mut StudentState,
        smoothed: &CognitiveState,
        p_mastery: f64,
    ) -> (HintRecord, HintView) {
        let path = tutoring::route_path(smoothed, p_mastery);

        let mut stage = TutoringStage::Receive;
        for event in [
            TutoringEvent::SubmissionReceived,
            TutoringEvent::AnalysisComplete,
            path.route_event(),
        ] {
            stage = tutoring::transition(stage, event).unwrap_or(TutoringStage::Deliver);
        }

        let level = tutoring::next_hint_level(
            state.hint_level(&req.problem_id),
            state.failed_attempts(&req.problem_id),
            smoothed.frustration,
        );
        state.hint_levels.insert(req.problem_id.clone(), level);

        let previous_hint = self
            .store
            .last_hint_for(&req.student_id, &req.problem_id)
            .ok()
            .flatten()
            .map(|h| h.hint_text);

        let raw_hint = self
            .generate_hint_text(req, analysis, path, level, previous_hint.as_deref())
            .await;
        let toned = affect::adjust_hint_tone(&raw_hint, affect::tone_for(smoothed));

        let focus = tutoring::teaching_focus(analysis);
        let now = Utc::now();
        state.hint_history.push(
            crate::store::operations::student_states::HintSummary {
                problem_id: req.problem_id.clone(),
                level,
                timestamp: now,
                teaching_focus: focus.clone(),
            },
        );

        let record = HintRecord {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: req.student_id.clone(),
            problem_id: req.problem_id.clone(),
            timestamp: now,
            level,
            path,
            teaching_focus: focus.clone(),
            hint_text: toned.clone(),
        };

        let _ = tutoring::transition(stage, TutoringEvent::HintReady);

        let view = HintView {
            should_intervene: true,
            hint_text: Some(toned),
            hint_level: Some(level),
            hint_path: Some(path),
            teaching_focus: Some(focus),
        };
        (record, view)
    }

    /// LLM hint with the no-code policy filter: one stricter re-request
    /// after a leaked code block, then the deterministic fallback.
    async fn generate_hint_text(
        &self,
        req: &SubmissionRequest,
        analysis: &CodeAnalysisResult,
        path: HintPath,
        level: u8,
        previous_hint: Option<&str>,
    ) -> String {
        let system = prompts::hint_system_prompt(path, level);
        let user =
            prompts::hint_user_prompt(&req.problem_description, &req.code, analysis, previous_hint);

        let first = match self.llm.complete(&system, &user, LlmPurpose::Hint).await {
            Ok(text) => text,
            Err(LlmError::Disabled) => return prompts::fallback_hint(level, analysis),
            Err(e) => {
                tracing::warn!(error = %e, "Hint generation fell back to deterministic hint");
                return prompts::fallback_hint(level, analysis);
            }
        };

        if level > 3 || !prompts::contains_code_fence(&first) {
            return first;
        }

        tracing::warn!(level, "Hint leaked a code block, re-requesting with stricter prompt");
        let strict_system = format!("{system}{}", prompts::STRICT_RETRY_ADDON);
        match self.llm.complete(&strict_system, &user, LlmPurpose::Hint).await {
            Ok(second) if !prompts::contains_code_fence(&second) => second,
            _ => prompts::fallback_hint(level, analysis),
        }
    }

    // ══════════════════════════════════════════════
    // STANDALONE HINT (student asked explicitly)
    // ══════════════════════════════════════════════

    pub async fn request_hint(&self, req: SubmissionRequest) -> Result<SubmissionResponse, AppError> {
        validate_submission(&req)?;

        let analysis = match self.analyzer.analyze(&req.code, &req.language) {
            Ok(analysis) => analysis,
            Err(AnalyzerError::UnsupportedLanguage(lang)) => {
                return Err(AppError::invalid_input(&format!(
                    "unsupported language: {lang}"
                )))
            }
        };

        let lock = acquire_lock(&self.student_locks, &req.student_id).await;
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .get_or_init_student_state(&req.student_id)
            .map_err(|e| AppError::internal(&e.to_string()))?;
        let smoothed = state.smoother.current();

        let concept = req
            .concept
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| analysis.primary_concept().map(|c| c.to_string()))
            .unwrap_or_else(|| "general_programming".to_string());
        let p_mastery = state.mastery_for(&concept, self.config.bkt.p_init);

        // An explicit request always produces a hint when the code parses.
        let (hint_view, emitted) = if analysis.is_valid {
            let (record, view) = self
                .produce_hint(&req, &analysis, &mut state, &smoothed, p_mastery)
                .await;
            (view, Some(record))
        } else {
            (
                HintView {
                    should_intervene: false,
                    hint_text: None,
                    hint_level: None,
                    hint_path: None,
                    teaching_focus: None,
                },
                None,
            )
        };

        state.updated_at = Utc::now();
        if let Some(record) = &emitted {
            if let Err(e) = self.store.record_hint(record) {
                tracing::error!(error = %e, "Failed to persist hint record");
            }
        }
        if let Err(e) = self.store.upsert_student_state(&state) {
            tracing::error!(error = %e, "Failed to persist student state");
        }

        Ok(SubmissionResponse {
            student_id: req.student_id,
            problem_id: req.problem_id,
            analysis: analysis_view(&analysis),
            execution: ExecutionView {
                passed: None,
                status: "unknown".to_string(),
            },
            mastery: MasteryView {
                concept,
                p_mastery,
                source: MasterySource::Local.as_str().to_string(),
            },
            hint: hint_view,
            affect: affect_view(&smoothed, affect::should_intervene(&smoothed)),
        })
    }

    // ══════════════════════════════════════════════
    // AFFECT INGESTION
    // ══════════════════════════════════════════════

    pub async fn ingest_affect(
        &self,
        student_id: &str,
        expressions: ExpressionScores,
    ) -> Result<AffectIngestResponse, AppError> {
        if student_id.trim().is_empty() {
            return Err(AppError::invalid_input("student_id must not be empty"));
        }

        let lock = acquire_lock(&self.student_locks, student_id).await;
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .get_or_init_student_state(student_id)
            .map_err(|e| AppError::internal(&e.to_string()))?;

        let cognitive = affect::expressions_to_cognition(&expressions);
        let smoothed = state.smoother.smooth(cognitive);
        state.affect = smoothed;
        state.updated_at = Utc::now();

        if let Err(e) = self.store.upsert_student_state(&state) {
            tracing::error!(error = %e, "Failed to persist student state");
        }

        Ok(AffectIngestResponse {
            student_id: student_id.to_string(),
            affect: affect_view(&smoothed, affect::should_intervene(&smoothed)),
        })
    }

    // ══════════════════════════════════════════════
    // VIVA SESSION FLOW
    // ══════════════════════════════════════════════

    pub async fn start_viva(
        &self,
        student_id: &str,
        problem_id: &str,
        code: &str,
        language: &str,
        concept: Option<String>,
    ) -> Result<VivaStartResponse, AppError> {
        if student_id.trim().is_empty() || code.trim().is_empty() {
            return Err(AppError::invalid_input(
                "student_id and code must not be empty",
            ));
        }

        let analysis = match self.analyzer.analyze(code, language) {
            Ok(analysis) => analysis,
            Err(AnalyzerError::UnsupportedLanguage(lang)) => {
                return Err(AppError::invalid_input(&format!(
                    "unsupported language: {lang}"
                )))
            }
        };
        if !analysis.is_valid {
            return Err(AppError::invalid_input(
                "code must parse before a viva can start",
            ));
        }

        let questions = self.viva.generate_questions(&analysis, code).await;
        let concept = concept
            .filter(|c| !c.trim().is_empty())
            .or_else(|| analysis.primary_concept().map(|c| c.to_string()))
            .unwrap_or_else(|| "general_programming".to_string());

        let now = Utc::now();
        let session = VivaSessionRecord {
            session_id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            problem_id: problem_id.to_string(),
            code_snapshot: code.to_string(),
            concept,
            concepts: analysis.extracted_concepts.clone(),
            questions,
            turns: Vec::new(),
            status: VivaStatus::Active,
            verdict: None,
            overall_score: None,
            synonyms_version: SYNONYMS_VERSION,
            created_at: now,
            updated_at: now,
        };

        self.store
            .create_viva_session(&session)
            .map_err(|e| AppError::internal(&e.to_string()))?;

        let first = session
            .questions
            .first()
            .ok_or_else(|| AppError::internal("no questions generated"))?;

        Ok(VivaStartResponse {
            session_id: session.session_id.clone(),
            question: first.text.clone(),
            question_index: 0,
            total_questions: session.questions.len(),
        })
    }

    pub async fn answer_viva(
        &self,
        session_id: &str,
        answer_text: &str,
    ) -> Result<VivaAnswerResponse, AppError> {
        if answer_text.trim().is_empty() {
            return Err(AppError::invalid_input("answer_text must not be empty"));
        }

        let lock = acquire_lock(&self.session_locks, session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load_active_session(session_id)?;

        let question = session
            .current_question()
            .cloned()
            .ok_or_else(|| AppError::conflict("VIVA_COMPLETE", "all questions already answered"))?;

        let score = self
            .viva
            .score_answer(&session.concepts, &session.code_snapshot, &question, answer_text)
            .await;

        session.turns.push(VivaTurn {
            question_index: question.index,
            answer_text: answer_text.to_string(),
            llm_score: score.llm_score,
            overlap_score: score.overlap_score,
            combined_score: score.combined_score,
            answered_at: Utc::now(),
        });
        session.updated_at = Utc::now();

        self.store
            .update_viva_session(&session)
            .map_err(|e| AppError::internal(&e.to_string()))?;

        let next_question = session.current_question().map(|q| q.text.clone());
        Ok(VivaAnswerResponse {
            session_id: session_id.to_string(),
            llm_score: score.llm_score,
            overlap_score: score.overlap_score,
            combined_score: score.combined_score,
            remaining_questions: session.remaining_questions(),
            next_question,
        })
    }

    /// Audio variant: transcribe, then score like a text answer. With the
    /// LLM unavailable there is no transcript, so the caller gets a typed
    /// failure rather than a zero score.
    pub async fn answer_viva_audio(
        &self,
        session_id: &str,
        audio: Vec<u8>,
        format: AudioFormat,
    ) -> Result<VivaAnswerResponse, AppError> {
        let transcript = match self.llm.transcribe(audio, format).await {
            Ok(text) => text,
            Err(LlmError::Disabled) | Err(LlmError::Unavailable(_)) => {
                return Err(AppError::bad_request(
                    "TRANSCRIPTION_UNAVAILABLE",
                    "audio transcription is currently unavailable; submit a text answer",
                ))
            }
            Err(LlmError::InvalidResponse(msg)) => {
                return Err(AppError::invalid_input(&format!("unusable audio: {msg}")))
            }
        };
        self.answer_viva(session_id, &transcript).await
    }

    /// Verdict is idempotent: once persisted it is returned as-is. An
    /// INCONCLUSIVE result leaves the session active so the student can
    /// finish answering.
    pub async fn viva_verdict(&self, session_id: &str) -> Result<VivaVerdictResponse, AppError> {
        let lock = acquire_lock(&self.session_locks, session_id).await;
        let _guard = lock.lock().await;

        let mut session = self
            .store
            .get_viva_session(session_id)
            .map_err(|e| AppError::internal(&e.to_string()))?
            .ok_or_else(|| AppError::not_found("SESSION_NOT_FOUND", "no such viva session"))?;

        if let Some(existing) = session.verdict {
            return Ok(VivaVerdictResponse {
                session_id: session_id.to_string(),
                verdict: existing.as_str().to_string(),
                overall_score: session.overall_score,
                questions_answered: session.turns.len(),
            });
        }

        if session.status == VivaStatus::Abandoned {
            return Err(AppError::gone("SESSION_EXPIRED", "viva session expired"));
        }

        let (verdict, overall) = viva::verdict(&session.turns);

        if verdict != VivaVerdict::Inconclusive {
            session.verdict = Some(verdict);
            session.overall_score = overall;
            session.status = VivaStatus::Completed;
            session.updated_at = Utc::now();
            self.store
                .update_viva_session(&session)
                .map_err(|e| AppError::internal(&e.to_string()))?;

            self.apply_viva_bkt(&session, verdict).await;
        }

        Ok(VivaVerdictResponse {
            session_id: session_id.to_string(),
            verdict: verdict.as_str().to_string(),
            overall_score: overall,
            questions_answered: session.turns.len(),
        })
    }

    /// Fold the verdict into the student's mastery. Viva observations are
    /// local-only; the reconcile worker pushes them to the remote service.
    async fn apply_viva_bkt(&self, session: &VivaSessionRecord, verdict: VivaVerdict) {
        let lock = acquire_lock(&self.student_locks, &session.student_id).await;
        let _guard = lock.lock().await;

        let mut state = match self.store.get_or_init_student_state(&session.student_id) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load student state for viva update");
                return;
            }
        };

        let smoothed = state.smoother.current();
        let params = bkt::modulate(BktParams::from_config(&self.config.bkt), &smoothed);
        let before = state.mastery_for(&session.concept, self.config.bkt.p_init);

        let (new_value, observed) = match verdict {
            VivaVerdict::Pass => (bkt::update(before, true, &params), Some(true)),
            VivaVerdict::Fail => (bkt::update(before, false, &params), Some(false)),
            VivaVerdict::Weak => (bkt::half_weight_update(before, &params), None),
            VivaVerdict::Inconclusive => return,
        };

        state.set_mastery(&session.concept, new_value, MasterySource::Local, observed);
        state.updated_at = Utc::now();
        if let Err(e) = self.store.upsert_student_state(&state) {
            tracing::error!(error = %e, "Failed to persist student state after viva");
        }
    }

    // ══════════════════════════════════════════════
    // MASTERY RECONCILIATION (worker entry point)
    // ══════════════════════════════════════════════

    /// Push every dirty local mastery value to the remote service and
    /// adopt the canonical value it returns. Stops early when the service
    /// is still unreachable; the next sweep retries. Returns how many
    /// entries were reconciled.
    pub async fn reconcile_dirty_mastery(&self) -> usize {
        let snapshots = match self.store.list_student_states() {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::error!(error = %e, "Mastery reconcile failed to list student states");
                return 0;
            }
        };

        let mut reconciled = 0usize;
        for snapshot in snapshots {
            if !snapshot.mastery.values().any(|m| m.dirty) {
                continue;
            }

            let lock = acquire_lock(&self.student_locks, &snapshot.student_id).await;
            let _guard = lock.lock().await;

            let mut state = match self.store.get_or_init_student_state(&snapshot.student_id) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping student during reconcile");
                    continue;
                }
            };

            let dirty_concepts: Vec<String> = state
                .mastery
                .iter()
                .filter(|(_, m)| m.dirty)
                .map(|(c, _)| c.clone())
                .collect();

            let mut changed = false;
            for concept in dirty_concepts {
                let updated_at = state
                    .mastery
                    .get(&concept)
                    .map(|m| m.updated_at)
                    .unwrap_or_else(Utc::now);
                match self
                    .mastery
                    .submit(&state.student_id, &concept, None, updated_at)
                    .await
                {
                    Ok(remote_p) => {
                        state.set_mastery(&concept, remote_p, MasterySource::Remote, None);
                        reconciled += 1;
                        changed = true;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Mastery service still unreachable, stopping sweep");
                        if changed {
                            if let Err(e) = self.store.upsert_student_state(&state) {
                                tracing::error!(error = %e, "Failed to persist reconciled state");
                            }
                        }
                        return reconciled;
                    }
                }
            }

            if changed {
                state.updated_at = Utc::now();
                if let Err(e) = self.store.upsert_student_state(&state) {
                    tracing::error!(error = %e, "Failed to persist reconciled state");
                }
            }
        }
        reconciled
    }

    fn load_active_session(&self, session_id: &str) -> Result<VivaSessionRecord, AppError> {
        let mut session = self
            .store
            .get_viva_session(session_id)
            .map_err(|e| AppError::internal(&e.to_string()))?
            .ok_or_else(|| AppError::not_found("SESSION_NOT_FOUND", "no such viva session"))?;

        match session.status {
            VivaStatus::Active => {}
            VivaStatus::Abandoned => {
                return Err(AppError::gone("SESSION_EXPIRED", "viva session expired"))
            }
            VivaStatus::Completed => {
                return Err(AppError::conflict(
                    "SESSION_COMPLETED",
                    "viva session already completed",
                ))
            }
        }

        // Lazy expiry: a stale session is abandoned on touch, not only by
        // the background sweep.
        let timeout = self.config.viva.session_timeout_secs;
        if session.is_expired(timeout, Utc::now()) {
            session.status = VivaStatus::Abandoned;
            session.updated_at = Utc::now();
            if let Err(e) = self.store.update_viva_session(&session) {
                tracing::error!(error = %e, "Failed to persist abandoned viva session");
            }
            return Err(AppError::gone("SESSION_EXPIRED", "viva session expired"));
        }

        Ok(session)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

// ── shared helpers ─────────────────────────────────────────

/// Per-key async lock map with strong-count pruning so idle entries do
/// not accumulate forever.
pub async fn acquire_lock(
    locks: &Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    key: &str,
) -> Arc<Mutex<()>> {
    let mut map = locks.lock().await;

    if map.len() > 1000 {
        map.retain(|_, v| Arc::strong_count(v) > 1);
    }

    map.entry(key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

fn validate_submission(req: &SubmissionRequest) -> Result<(), AppError> {
    if req.student_id.trim().is_empty() {
        return Err(AppError::invalid_input("student_id must not be empty"));
    }
    if req.problem_id.trim().is_empty() {
        return Err(AppError::invalid_input("problem_id must not be empty"));
    }
    if req.code.trim().is_empty() {
        return Err(AppError::invalid_input("code must not be empty"));
    }
    Ok(())
}

fn analysis_view(analysis: &CodeAnalysisResult) -> AnalysisView {
    AnalysisView {
        is_valid: analysis.is_valid,
        algorithm_pattern: analysis.algorithm_pattern.as_str().to_string(),
        issues: analysis.issues.iter().map(|i| i.as_str().to_string()).collect(),
        function_count: analysis.metrics.functions,
        has_recursion: analysis.metrics.has_recursion,
    }
}

fn execution_view(execution: &ExecutionOutcome) -> ExecutionView {
    ExecutionView {
        passed: execution.passed,
        status: execution.status.as_str().to_string(),
    }
}

fn affect_view(state: &CognitiveState, should_intervene: bool) -> AffectView {
    AffectView {
        frustration: state.frustration,
        engagement: state.engagement,
        confusion: state.confusion,
        boredom: state.boredom,
        should_intervene,
    }
}
