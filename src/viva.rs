//! Viva voce engine: generates targeted questions about a submission,
//! scores transcribed answers two ways (LLM judgment + deterministic
//! concept overlap) and aggregates a verdict.
//!
//! The code itself is the ground truth. The LLM only judges style and
//! semantics against the analyzer's findings, and every LLM stage has a
//! deterministic fallback so a viva can complete with the LLM down.

use crate::analyzer::{AlgorithmPattern, CodeAnalysisResult};
use crate::constants::{VIVA_LLM_WEIGHT, VIVA_MIN_ANSWERED, VIVA_OVERLAP_WEIGHT, VIVA_QUESTION_COUNT};
use crate::overlap;
use crate::services::llm::{extract_json, LlmClient, LlmPurpose};
use crate::store::operations::viva_sessions::{
    QuestionFocus, VivaQuestion, VivaTurn, VivaVerdict,
};

const PASS_THRESHOLD: f64 = 0.7;
const WEAK_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct AnswerScore {
    pub llm_score: f64,
    pub overlap_score: f64,
    pub combined_score: f64,
}

#[derive(Debug, Clone)]
pub struct VivaEngine {
    llm: LlmClient,
}

impl VivaEngine {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Generate the session's questions: one edge case, one invariant /
    /// loop-reasoning, one complexity or alternative-approach. LLM first,
    /// deterministic templates when it fails.
    pub async fn generate_questions(
        &self,
        analysis: &CodeAnalysisResult,
        code: &str,
    ) -> Vec<VivaQuestion> {
        let texts = match self.llm_question_texts(analysis, code).await {
            Some(texts) => texts,
            None => fallback_question_texts(analysis),
        };

        let focuses = [
            QuestionFocus::EdgeCase,
            QuestionFocus::Invariant,
            QuestionFocus::Complexity,
        ];

        texts
            .into_iter()
            .take(VIVA_QUESTION_COUNT)
            .enumerate()
            .map(|(index, text)| VivaQuestion {
                index,
                expected_concepts: expected_concepts(analysis, focuses[index]),
                focus: focuses[index],
                text,
            })
            .collect()
    }

    async fn llm_question_texts(
        &self,
        analysis: &CodeAnalysisResult,
        code: &str,
    ) -> Option<Vec<String>> {
        let system = "You are an oral-examination tutor. Generate exactly three short \
                      questions about the student's code as a JSON array of strings. \
                      Question 1 targets a base or edge case, question 2 targets an \
                      invariant or the loop reasoning, question 3 targets complexity or \
                      an alternative approach. Reference the student's actual function \
                      names.";
        let user = format!(
            "CODE:\n{code}\n\nANALYSIS:\n- pattern: {}\n- summary: {}\n- concepts: {}",
            analysis.algorithm_pattern.as_str(),
            analysis.summary,
            analysis.extracted_concepts.join(", "),
        );

        let text = match self.llm.complete(system, &user, LlmPurpose::QuestionGen).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Question generation fell back to templates");
                return None;
            }
        };

        let parsed: Vec<String> = serde_json::from_str(extract_json(&text)).ok()?;
        let usable: Vec<String> = parsed
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if usable.len() < VIVA_QUESTION_COUNT {
            return None;
        }
        Some(usable)
    }

    /// Score one answer. The LLM judges semantic correctness against the
    /// code's analysis; the overlap score is computed deterministically
    /// between the code's concepts and the transcript.
    pub async fn score_answer(
        &self,
        analysis_concepts: &[String],
        code: &str,
        question: &VivaQuestion,
        answer_text: &str,
    ) -> AnswerScore {
        let llm_score = match self.llm_score(code, question, answer_text).await {
            Some(score) => score,
            None => keyword_score(question, answer_text),
        };

        let overlap_score = overlap::overlap_score(
            analysis_concepts.iter().map(|s| s.as_str()),
            overlap::transcript_concepts(answer_text)
                .iter()
                .map(|s| s.as_str()),
        );

        let combined_score =
            (VIVA_LLM_WEIGHT * llm_score + VIVA_OVERLAP_WEIGHT * overlap_score).clamp(0.0, 1.0);

        AnswerScore {
            llm_score,
            overlap_score,
            combined_score,
        }
    }

    async fn llm_score(
        &self,
        code: &str,
        question: &VivaQuestion,
        answer_text: &str,
    ) -> Option<f64> {
        let system = "You are grading whether a student genuinely understands code they \
                      submitted. The code is the ground truth. Respond with a JSON \
                      object: {\"score\": <0.0-1.0>}.";
        let user = format!(
            "CODE (ground truth):\n{code}\n\nQUESTION:\n{}\n\nEXPECTED CONCEPTS:\n{}\n\n\
             STUDENT'S TRANSCRIBED ANSWER:\n\"{answer_text}\"",
            question.text,
            question.expected_concepts.join(", "),
        );

        let text = match self.llm.complete(system, &user, LlmPurpose::AnswerScore).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Answer scoring fell back to keyword match");
                return None;
            }
        };

        let parsed: serde_json::Value = serde_json::from_str(extract_json(&text)).ok()?;
        parsed
            .get("score")
            .and_then(|s| s.as_f64())
            .filter(|s| (0.0..=1.0).contains(s))
    }
}

/// Final verdict over the answered turns. Fewer than two answers is not
/// enough signal to judge either way.
pub fn verdict(turns: &[VivaTurn]) -> (VivaVerdict, Option<f64>) {
    if turns.len() < VIVA_MIN_ANSWERED {
        return (VivaVerdict::Inconclusive, None);
    }
    let overall = turns.iter().map(|t| t.combined_score).sum::<f64>() / turns.len() as f64;
    let verdict = if overall >= PASS_THRESHOLD {
        VivaVerdict::Pass
    } else if overall >= WEAK_THRESHOLD {
        VivaVerdict::Weak
    } else {
        VivaVerdict::Fail
    };
    (verdict, Some(overall))
}

/// Deterministic question templates keyed on the detected structure.
fn fallback_question_texts(analysis: &CodeAnalysisResult) -> Vec<String> {
    let fn_name = analysis
        .function_profiles
        .first()
        .map(|f| f.name.clone())
        .unwrap_or_else(|| "your code".to_string());

    let edge = match analysis.function_profiles.first() {
        Some(profile) if profile.is_recursive && !profile.has_base_case => format!(
            "Your function `{fn_name}` calls itself but never seems to stop. What input should make the recursion stop, and what should it return there?"
        ),
        Some(profile) if profile.is_recursive => format!(
            "What does `{fn_name}` return for the smallest possible input, and why is that the right value?"
        ),
        _ => format!(
            "What does `{fn_name}` do when the input is empty or as small as possible?"
        ),
    };

    let invariant = if analysis.metrics.has_recursion {
        format!(
            "Walk me through how `{fn_name}` reaches its answer on a small example, especially how and why the recursion stops."
        )
    } else if analysis.metrics.loops > 0 {
        format!(
            "Explain the loop inside `{fn_name}`: what does it iterate over, and what stays true at the start of every pass?"
        )
    } else {
        format!("Walk me through the step-by-step execution of `{fn_name}` on a small example.")
    };

    let complexity = match analysis.algorithm_pattern {
        AlgorithmPattern::BruteForce => {
            "Your solution uses nested loops. Can you estimate its time complexity and suggest a faster alternative?".to_string()
        }
        _ => "What is the time complexity of your approach, and could a different approach improve it?".to_string(),
    };

    vec![edge, invariant, complexity]
}

/// Concepts a strong answer to this question should touch.
fn expected_concepts(analysis: &CodeAnalysisResult, focus: QuestionFocus) -> Vec<String> {
    let mut concepts: Vec<String> = match focus {
        QuestionFocus::EdgeCase => {
            let mut c = vec!["edge_case".to_string(), "return_value".to_string()];
            if analysis.metrics.has_recursion {
                c.push("base_case".to_string());
            }
            c
        }
        QuestionFocus::Invariant => {
            let mut c = vec!["invariant".to_string()];
            if analysis.metrics.has_recursion {
                c.push("recursion".to_string());
            }
            if analysis.metrics.loops > 0 {
                c.push("loop".to_string());
            }
            c
        }
        QuestionFocus::Complexity => vec!["time_complexity".to_string()],
    };

    for concept in analysis.extracted_concepts.iter().take(2) {
        if !concepts.contains(concept) {
            concepts.push(concept.clone());
        }
    }
    concepts
}

/// Fallback LLM-score stand-in: fraction of expected concepts the
/// transcript actually mentions (synonym-aware).
fn keyword_score(question: &VivaQuestion, answer_text: &str) -> f64 {
    if question.expected_concepts.is_empty() {
        return 0.0;
    }
    let expected = overlap::expand(question.expected_concepts.iter().map(|s| s.as_str()));
    let claimed = overlap::expand(
        overlap::transcript_concepts(answer_text)
            .iter()
            .map(|s| s.as_str()),
    );
    let matched = expected.intersection(&claimed).count() as f64;
    (matched / expected.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::analyzer::CodeAnalyzer;
    use crate::config::LLMConfig;

    fn disabled_llm() -> LlmClient {
        LlmClient::new(&LLMConfig {
            enabled: false,
            mock: false,
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            transcription_model: String::new(),
            timeout_secs: 1,
        })
    }

    fn analysis_for(code: &str) -> CodeAnalysisResult {
        CodeAnalyzer::new().analyze(code, "python").unwrap()
    }

    fn turn(combined: f64) -> VivaTurn {
        VivaTurn {
            question_index: 0,
            answer_text: String::new(),
            llm_score: combined,
            overlap_score: combined,
            combined_score: combined,
            answered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fallback_questions_cover_all_three_focuses() {
        let engine = VivaEngine::new(disabled_llm());
        let analysis =
            analysis_for("def factorial(n):\n    if n == 0:\n        return 1\n    return n * factorial(n-1)\n");
        let questions = engine.generate_questions(&analysis, "code").await;
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].focus, QuestionFocus::EdgeCase);
        assert_eq!(questions[1].focus, QuestionFocus::Invariant);
        assert_eq!(questions[2].focus, QuestionFocus::Complexity);
        assert!(questions[0].text.contains("factorial"));
    }

    #[tokio::test]
    async fn missing_base_case_shapes_the_edge_question() {
        let engine = VivaEngine::new(disabled_llm());
        let analysis = analysis_for("def loop(n):\n    return loop(n-1)\n");
        let questions = engine.generate_questions(&analysis, "code").await;
        assert!(questions[0].text.contains("never seems to stop"));
        assert!(questions[0].expected_concepts.contains(&"base_case".to_string()));
    }

    #[tokio::test]
    async fn scoring_without_llm_uses_keyword_fallback() {
        let engine = VivaEngine::new(disabled_llm());
        let analysis =
            analysis_for("def factorial(n):\n    if n == 0:\n        return 1\n    return n * factorial(n-1)\n");
        let questions = engine.generate_questions(&analysis, "code").await;

        let good = engine
            .score_answer(
                &analysis.extracted_concepts,
                "code",
                &questions[0],
                "The base case returns one when n is zero, otherwise the recursion keeps going",
            )
            .await;
        let bad = engine
            .score_answer(&analysis.extracted_concepts, "code", &questions[0], "no idea honestly")
            .await;

        assert!(good.combined_score > bad.combined_score);
        assert!((0.0..=1.0).contains(&good.combined_score));
    }

    #[test]
    fn keyword_score_is_synonym_aware() {
        let question = VivaQuestion {
            index: 0,
            text: String::new(),
            focus: QuestionFocus::EdgeCase,
            expected_concepts: vec!["base_case".to_string()],
        };
        let score = keyword_score(&question, "the base case stops it");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn verdict_thresholds() {
        let (v, score) = verdict(&[turn(0.9), turn(0.8), turn(0.75)]);
        assert_eq!(v, VivaVerdict::Pass);
        assert!((score.unwrap() - 0.8166666).abs() < 1e-3);

        let (v, _) = verdict(&[turn(0.5), turn(0.45)]);
        assert_eq!(v, VivaVerdict::Weak);

        let (v, _) = verdict(&[turn(0.1), turn(0.2)]);
        assert_eq!(v, VivaVerdict::Fail);
    }

    #[test]
    fn single_answer_is_inconclusive() {
        let (v, score) = verdict(&[turn(0.95)]);
        assert_eq!(v, VivaVerdict::Inconclusive);
        assert!(score.is_none());
    }
}
