//! Tutoring state machine: routes a submission through
//! receive → analyze → assess → {gentle | socratic | challenge} → deliver.
//!
//! The workflow is an explicit transition table rather than a chain of
//! callbacks so every path is statically enumerable and testable. Hint
//! escalation is a per-(student, problem) level register: it advances on
//! each intervening hint and resets when a submission passes execution.

pub mod prompts;

use serde::{Deserialize, Serialize};

use crate::affect::CognitiveState;
use crate::analyzer::CodeAnalysisResult;
use crate::constants::{DIRECT_HINT_MIN_ATTEMPTS, MAX_HINT_LEVEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutoringStage {
    Receive,
    Analyze,
    Assess,
    GentleHint,
    SocraticHint,
    ChallengeHint,
    Deliver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TutoringEvent {
    SubmissionReceived,
    AnalysisComplete,
    RouteGentle,
    RouteSocratic,
    RouteChallenge,
    SkipHint,
    HintReady,
}

/// The full edge set of the workflow. Anything not listed is an illegal
/// transition.
pub const TRANSITIONS: &[(TutoringStage, TutoringEvent, TutoringStage)] = &[
    (TutoringStage::Receive, TutoringEvent::SubmissionReceived, TutoringStage::Analyze),
    (TutoringStage::Analyze, TutoringEvent::AnalysisComplete, TutoringStage::Assess),
    (TutoringStage::Assess, TutoringEvent::RouteGentle, TutoringStage::GentleHint),
    (TutoringStage::Assess, TutoringEvent::RouteSocratic, TutoringStage::SocraticHint),
    (TutoringStage::Assess, TutoringEvent::RouteChallenge, TutoringStage::ChallengeHint),
    (TutoringStage::Assess, TutoringEvent::SkipHint, TutoringStage::Deliver),
    (TutoringStage::GentleHint, TutoringEvent::HintReady, TutoringStage::Deliver),
    (TutoringStage::SocraticHint, TutoringEvent::HintReady, TutoringStage::Deliver),
    (TutoringStage::ChallengeHint, TutoringEvent::HintReady, TutoringStage::Deliver),
];

pub fn transition(stage: TutoringStage, event: TutoringEvent) -> Option<TutoringStage> {
    TRANSITIONS
        .iter()
        .find(|(from, on, _)| *from == stage && *on == event)
        .map(|(_, _, to)| *to)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintPath {
    Gentle,
    Socratic,
    Challenge,
}

impl HintPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gentle => "gentle",
            Self::Socratic => "socratic",
            Self::Challenge => "challenge",
        }
    }

    pub fn route_event(&self) -> TutoringEvent {
        match self {
            Self::Gentle => TutoringEvent::RouteGentle,
            Self::Socratic => TutoringEvent::RouteSocratic,
            Self::Challenge => TutoringEvent::RouteChallenge,
        }
    }
}

/// Conditional routing at the assess stage.
pub fn route_path(affect: &CognitiveState, p_mastery: f64) -> HintPath {
    if affect.frustration > 0.7 {
        return HintPath::Gentle;
    }
    if affect.boredom > 0.6 && p_mastery > 0.7 {
        return HintPath::Challenge;
    }
    HintPath::Socratic
}

/// Advance the level register. Level 4 (a direct pointer) is only
/// reachable after three failed attempts on the same problem while the
/// student is measurably frustrated; otherwise escalation caps at 3.
pub fn next_hint_level(current: u8, failed_attempts: u32, frustration: f64) -> u8 {
    let next = current.saturating_add(1).clamp(1, MAX_HINT_LEVEL);
    if next >= MAX_HINT_LEVEL
        && !(failed_attempts >= DIRECT_HINT_MIN_ATTEMPTS && frustration > 0.5)
    {
        return MAX_HINT_LEVEL - 1;
    }
    next
}

/// What the hint should teach: the first detected issue, else the pattern.
pub fn teaching_focus(analysis: &CodeAnalysisResult) -> String {
    analysis
        .issues
        .first()
        .map(|i| i.as_str().to_string())
        .unwrap_or_else(|| analysis.algorithm_pattern.as_str().to_string())
}
