//! Affect adapter: maps raw facial-expression probabilities onto the four
//! cognitive dimensions the tutoring pipeline works with, smooths them over
//! a sliding window, and derives intervention / tone decisions.
//!
//! The linear map coefficients are a contract shared with the perception
//! frontend; do not tune them here without versioning the change.

use serde::{Deserialize, Serialize};

use crate::constants::AFFECT_WINDOW_SIZE;

/// Raw expression probabilities as produced by the browser-side face model.
/// All fields default to 0 so partial payloads are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpressionScores {
    #[serde(default)]
    pub happy: f64,
    #[serde(default)]
    pub sad: f64,
    #[serde(default)]
    pub angry: f64,
    #[serde(default)]
    pub fearful: f64,
    #[serde(default)]
    pub surprised: f64,
    #[serde(default)]
    pub neutral: f64,
    #[serde(default)]
    pub disgusted: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitiveState {
    pub frustration: f64,
    pub engagement: f64,
    pub confusion: f64,
    pub boredom: f64,
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Fixed linear map from expressions to cognitive state.
///
///   engagement  = 0.6·happy + 0.4·surprised
///   confusion   = 0.6·surprised + 0.4·sad
///   frustration = 0.5·angry + 0.3·fearful + 0.2·sad
///   boredom     = 0.8·neutral − 0.4·(happy + surprised)
pub fn expressions_to_cognition(e: &ExpressionScores) -> CognitiveState {
    CognitiveState {
        engagement: clamp01(0.6 * e.happy + 0.4 * e.surprised),
        confusion: clamp01(0.6 * e.surprised + 0.4 * e.sad),
        frustration: clamp01(0.5 * e.angry + 0.3 * e.fearful + 0.2 * e.sad),
        boredom: clamp01(0.8 * e.neutral - 0.4 * (e.happy + e.surprised)),
    }
}

/// FIFO moving-average smoother over the last [`AFFECT_WINDOW_SIZE`] samples.
/// Lives inside `StudentState` so it is persisted with the rest of the
/// student record and survives restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CognitiveSmoother {
    #[serde(default)]
    window: Vec<CognitiveState>,
}

impl CognitiveSmoother {
    /// Push a sample and return the arithmetic mean of the window.
    pub fn smooth(&mut self, sample: CognitiveState) -> CognitiveState {
        self.window.push(sample);
        if self.window.len() > AFFECT_WINDOW_SIZE {
            let excess = self.window.len() - AFFECT_WINDOW_SIZE;
            self.window.drain(..excess);
        }
        self.mean()
    }

    /// Current smoothed state without adding a sample. Empty window yields
    /// a neutral default (mid engagement, everything else zero).
    pub fn current(&self) -> CognitiveState {
        if self.window.is_empty() {
            return CognitiveState {
                engagement: 0.5,
                ..CognitiveState::default()
            };
        }
        self.mean()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    fn mean(&self) -> CognitiveState {
        let n = self.window.len().max(1) as f64;
        let mut acc = CognitiveState::default();
        for s in &self.window {
            acc.frustration += s.frustration;
            acc.engagement += s.engagement;
            acc.confusion += s.confusion;
            acc.boredom += s.boredom;
        }
        CognitiveState {
            frustration: acc.frustration / n,
            engagement: acc.engagement / n,
            confusion: acc.confusion / n,
            boredom: acc.boredom / n,
        }
    }
}

/// Intervene when the student is visibly struggling or checked out:
/// frustration > 0.7, or boredom > 0.6, or confused while disengaged.
pub fn should_intervene(state: &CognitiveState) -> bool {
    state.frustration > 0.7
        || state.boredom > 0.6
        || (state.confusion > 0.6 && state.engagement < 0.3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintTone {
    Gentle,
    Neutral,
    Challenge,
}

pub fn tone_for(state: &CognitiveState) -> HintTone {
    if state.frustration > 0.7 {
        HintTone::Gentle
    } else if state.boredom > 0.6 {
        HintTone::Challenge
    } else {
        HintTone::Neutral
    }
}

/// Wrap a generated hint with a tone-appropriate prefix and softening.
/// Neutral hints pass through untouched.
pub fn adjust_hint_tone(hint: &str, tone: HintTone) -> String {
    match tone {
        HintTone::Gentle => format!(
            "I can see this one is tough — take a breath.\n\n{hint}\n\nStruggling is part of learning; you are closer than you think."
        ),
        HintTone::Challenge => format!(
            "Ready for a harder angle?\n\n{hint}\n\nTry approaching it from a direction you haven't considered yet."
        ),
        HintTone::Neutral => hint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_expressions_map_to_zero_state() {
        let state = expressions_to_cognition(&ExpressionScores::default());
        assert_eq!(state.engagement, 0.0);
        assert_eq!(state.confusion, 0.0);
        assert_eq!(state.frustration, 0.0);
        assert_eq!(state.boredom, 0.0);
    }

    #[test]
    fn angry_face_drives_frustration() {
        let state = expressions_to_cognition(&ExpressionScores {
            angry: 0.9,
            ..Default::default()
        });
        assert!((state.frustration - 0.45).abs() < 1e-9);
        assert_eq!(state.engagement, 0.0);
    }

    #[test]
    fn boredom_is_suppressed_by_positive_expressions() {
        let state = expressions_to_cognition(&ExpressionScores {
            neutral: 1.0,
            happy: 1.0,
            surprised: 1.0,
            ..Default::default()
        });
        // 0.8 - 0.4 * 2.0 clamps at zero
        assert_eq!(state.boredom, 0.0);
    }

    #[test]
    fn outputs_are_clamped_to_unit_interval() {
        let state = expressions_to_cognition(&ExpressionScores {
            happy: 2.0,
            surprised: 2.0,
            angry: 3.0,
            ..Default::default()
        });
        assert!(state.engagement <= 1.0);
        assert!(state.frustration <= 1.0);
    }

    #[test]
    fn smoother_converges_on_constant_stream_within_one_window() {
        let mut smoother = CognitiveSmoother::default();
        let sample = CognitiveState {
            frustration: 0.4,
            engagement: 0.6,
            confusion: 0.2,
            boredom: 0.1,
        };
        let mut last = CognitiveState::default();
        for _ in 0..AFFECT_WINDOW_SIZE {
            last = smoother.smooth(sample);
        }
        assert!((last.frustration - 0.4).abs() < 1e-9);
        assert!((last.engagement - 0.6).abs() < 1e-9);
    }

    #[test]
    fn smoother_window_is_bounded() {
        let mut smoother = CognitiveSmoother::default();
        for i in 0..(AFFECT_WINDOW_SIZE * 3) {
            smoother.smooth(CognitiveState {
                frustration: (i % 2) as f64,
                ..Default::default()
            });
        }
        assert_eq!(smoother.sample_count(), AFFECT_WINDOW_SIZE);
    }

    #[test]
    fn empty_smoother_reports_neutral_default() {
        let smoother = CognitiveSmoother::default();
        let state = smoother.current();
        assert_eq!(state.engagement, 0.5);
        assert_eq!(state.frustration, 0.0);
    }

    #[test]
    fn intervene_predicate_matches_contract() {
        assert!(should_intervene(&CognitiveState {
            frustration: 0.8,
            ..Default::default()
        }));
        assert!(should_intervene(&CognitiveState {
            boredom: 0.7,
            ..Default::default()
        }));
        assert!(should_intervene(&CognitiveState {
            confusion: 0.7,
            engagement: 0.2,
            ..Default::default()
        }));
        assert!(!should_intervene(&CognitiveState {
            confusion: 0.7,
            engagement: 0.5,
            ..Default::default()
        }));
    }

    #[test]
    fn tone_selection_and_adjustment() {
        let frustrated = CognitiveState {
            frustration: 0.9,
            ..Default::default()
        };
        assert_eq!(tone_for(&frustrated), HintTone::Gentle);
        let adjusted = adjust_hint_tone("What does your loop do?", HintTone::Gentle);
        assert!(adjusted.contains("What does your loop do?"));
        assert!(adjusted.len() > "What does your loop do?".len());

        let neutral = adjust_hint_tone("hint", HintTone::Neutral);
        assert_eq!(neutral, "hint");
    }
}
