//! Bayesian Knowledge Tracing: a four-parameter hidden-state model of
//! per-concept mastery, modulated by the student's affective state.
//!
//! The update is pure; persistence belongs to the caller. The affect
//! multipliers are a contract shared with the remote mastery service and
//! are versioned so historical records stay interpretable.

use serde::{Deserialize, Serialize};

use crate::affect::CognitiveState;
use crate::config::BktConfig;
use crate::constants::{BKT_PARAM_MAX, BKT_PARAM_MIN, P_MASTERY_MAX, P_MASTERY_MIN};

/// Bump when the modulation coefficients below change.
pub const BKT_MODULATION_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BktParams {
    pub p_learn: f64,
    pub p_slip: f64,
    pub p_guess: f64,
}

impl BktParams {
    pub fn from_config(cfg: &BktConfig) -> Self {
        Self {
            p_learn: cfg.p_learn,
            p_slip: cfg.p_slip,
            p_guess: cfg.p_guess,
        }
    }

    fn clamped(self) -> Self {
        Self {
            p_learn: self.p_learn.clamp(BKT_PARAM_MIN, BKT_PARAM_MAX),
            p_slip: self.p_slip.clamp(BKT_PARAM_MIN, BKT_PARAM_MAX),
            p_guess: self.p_guess.clamp(BKT_PARAM_MIN, BKT_PARAM_MAX),
        }
    }
}

/// Scale the working parameters by the student's affective state:
///
///   p_learn ← p_learn·(1 + 0.5·engagement)·(1 − 0.6·frustration)·(1 − 0.4·boredom)
///   p_slip  ← p_slip ·(1 + 0.7·confusion)
///   p_guess ← p_guess·(1 + 0.5·boredom)
pub fn modulate(params: BktParams, affect: &CognitiveState) -> BktParams {
    BktParams {
        p_learn: params.p_learn
            * (1.0 + 0.5 * affect.engagement)
            * (1.0 - 0.6 * affect.frustration)
            * (1.0 - 0.4 * affect.boredom),
        p_slip: params.p_slip * (1.0 + 0.7 * affect.confusion),
        p_guess: params.p_guess * (1.0 + 0.5 * affect.boredom),
    }
    .clamped()
}

/// One BKT step: Bayesian posterior on the observation, then the learning
/// transition. Result is clamped to the persisted probability range.
pub fn update(p_mastery: f64, correct: bool, params: &BktParams) -> f64 {
    let p = p_mastery;
    let (numerator, denominator) = if correct {
        let n = p * (1.0 - params.p_slip);
        (n, n + (1.0 - p) * params.p_guess)
    } else {
        let n = p * params.p_slip;
        (n, n + (1.0 - p) * (1.0 - params.p_guess))
    };

    let posterior = if denominator == 0.0 {
        p
    } else {
        numerator / denominator
    };

    let p_new = posterior + (1.0 - posterior) * params.p_learn;
    p_new.clamp(P_MASTERY_MIN, P_MASTERY_MAX)
}

/// Half-weighted positive observation, used for WEAK viva verdicts:
/// interpolates halfway between the current value and a full `correct=true`
/// update.
pub fn half_weight_update(p_mastery: f64, params: &BktParams) -> f64 {
    let full = update(p_mastery, true, params);
    (p_mastery + 0.5 * (full - p_mastery)).clamp(P_MASTERY_MIN, P_MASTERY_MAX)
}

/// Human-readable account of one update, surfaced on submission records.
pub fn explain(affect: &CognitiveState, old: f64, new: f64) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if affect.frustration > 0.5 {
        parts.push("learning rate reduced by high frustration");
    }
    if affect.engagement > 0.5 {
        parts.push("learning rate boosted by strong engagement");
    }
    if affect.confusion > 0.4 {
        parts.push("slip probability raised by observed confusion");
    }
    if affect.boredom > 0.5 {
        parts.push("guess probability raised by signs of boredom");
    }

    let delta = new - old;
    let trend = if delta > 0.05 {
        "mastery improved significantly"
    } else if delta > 0.0 {
        "mastery improved gradually"
    } else {
        "no mastery improvement this attempt"
    };
    parts.push(trend);
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_params() -> BktParams {
        BktParams {
            p_learn: 0.1,
            p_slip: 0.1,
            p_guess: 0.2,
        }
    }

    #[test]
    fn correct_observation_never_decreases_mastery() {
        let params = default_params();
        for p in [0.05, 0.1, 0.3, 0.5, 0.8, 0.95] {
            let new = update(p, true, &params);
            assert!(new >= p, "p={p} new={new}");
        }
    }

    #[test]
    fn incorrect_observation_decreases_established_mastery() {
        let params = default_params();
        for p in [0.2, 0.4, 0.6, 0.9] {
            let new = update(p, false, &params);
            assert!(new <= p, "p={p} new={new}");
        }
    }

    #[test]
    fn update_stays_in_clamped_range() {
        let params = default_params();
        for p in [0.0, 0.01, 0.99, 1.0] {
            for correct in [true, false] {
                let new = update(p, correct, &params);
                assert!((0.01..=0.99).contains(&new));
            }
        }
    }

    #[test]
    fn engagement_raises_learn_rate() {
        let engaged = CognitiveState {
            engagement: 1.0,
            ..Default::default()
        };
        let m = modulate(default_params(), &engaged);
        assert!((m.p_learn - 0.15).abs() < 1e-9);
    }

    #[test]
    fn frustration_and_boredom_suppress_learn_rate() {
        let affect = CognitiveState {
            frustration: 1.0,
            boredom: 1.0,
            ..Default::default()
        };
        let m = modulate(default_params(), &affect);
        assert!((m.p_learn - 0.1 * 0.4 * 0.6).abs() < 1e-9);
        assert!((m.p_guess - 0.3).abs() < 1e-9);
    }

    #[test]
    fn modulated_params_are_clamped() {
        let affect = CognitiveState {
            confusion: 1.0,
            boredom: 1.0,
            ..Default::default()
        };
        let high = BktParams {
            p_learn: 0.9,
            p_slip: 0.9,
            p_guess: 0.9,
        };
        let m = modulate(high, &affect);
        assert!(m.p_slip <= 0.9);
        assert!(m.p_guess <= 0.9);
        assert!(m.p_learn >= 0.01);
    }

    #[test]
    fn half_weight_lands_between_current_and_full_update() {
        let params = default_params();
        let p = 0.3;
        let full = update(p, true, &params);
        let half = half_weight_update(p, &params);
        assert!(half > p && half < full);
        assert!((half - (p + 0.5 * (full - p))).abs() < 1e-12);
    }

    #[test]
    fn explanation_mentions_driving_factors() {
        let affect = CognitiveState {
            frustration: 0.8,
            confusion: 0.5,
            ..Default::default()
        };
        let text = explain(&affect, 0.3, 0.28);
        assert!(text.contains("frustration"));
        assert!(text.contains("confusion"));
        assert!(text.contains("no mastery improvement"));
    }
}
