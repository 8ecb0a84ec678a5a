//! Verdict aggregation — folds all signal scores into one assessment.
//!
//! Purely functional stages applied in sequence to one running
//! accumulator seeded at score 50 / confidence 50. Ordering of the
//! independent additive stages does not affect the result; only the
//! decode stage is a true sequencing constraint (handled upstream).

use serde::{Deserialize, Serialize};

use crate::types::{RiskLevel, SignalScore, Verdict};

/// Running assessment state folded through the scoring stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAccumulator {
    score: f64,
    confidence: f64,
    risk_score: f64,
    risk_floor: RiskLevel,
    factors: Vec<String>,
}

impl Default for ScoreAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreAccumulator {
    /// Neutral seed: score 50, confidence 50, no risk.
    pub fn new() -> Self {
        Self {
            score: 50.0,
            confidence: 50.0,
            risk_score: 0.0,
            risk_floor: RiskLevel::Low,
            factors: Vec::new(),
        }
    }

    /// Fold one signal's deltas and factors into the accumulator.
    pub fn apply(&mut self, signal: &SignalScore) {
        self.score += signal.score_delta;
        self.risk_score += signal.risk_delta;
        self.factors.extend(signal.factors.iter().cloned());
    }

    /// Raise the minimum final risk level. Floors never lower it.
    pub fn raise_risk_floor(&mut self, level: RiskLevel) {
        if level > self.risk_floor {
            self.risk_floor = level;
        }
    }

    /// Replace the confidence estimate, keeping the lower of the two.
    /// A low-confidence contributing signal caps the whole assessment.
    pub fn cap_confidence(&mut self, confidence: f64) {
        if confidence < self.confidence {
            self.confidence = confidence;
        }
    }

    /// Clamp, band, and produce the final assessment.
    pub fn finalize(self) -> FinalAssessment {
        let score = self.score.clamp(0.0, 100.0);
        let risk_score = self.risk_score.clamp(0.0, 100.0);
        let risk_level = RiskLevel::from_risk_score(risk_score).max(self.risk_floor);

        FinalAssessment {
            verdict: Verdict::from_score(score),
            score,
            confidence: self.confidence.clamp(0.0, 100.0),
            risk_score,
            risk_level,
            factors: self.factors,
        }
    }
}

/// Terminal output of the aggregation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAssessment {
    pub verdict: Verdict,
    pub score: f64,
    pub confidence: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
}

impl FinalAssessment {
    /// The fixed assessment for an undecodable payload: verdict INVALID,
    /// score 0, confidence 0. An explicit fast path, not an error case.
    pub fn invalid_payload() -> Self {
        Self {
            verdict: Verdict::Invalid,
            score: 0.0,
            confidence: 0.0,
            risk_score: 100.0,
            risk_level: RiskLevel::Critical,
            factors: vec!["QR payload could not be decrypted - INVALID".into()],
        }
    }
}
