//! Fraud risk estimation from pre-aggregated supplier/product features.
//!
//! A pure function over a [`FraudRiskFeatures`] snapshot, independent of
//! the current scan: weighted threshold contributions from suspicious
//! rate, supplier reputation, fraud incident history, location diversity,
//! verification velocity, and multi-user patterns. Partial feature data
//! lowers the confidence of the estimate rather than producing no
//! estimate at all.

use serde::{Deserialize, Serialize};

use crate::types::{FraudRiskFeatures, RiskLevel, SignalScore};

// Threshold contributions. Incident history has the steepest curve.
pub const SUSPICIOUS_RATE_HIGH: f64 = 25.0;
pub const SUSPICIOUS_RATE_ELEVATED: f64 = 10.0;
pub const REPUTATION_POOR: f64 = 20.0;
pub const REPUTATION_WEAK: f64 = 10.0;
pub const INCIDENTS_SEVERE: f64 = 30.0;
pub const INCIDENTS_REPEATED: f64 = 20.0;
pub const INCIDENTS_ANY: f64 = 10.0;
pub const LOCATION_SPREAD: f64 = 10.0;
pub const VELOCITY_SURGE: f64 = 15.0;
pub const MULTI_USER_PATTERN: f64 = 10.0;

/// Fraction of the fraud risk score subtracted from the aggregate
/// verification score when the risk level is high or critical.
const SCORE_PENALTY_FACTOR: f64 = 0.3;

/// Confidence floor when no optional features are supplied.
const CONFIDENCE_BASE: f64 = 40.0;
/// Confidence span earned by full feature coverage.
const CONFIDENCE_SPAN: f64 = 60.0;

/// Result of fraud risk estimation for one supplier/product snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRiskEstimate {
    /// Weighted risk score in `[0, 100]`.
    pub risk_score: f64,
    /// Risk level bucketed at 25/50/75.
    pub risk_level: RiskLevel,
    /// Estimate confidence in `[0, 100]`, scaled by feature coverage.
    pub confidence: f64,
    /// One factor string per triggered contribution.
    pub factors: Vec<String>,
}

impl FraudRiskEstimate {
    /// The aggregation-facing contribution: high or critical fraud risk
    /// drags the verification score down by a fraction of the risk score;
    /// lower levels only surface their factors.
    pub fn as_signal(&self) -> SignalScore {
        let score_delta = if self.risk_level >= RiskLevel::High {
            -(self.risk_score * SCORE_PENALTY_FACTOR)
        } else {
            0.0
        };
        SignalScore {
            score_delta,
            risk_delta: 0.0,
            factors: self.factors.clone(),
        }
    }

    /// Minimum final risk level implied by this estimate. Fraud risk can
    /// only raise the final level, never lower it.
    pub fn risk_floor(&self) -> RiskLevel {
        if self.risk_level >= RiskLevel::High {
            self.risk_level
        } else {
            RiskLevel::Low
        }
    }
}

/// Estimate fraud risk from an aggregate feature snapshot.
pub fn estimate(features: &FraudRiskFeatures) -> FraudRiskEstimate {
    let mut risk_score = 0.0;
    let mut factors = Vec::new();

    if let Some(rate) = features.suspicious_rate {
        if rate > 0.3 {
            risk_score += SUSPICIOUS_RATE_HIGH;
            factors.push(format!(
                "Suspicious verification rate {:.0}% - HIGH RISK",
                rate * 100.0
            ));
        } else if rate > 0.1 {
            risk_score += SUSPICIOUS_RATE_ELEVATED;
            factors.push(format!(
                "Elevated suspicious verification rate {:.0}% - MEDIUM RISK",
                rate * 100.0
            ));
        }
    }

    if let Some(reputation) = features.supplier_reputation {
        if reputation < 0.3 {
            risk_score += REPUTATION_POOR;
            factors.push("Supplier reputation is poor - HIGH RISK".into());
        } else if reputation < 0.6 {
            risk_score += REPUTATION_WEAK;
            factors.push("Supplier reputation is below average - MEDIUM RISK".into());
        }
    }

    if let Some(incidents) = features.fraud_incidents {
        if incidents > 10 {
            risk_score += INCIDENTS_SEVERE;
            factors.push(format!(
                "{incidents} confirmed fraud incidents on record - HIGH RISK"
            ));
        } else if incidents > 5 {
            risk_score += INCIDENTS_REPEATED;
            factors.push(format!(
                "{incidents} fraud incidents on record - MEDIUM RISK"
            ));
        } else if incidents > 0 {
            risk_score += INCIDENTS_ANY;
            factors.push(format!("{incidents} fraud incident(s) on record - LOW RISK"));
        }
    }

    if let Some(diversity) = features.location_diversity {
        if diversity > 10 {
            risk_score += LOCATION_SPREAD;
            factors.push(format!(
                "Product verified from {diversity} distinct locations - LOW RISK"
            ));
        }
    }

    if let Some(velocity) = features.verification_velocity_7d {
        if velocity > 100 {
            risk_score += VELOCITY_SURGE;
            factors.push(format!(
                "Verification velocity surge: {velocity} scans in 7 days - MEDIUM RISK"
            ));
        }
    }

    if features.multi_user_same_product == Some(true) {
        risk_score += MULTI_USER_PATTERN;
        factors.push("Multiple distinct users verified the same unit - LOW RISK".into());
    }

    let risk_score = risk_score.clamp(0.0, 100.0);
    let coverage = features.supplied() as f64 / FraudRiskFeatures::FEATURE_COUNT as f64;

    FraudRiskEstimate {
        risk_score,
        risk_level: RiskLevel::from_risk_score(risk_score),
        confidence: CONFIDENCE_BASE + CONFIDENCE_SPAN * coverage,
        factors,
    }
}
