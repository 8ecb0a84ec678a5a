//! QR usage anomaly detection over a product's recent scan history.
//!
//! Inspects the bounded, newest-first scan window for suspicious usage
//! patterns: burst frequency, location and verifier diversity out of
//! proportion to the history size, and payload structure drift that
//! suggests a cloned or re-wrapped code. Each sub-check is independently
//! thresholded and summed into a capped anomaly score.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{RiskLevel, ScanRecord, SignalScore};

// Sub-check weights, summed into the anomaly score (capped at 100).
// Payload drift carries the highest weight; burst frequency the largest
// of the usage-pattern checks.
pub const FREQUENCY_WEIGHT: f64 = 40.0;
pub const LOCATION_DIVERSITY_WEIGHT: f64 = 25.0;
pub const VERIFIER_DIVERSITY_WEIGHT: f64 = 20.0;
pub const VERIFIER_VELOCITY_WEIGHT: f64 = 15.0;
pub const PAYLOAD_DRIFT_WEIGHT: f64 = 45.0;

/// Scans within the trailing hour above which frequency is anomalous.
const HOURLY_SCAN_LIMIT: usize = 10;
/// Scans within the trailing day above which frequency is anomalous.
const DAILY_SCAN_LIMIT: usize = 50;
/// Distinct non-empty locations above which diversity is anomalous...
const LOCATION_LIMIT: usize = 5;
/// ...provided total history is still below this size.
const LOCATION_HISTORY_CEILING: usize = 10;
/// Distinct verifier ids above which diversity is anomalous...
const VERIFIER_LIMIT: usize = 3;
/// ...provided total history is still below this size.
const VERIFIER_HISTORY_CEILING: usize = 15;
/// Scans by the current verifier in the trailing hour above which the
/// verifier itself is flagged.
const VERIFIER_HOURLY_LIMIT: usize = 5;

/// Anomaly score above which the scan is classified anomalous.
const ANOMALOUS_THRESHOLD: f64 = 40.0;

/// Fraction of the anomaly score subtracted from the running
/// genuineness score during aggregation.
const SCORE_PENALTY_FACTOR: f64 = 0.5;

/// Context of the scan currently being verified.
#[derive(Debug, Clone)]
pub struct ScanContext<'a> {
    /// Evaluation instant; passed in for determinism under test.
    pub now: DateTime<Utc>,
    /// Reported location of the current scan, if any.
    pub location: Option<&'a str>,
    /// Identity of the current verifier.
    pub verifier_id: &'a str,
    /// Size class of the presented encrypted payload.
    pub payload_class: u32,
    /// Scans by this verifier across all products in the trailing hour,
    /// as reported by the history store. Zero when unavailable.
    pub verifier_hour_count: usize,
}

/// Result of anomaly detection for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    /// Whether the scan pattern is classified anomalous.
    pub is_anomalous: bool,
    /// Summed sub-check weights, capped at 100.
    pub anomaly_score: f64,
    /// One factor string per triggered sub-check.
    pub anomalies: Vec<String>,
}

impl AnomalyAssessment {
    /// The aggregation-facing contribution of this assessment: the
    /// genuineness score drops by half the anomaly score.
    pub fn as_signal(&self) -> SignalScore {
        SignalScore {
            score_delta: -(self.anomaly_score * SCORE_PENALTY_FACTOR),
            risk_delta: 0.0,
            factors: self.anomalies.clone(),
        }
    }

    /// Minimum risk level implied by the anomaly score. Thresholds are
    /// exclusive, matching the `> 40` anomalous cutoff: a score must
    /// exceed 20/40/60 to floor at medium/high/critical.
    pub fn risk_floor(&self) -> RiskLevel {
        if self.anomaly_score > 60.0 {
            RiskLevel::Critical
        } else if self.anomaly_score > 40.0 {
            RiskLevel::High
        } else if self.anomaly_score > 20.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Detects anomalous usage patterns in a product's scan history.
///
/// The history slice must be ordered newest-first and bounded by the
/// configured window; an empty history yields no anomalies by
/// construction.
#[derive(Debug, Default)]
pub struct UsageAnomalyDetector;

impl UsageAnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    /// Run all sub-checks against the history window.
    pub fn detect(&self, history: &[ScanRecord], ctx: &ScanContext<'_>) -> AnomalyAssessment {
        let mut score = 0.0;
        let mut anomalies = Vec::new();

        for check in [
            self.check_frequency(history, ctx),
            self.check_location_diversity(history, ctx),
            self.check_verifier_diversity(history, ctx),
            self.check_verifier_velocity(ctx),
            self.check_payload_drift(history, ctx),
        ]
        .into_iter()
        .flatten()
        {
            score += check.weight;
            anomalies.push(check.factor);
        }

        let anomaly_score = score.min(100.0);
        AnomalyAssessment {
            is_anomalous: anomaly_score > ANOMALOUS_THRESHOLD,
            anomaly_score,
            anomalies,
        }
    }

    /// Burst frequency: too many scans in the trailing hour or day.
    fn check_frequency(&self, history: &[ScanRecord], ctx: &ScanContext<'_>) -> Option<CheckHit> {
        let hour_ago = ctx.now - Duration::hours(1);
        let day_ago = ctx.now - Duration::days(1);

        let last_hour = history.iter().filter(|s| s.timestamp > hour_ago).count();
        let last_day = history.iter().filter(|s| s.timestamp > day_ago).count();

        if last_hour > HOURLY_SCAN_LIMIT {
            return Some(CheckHit {
                weight: FREQUENCY_WEIGHT,
                factor: format!(
                    "Scan frequency anomaly: {last_hour} scans in the last hour - HIGH RISK"
                ),
            });
        }
        if last_day > DAILY_SCAN_LIMIT {
            return Some(CheckHit {
                weight: FREQUENCY_WEIGHT,
                factor: format!(
                    "Scan frequency anomaly: {last_day} scans in the last day - HIGH RISK"
                ),
            });
        }
        None
    }

    /// Too many distinct places for such a short history.
    fn check_location_diversity(
        &self,
        history: &[ScanRecord],
        ctx: &ScanContext<'_>,
    ) -> Option<CheckHit> {
        if history.len() >= LOCATION_HISTORY_CEILING {
            return None;
        }
        let mut locations: HashSet<&str> = history
            .iter()
            .filter_map(|s| s.location.as_deref())
            .filter(|l| !l.is_empty())
            .collect();
        if let Some(current) = ctx.location.filter(|l| !l.is_empty()) {
            locations.insert(current);
        }
        (locations.len() > LOCATION_LIMIT).then(|| CheckHit {
            weight: LOCATION_DIVERSITY_WEIGHT,
            factor: format!(
                "Location diversity anomaly: {} distinct locations across {} scans - MEDIUM RISK",
                locations.len(),
                history.len()
            ),
        })
    }

    /// Too many distinct verifiers for such a short history.
    fn check_verifier_diversity(
        &self,
        history: &[ScanRecord],
        ctx: &ScanContext<'_>,
    ) -> Option<CheckHit> {
        if history.len() >= VERIFIER_HISTORY_CEILING {
            return None;
        }
        let mut verifiers: HashSet<&str> =
            history.iter().map(|s| s.verifier_id.as_str()).collect();
        verifiers.insert(ctx.verifier_id);
        (verifiers.len() > VERIFIER_LIMIT).then(|| CheckHit {
            weight: VERIFIER_DIVERSITY_WEIGHT,
            factor: format!(
                "Verifier diversity anomaly: {} distinct verifiers across {} scans - MEDIUM RISK",
                verifiers.len(),
                history.len()
            ),
        })
    }

    /// The current verifier is scanning too much, across any product.
    fn check_verifier_velocity(&self, ctx: &ScanContext<'_>) -> Option<CheckHit> {
        (ctx.verifier_hour_count > VERIFIER_HOURLY_LIMIT).then(|| CheckHit {
            weight: VERIFIER_VELOCITY_WEIGHT,
            factor: format!(
                "Verifier velocity anomaly: {} scans by this verifier in the last hour - MEDIUM RISK",
                ctx.verifier_hour_count
            ),
        })
    }

    /// The presented payload's size class differs from prior scans of the
    /// same product, a marker of cloning or tampering.
    fn check_payload_drift(
        &self,
        history: &[ScanRecord],
        ctx: &ScanContext<'_>,
    ) -> Option<CheckHit> {
        let previous = history.first()?;
        (previous.payload_class != ctx.payload_class).then(|| CheckHit {
            weight: PAYLOAD_DRIFT_WEIGHT,
            factor: "Payload structure differs from prior scans of this product - HIGH RISK"
                .into(),
        })
    }
}

struct CheckHit {
    weight: f64,
    factor: String,
}
