//! Supplier-level alerting over the stream of verification events.
//!
//! The verdict aggregator publishes one [`VerificationEvent`] per
//! completed scan on a broadcast channel; this module consumes them
//! off the latency-sensitive scan path, maintains rolling per-supplier
//! statistics, and turns sustained high-risk patterns into alerts.
//! Enforcement is a recommendation on the alert, never performed here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AlertingConfig;
use crate::types::{RiskLevel, Verdict};

/// Event published after every completed verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEvent {
    pub scan_id: Uuid,
    pub product_id: String,
    pub org_id: String,
    pub manufacturer_id: String,
    pub verdict: Verdict,
    pub risk_level: RiskLevel,
    pub ai_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Recommended response to a supplier alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    /// Keep watching; no intervention yet.
    Monitor,
    /// Route the supplier to manual review.
    RequireReview,
    /// Recommend suspending the supplier's registrations.
    RecommendSuspension,
}

/// Alert raised when a supplier's verification pattern crosses the
/// configured thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierAlert {
    pub manufacturer_id: String,
    pub severity: RiskLevel,
    pub action: EnforcementAction,
    /// Fraction of observed verifications flagged suspicious or worse.
    pub flagged_rate: f64,
    /// Verifications observed for this supplier.
    pub sample: usize,
    pub created_at: DateTime<Utc>,
}

/// Rolling statistics for one supplier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierStats {
    pub verifications: usize,
    /// Verdicts of SUSPICIOUS, FAKE, or INVALID.
    pub flagged: usize,
    pub score_sum: f64,
}

impl SupplierStats {
    pub fn flagged_rate(&self) -> f64 {
        if self.verifications == 0 {
            0.0
        } else {
            self.flagged as f64 / self.verifications as f64
        }
    }

    pub fn mean_score(&self) -> f64 {
        if self.verifications == 0 {
            0.0
        } else {
            self.score_sum / self.verifications as f64
        }
    }
}

/// Aggregates verification events per supplier and raises alerts.
pub struct SupplierWatch {
    config: AlertingConfig,
    stats: HashMap<String, SupplierStats>,
}

impl SupplierWatch {
    pub fn new(config: AlertingConfig) -> Self {
        Self {
            config,
            stats: HashMap::new(),
        }
    }

    /// Fold one event into the supplier's stats and re-evaluate the
    /// alert condition.
    pub fn observe(&mut self, event: &VerificationEvent) -> Option<SupplierAlert> {
        let stats = self
            .stats
            .entry(event.manufacturer_id.clone())
            .or_default();
        stats.verifications += 1;
        stats.score_sum += event.ai_score;
        if matches!(
            event.verdict,
            Verdict::Suspicious | Verdict::Fake | Verdict::Invalid
        ) {
            stats.flagged += 1;
        }

        self.evaluate(&event.manufacturer_id)
    }

    /// Check whether a supplier currently meets the alert condition.
    pub fn evaluate(&self, manufacturer_id: &str) -> Option<SupplierAlert> {
        let stats = self.stats.get(manufacturer_id)?;
        if stats.verifications < self.config.min_sample {
            return None;
        }
        let rate = stats.flagged_rate();
        if rate < self.config.suspicious_rate_threshold {
            return None;
        }

        // Double the threshold escalates from review to suspension.
        let (severity, action) = if rate >= self.config.suspicious_rate_threshold * 2.0 {
            (RiskLevel::Critical, EnforcementAction::RecommendSuspension)
        } else {
            (RiskLevel::High, EnforcementAction::RequireReview)
        };

        Some(SupplierAlert {
            manufacturer_id: manufacturer_id.to_string(),
            severity,
            action,
            flagged_rate: rate,
            sample: stats.verifications,
            created_at: Utc::now(),
        })
    }

    /// Snapshot of a supplier's stats.
    pub fn stats_for(&self, manufacturer_id: &str) -> Option<&SupplierStats> {
        self.stats.get(manufacturer_id)
    }
}

/// Drive a [`SupplierWatch`] from a broadcast subscription, forwarding
/// raised alerts. Runs until the event channel closes.
pub async fn run_watch(
    watch: Arc<Mutex<SupplierWatch>>,
    mut events: broadcast::Receiver<VerificationEvent>,
    alerts: mpsc::Sender<SupplierAlert>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let alert = watch.lock().await.observe(&event);
                if let Some(alert) = alert {
                    debug!(
                        manufacturer_id = %alert.manufacturer_id,
                        severity = %alert.severity,
                        flagged_rate = alert.flagged_rate,
                        "supplier alert raised"
                    );
                    if alerts.send(alert).await.is_err() {
                        // Alert consumer went away; nothing left to do.
                        return;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "alerting fell behind verification events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
