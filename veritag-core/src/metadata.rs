//! Metadata consistency scoring for decoded QR payloads.
//!
//! Compares the decoded payload against the authoritative product record
//! and the age of the code itself. Rules are additive and
//! order-independent: each contributes a score delta (higher is more
//! genuine), an inverse risk delta, and a severity-tagged factor string
//! that is surfaced to the caller.

use chrono::{DateTime, Duration, Utc};

use crate::types::{Product, ProductStatus, QrPayload, SignalScore};

// Rule weights. Score deltas move the genuineness score; risk deltas move
// the inverse risk score. Missing product is the single largest penalty;
// a future-dated code is the worst QR-age signal.
pub const FUTURE_DATED_SCORE: f64 = -30.0;
pub const FUTURE_DATED_RISK: f64 = 40.0;
pub const VERY_OLD_SCORE: f64 = -15.0;
pub const VERY_OLD_RISK: f64 = 20.0;
pub const FRESH_SCORE: f64 = 10.0;
pub const UNREMARKABLE_AGE_RISK: f64 = 5.0;
pub const MISSING_PRODUCT_SCORE: f64 = -40.0;
pub const MISSING_PRODUCT_RISK: f64 = 50.0;
pub const INACTIVE_STATUS_SCORE: f64 = -20.0;
pub const INACTIVE_STATUS_RISK: f64 = 25.0;
pub const ACTIVE_STATUS_SCORE: f64 = 15.0;
pub const MANUFACTURER_MATCH_SCORE: f64 = 10.0;
pub const MANUFACTURER_MISMATCH_SCORE: f64 = -25.0;
pub const MANUFACTURER_MISMATCH_RISK: f64 = 30.0;
pub const ORG_MATCH_SCORE: f64 = 5.0;
pub const ORG_MISMATCH_SCORE: f64 = -15.0;
pub const ORG_MISMATCH_RISK: f64 = 20.0;

/// Age below which a code earns the freshness bonus.
const FRESH_AGE_DAYS: i64 = 7;
/// Age above which a code earns the staleness penalty.
const VERY_OLD_AGE_DAYS: i64 = 365;

/// Scores payload/product consistency. Stateless; `now` is passed in so
/// results are deterministic under test.
#[derive(Debug, Default)]
pub struct MetadataScorer;

impl MetadataScorer {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate all consistency rules for one scan.
    pub fn score(
        &self,
        product: Option<&Product>,
        payload: &QrPayload,
        now: DateTime<Utc>,
    ) -> SignalScore {
        let mut signal = SignalScore::default();
        signal.absorb(self.apply_age_rules(payload, now));
        signal.absorb(self.apply_product_rules(product));
        if let Some(product) = product {
            signal.absorb(self.apply_identity_rules(product, payload));
        }
        signal
    }

    /// QR age relative to now: future-dated is the worst single age
    /// signal; very old codes are penalized; fresh codes earn a bonus.
    fn apply_age_rules(&self, payload: &QrPayload, now: DateTime<Utc>) -> SignalScore {
        let age = now - payload.issued_at;

        if age < Duration::zero() {
            return SignalScore {
                score_delta: FUTURE_DATED_SCORE,
                risk_delta: FUTURE_DATED_RISK,
                factors: vec!["QR code issuance timestamp is in the future - HIGH RISK".into()],
            };
        }
        if age > Duration::days(VERY_OLD_AGE_DAYS) {
            return SignalScore {
                score_delta: VERY_OLD_SCORE,
                risk_delta: VERY_OLD_RISK,
                factors: vec!["QR code is older than one year - MEDIUM RISK".into()],
            };
        }
        if age < Duration::days(FRESH_AGE_DAYS) {
            return SignalScore {
                score_delta: FRESH_SCORE,
                risk_delta: 0.0,
                factors: vec!["QR code was issued recently".into()],
            };
        }
        SignalScore {
            score_delta: 0.0,
            risk_delta: UNREMARKABLE_AGE_RISK,
            factors: vec!["QR code age is unremarkable - LOW RISK".into()],
        }
    }

    /// Product existence and lifecycle status.
    fn apply_product_rules(&self, product: Option<&Product>) -> SignalScore {
        let Some(product) = product else {
            return SignalScore {
                score_delta: MISSING_PRODUCT_SCORE,
                risk_delta: MISSING_PRODUCT_RISK,
                factors: vec!["Product record not found - CRITICAL RISK".into()],
            };
        };

        match product.status {
            ProductStatus::Active => SignalScore {
                score_delta: ACTIVE_STATUS_SCORE,
                risk_delta: 0.0,
                factors: vec!["Product is registered and active".into()],
            },
            status => SignalScore {
                score_delta: INACTIVE_STATUS_SCORE,
                risk_delta: INACTIVE_STATUS_RISK,
                factors: vec![format!(
                    "Product status is '{status}', not active - MEDIUM RISK"
                )],
            },
        }
    }

    /// Manufacturer and organization identity cross-checks.
    fn apply_identity_rules(&self, product: &Product, payload: &QrPayload) -> SignalScore {
        let mut signal = SignalScore::default();

        if product.manufacturer_id == payload.manufacturer_id {
            signal.absorb(SignalScore {
                score_delta: MANUFACTURER_MATCH_SCORE,
                risk_delta: 0.0,
                factors: vec!["Manufacturer ID matches registration".into()],
            });
        } else {
            signal.absorb(SignalScore {
                score_delta: MANUFACTURER_MISMATCH_SCORE,
                risk_delta: MANUFACTURER_MISMATCH_RISK,
                factors: vec!["Manufacturer ID does not match registration - HIGH RISK".into()],
            });
        }

        if product.org_id == payload.org_id {
            signal.absorb(SignalScore {
                score_delta: ORG_MATCH_SCORE,
                risk_delta: 0.0,
                factors: vec!["Organization ID matches registration".into()],
            });
        } else {
            signal.absorb(SignalScore {
                score_delta: ORG_MISMATCH_SCORE,
                risk_delta: ORG_MISMATCH_RISK,
                factors: vec!["Organization ID does not match registration - MEDIUM RISK".into()],
            });
        }

        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn product(status: ProductStatus) -> Product {
        Product {
            product_id: "prod-1".into(),
            org_id: "org-1".into(),
            manufacturer_id: "mfr-1".into(),
            name: "Widget".into(),
            sku: "W-100".into(),
            category: "widgets".into(),
            status,
            created_at: Utc::now() - Duration::days(30),
        }
    }

    fn payload_aged(days: i64) -> QrPayload {
        QrPayload {
            product_id: "prod-1".into(),
            org_id: "org-1".into(),
            manufacturer_id: "mfr-1".into(),
            issued_at: Utc::now() - Duration::days(days),
        }
    }

    #[test]
    fn test_fresh_matching_active_product() {
        let scorer = MetadataScorer::new();
        let product = product(ProductStatus::Active);
        let signal = scorer.score(Some(&product), &payload_aged(1), Utc::now());

        // fresh + active + manufacturer + org
        assert_eq!(
            signal.score_delta,
            FRESH_SCORE + ACTIVE_STATUS_SCORE + MANUFACTURER_MATCH_SCORE + ORG_MATCH_SCORE
        );
        assert_eq!(signal.risk_delta, 0.0);
        assert_eq!(signal.factors.len(), 4);
    }

    #[test]
    fn test_missing_product_is_largest_single_penalty() {
        let scorer = MetadataScorer::new();
        let signal = scorer.score(None, &payload_aged(1), Utc::now());
        assert_eq!(signal.score_delta, FRESH_SCORE + MISSING_PRODUCT_SCORE);
        assert!(signal
            .factors
            .iter()
            .any(|f| f.contains("CRITICAL RISK")));
        // No identity rules without a product to compare against.
        assert_eq!(signal.factors.len(), 2);
    }

    #[test]
    fn test_future_dated_payload() {
        let scorer = MetadataScorer::new();
        let product = product(ProductStatus::Active);
        let signal = scorer.score(Some(&product), &payload_aged(-3), Utc::now());
        assert!(signal
            .factors
            .iter()
            .any(|f| f.contains("future") && f.contains("HIGH RISK")));
        assert!(signal.risk_delta >= FUTURE_DATED_RISK);
    }

    #[test]
    fn test_very_old_payload_penalized_but_survivable() {
        let scorer = MetadataScorer::new();
        let product = product(ProductStatus::Active);
        let signal = scorer.score(Some(&product), &payload_aged(730), Utc::now());
        assert_eq!(
            signal.score_delta,
            VERY_OLD_SCORE + ACTIVE_STATUS_SCORE + MANUFACTURER_MATCH_SCORE + ORG_MATCH_SCORE
        );
        // Seeded at 50, this lands at 65: degraded but not INVALID.
        assert!(50.0 + signal.score_delta >= 60.0);
    }

    #[test]
    fn test_inactive_status_penalty() {
        let scorer = MetadataScorer::new();
        let product = product(ProductStatus::Recalled);
        let signal = scorer.score(Some(&product), &payload_aged(30), Utc::now());
        assert!(signal
            .factors
            .iter()
            .any(|f| f.contains("recalled") && f.contains("MEDIUM RISK")));
    }

    #[test]
    fn test_identity_mismatches() {
        let scorer = MetadataScorer::new();
        let mut product = product(ProductStatus::Active);
        product.manufacturer_id = "someone-else".into();
        product.org_id = "other-org".into();
        let signal = scorer.score(Some(&product), &payload_aged(1), Utc::now());

        assert!(signal
            .factors
            .iter()
            .any(|f| f.contains("Manufacturer ID does not match")));
        assert!(signal
            .factors
            .iter()
            .any(|f| f.contains("Organization ID does not match")));
        assert!(signal.score_delta < 0.0);
    }

    #[test]
    fn test_missing_product_dominated_by_resolving_product() {
        let scorer = MetadataScorer::new();
        let product = product(ProductStatus::Active);
        let payload = payload_aged(1);
        let now = Utc::now();

        let with = scorer.score(Some(&product), &payload, now);
        let without = scorer.score(None, &payload, now);
        assert!(without.score_delta < with.score_delta);
    }
}
