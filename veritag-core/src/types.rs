//! Core type definitions for the Veritag verification pipeline.
//!
//! Defines the domain data structures: QR payloads, product records,
//! scan history, forensics results, fraud features, verdicts, and the
//! caller-facing verification outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The decrypted content embedded in a product's QR code at issuance time.
///
/// Immutable once issued; created at product registration and consumed on
/// every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub product_id: String,
    pub org_id: String,
    pub manufacturer_id: String,
    /// Issuance timestamp baked into the code at registration time.
    pub issued_at: DateTime<Utc>,
}

/// Lifecycle status of a registered product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
    Recalled,
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductStatus::Active => write!(f, "active"),
            ProductStatus::Inactive => write!(f, "inactive"),
            ProductStatus::Recalled => write!(f, "recalled"),
        }
    }
}

/// Authoritative product record, owned by the registering organization.
///
/// Read-only to the pipeline; mutations happen through product-edit
/// operations elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    pub org_id: String,
    pub manufacturer_id: String,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
}

/// The subset of product fields returned to scan callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub product_id: String,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub manufacturer_id: String,
    pub status: ProductStatus,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.product_id.clone(),
            name: p.name.clone(),
            sku: p.sku.clone(),
            category: p.category.clone(),
            manufacturer_id: p.manufacturer_id.clone(),
            status: p.status,
        }
    }
}

/// One verification attempt, append-only, ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub scan_id: Uuid,
    pub product_id: String,
    pub timestamp: DateTime<Utc>,
    pub verifier_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub verdict: Verdict,
    pub ai_score: f64,
    /// Coarse size class of the encrypted payload, used by the anomaly
    /// detector to spot cloned/tampered codes.
    pub payload_class: u32,
    /// Image forensics output for this scan, when an image was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageVerificationResult>,
}

/// Output contract of the image forensics service.
///
/// Produced once per scan when an image is supplied; not persisted
/// standalone, folded into the scan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageVerificationResult {
    /// Logo match confidence in `[0, 1]`.
    pub logo_match: f64,
    /// Tampering likelihood in `[0, 1]`.
    pub tampering_score: f64,
    /// Whether OCR extracted any text from the image.
    pub text_extracted: bool,
    /// Whether the extracted serial number matches the registration.
    pub serial_number_match: bool,
    /// Human-readable factor strings produced by the scorer.
    pub factors: Vec<String>,
}

/// Pre-aggregated supplier/product statistics used to estimate baseline
/// fraud likelihood independent of the current scan.
///
/// Every field is optional: partial data yields a lower-confidence
/// estimate, not a missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudRiskFeatures {
    /// Fraction of this supplier's verifications flagged suspicious or fake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspicious_rate: Option<f64>,
    /// Supplier reputation in `[0, 1]`; lower means worse standing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_reputation: Option<f64>,
    /// Count of confirmed fraud incidents attributed to the supplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_incidents: Option<u32>,
    /// Distinct verification locations seen for this product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_diversity: Option<u32>,
    /// Verifications in the trailing 7 days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_velocity_7d: Option<u32>,
    /// Whether multiple distinct users verified the same unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_user_same_product: Option<bool>,
}

impl FraudRiskFeatures {
    /// Number of optional feature slots in the snapshot.
    pub const FEATURE_COUNT: usize = 6;

    /// How many optional features were actually supplied.
    pub fn supplied(&self) -> usize {
        [
            self.suspicious_rate.is_some(),
            self.supplier_reputation.is_some(),
            self.fraud_incidents.is_some(),
            self.location_diversity.is_some(),
            self.verification_velocity_7d.is_some(),
            self.multi_user_same_product.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Terminal classification of a single scan. Derived, never directly set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Genuine,
    Suspicious,
    Fake,
    Invalid,
}

impl Verdict {
    /// Map a final score to its verdict band.
    ///
    /// Band boundaries are preserved exactly from the upstream policy,
    /// including SUSPICIOUS sitting in a higher band than FAKE.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Verdict::Genuine
        } else if score >= 60.0 {
            Verdict::Suspicious
        } else if score >= 40.0 {
            Verdict::Fake
        } else {
            Verdict::Invalid
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Genuine => write!(f, "GENUINE"),
            Verdict::Suspicious => write!(f, "SUSPICIOUS"),
            Verdict::Fake => write!(f, "FAKE"),
            Verdict::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Secondary severity axis independent of the verdict, used for alerting
/// thresholds. Totally ordered: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a `[0, 100]` risk score at the 25/50/75 boundaries.
    pub fn from_risk_score(risk_score: f64) -> Self {
        if risk_score >= 75.0 {
            RiskLevel::Critical
        } else if risk_score >= 50.0 {
            RiskLevel::High
        } else if risk_score >= 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// One additive signal contribution to the running assessment.
///
/// `score_delta` moves the genuineness score (higher is more genuine);
/// `risk_delta` moves the inverse risk score. Each contributing rule
/// appends a severity-tagged factor string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub score_delta: f64,
    pub risk_delta: f64,
    pub factors: Vec<String>,
}

impl SignalScore {
    /// Merge another signal into this one.
    pub fn absorb(&mut self, other: SignalScore) {
        self.score_delta += other.score_delta;
        self.risk_delta += other.risk_delta;
        self.factors.extend(other.factors);
    }
}

/// Ledger receipt returned to the caller alongside the verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub status: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub timestamp: DateTime<Utc>,
}

/// The caller-facing result of one verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub verdict: Verdict,
    pub ai_score: f64,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub product: Option<ProductSummary>,
    pub transaction: TransactionReceipt,
}
