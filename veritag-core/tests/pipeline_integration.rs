//! End-to-end pipeline tests: real codec, in-memory stores, full
//! scoring path from encrypted payload to recorded verdict.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use veritag_core::audit::AuditTransaction;
use veritag_core::codec::{payload_size_class, QrCodec};
use veritag_core::config::AnomalyConfig;
use veritag_core::error::{AuditError, StoreError, VeritagError};
use veritag_core::forensics::{StaticForensics, UnavailableForensics};
use veritag_core::pipeline::{PipelineStores, VerificationPipeline, VerificationRequest};
use veritag_core::store::{MemoryStore, VerificationSink};
use veritag_core::types::{
    FraudRiskFeatures, Product, ProductStatus, QrPayload, RiskLevel, ScanRecord,
    TransactionReceipt, Verdict,
};

const KEY: [u8; 32] = [7u8; 32];

fn codec() -> QrCodec {
    QrCodec::from_key(&KEY)
}

fn pipeline(store: Arc<MemoryStore>) -> VerificationPipeline {
    VerificationPipeline::new(
        codec(),
        PipelineStores {
            products: store.clone(),
            history: store.clone(),
            features: store.clone(),
            sink: store,
        },
        None,
        AnomalyConfig::default(),
    )
}

fn payload(age_days: i64) -> QrPayload {
    QrPayload {
        product_id: "prod-100".into(),
        org_id: "org-acme".into(),
        manufacturer_id: "mfr-acme".into(),
        issued_at: Utc::now() - Duration::days(age_days),
    }
}

fn registered_product(p: &QrPayload) -> Product {
    Product {
        product_id: p.product_id.clone(),
        org_id: p.org_id.clone(),
        manufacturer_id: p.manufacturer_id.clone(),
        name: "Acme Widget".into(),
        sku: "AW-100".into(),
        category: "widgets".into(),
        status: ProductStatus::Active,
        created_at: Utc::now() - Duration::days(60),
    }
}

fn request(encrypted: String) -> VerificationRequest {
    VerificationRequest {
        encrypted_payload: encrypted,
        verifier_id: "shopper-1".into(),
        location: Some("NYC".into()),
        image_url: None,
    }
}

#[tokio::test]
async fn fresh_active_product_is_genuine() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let outcome = pipeline.verify(request(encrypted)).await.unwrap();

    // 50 + fresh 10 + active 15 + manufacturer 10 + org 5 = 90
    assert_eq!(outcome.verdict, Verdict::Genuine);
    assert_eq!(outcome.ai_score, 90.0);
    assert_eq!(outcome.risk_level, RiskLevel::Low);
    assert_eq!(outcome.product.as_ref().unwrap().sku, "AW-100");
    assert_eq!(outcome.transaction.status, "CONFIRMED");
}

#[tokio::test]
async fn year_old_code_degrades_to_suspicious() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let payload = payload(400);
    store.insert_product(registered_product(&payload)).await;

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let outcome = pipeline.verify(request(encrypted)).await.unwrap();

    // 50 - old 15 + active 15 + manufacturer 10 + org 5 = 65
    assert_eq!(outcome.verdict, Verdict::Suspicious);
    assert_eq!(outcome.ai_score, 65.0);
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("older than one year")));
}

#[tokio::test]
async fn unregistered_product_is_invalid() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store);

    let encrypted = pipeline.codec().encode(&payload(1)).unwrap();
    let outcome = pipeline.verify(request(encrypted)).await.unwrap();

    // 50 + fresh 10 - missing 40 = 20
    assert_eq!(outcome.verdict, Verdict::Invalid);
    assert_eq!(outcome.ai_score, 20.0);
    assert!(outcome.product.is_none());
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("Product record not found")));
    // missing 50 + no image 10 = 60
    assert_eq!(outcome.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn undecodable_payload_is_invalid_and_audited() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let outcome = pipeline
        .verify(request("AAAA not a real payload".into()))
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Invalid);
    assert_eq!(outcome.ai_score, 0.0);
    assert_eq!(outcome.confidence, 0.0);
    assert_eq!(outcome.risk_level, RiskLevel::Critical);

    let ledger = store.ledger().await;
    assert_eq!(ledger.len(), 1);
    assert!(ledger.verify_chain().is_valid);
    assert_eq!(store.scan_count().await, 1);
}

#[tokio::test]
async fn scan_burst_degrades_genuine_to_suspicious() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let class = payload_size_class(&encrypted);

    // 12 scans in the trailing hour from 6 distinct verifiers.
    for i in 0..12u32 {
        store
            .append_scan(ScanRecord {
                scan_id: Uuid::new_v4(),
                product_id: payload.product_id.clone(),
                timestamp: Utc::now() - Duration::minutes(i as i64 * 4),
                verifier_id: format!("v-{}", i % 6),
                location: None,
                verdict: Verdict::Genuine,
                ai_score: 90.0,
                payload_class: class,
                image: None,
            })
            .await
            .unwrap();
    }

    let outcome = pipeline.verify(request(encrypted)).await.unwrap();

    // Metadata lands at 90; frequency 40 + verifier diversity 20 anomalies
    // subtract half the anomaly score: 90 - 30 = 60.
    assert_eq!(outcome.verdict, Verdict::Suspicious);
    assert_eq!(outcome.ai_score, 60.0);
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("Scan frequency anomaly")));
    // Anomaly score of 60 floors the risk level at high.
    assert_eq!(outcome.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn daily_scan_volume_is_flagged_at_default_window() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let class = payload_size_class(&encrypted);

    // 60 scans spread over the trailing day, at most 3 in any hour. The
    // default history window must be wide enough to surface all of them.
    for i in 0..60u32 {
        store
            .append_scan(ScanRecord {
                scan_id: Uuid::new_v4(),
                product_id: payload.product_id.clone(),
                timestamp: Utc::now() - Duration::minutes(i as i64 * 20),
                verifier_id: "v-1".into(),
                location: None,
                verdict: Verdict::Genuine,
                ai_score: 90.0,
                payload_class: class,
                image: None,
            })
            .await
            .unwrap();
    }

    let outcome = pipeline.verify(request(encrypted)).await.unwrap();

    // Metadata lands at 90; the daily frequency anomaly (40) subtracts
    // half of itself: 90 - 20 = 70.
    assert_eq!(outcome.ai_score, 70.0);
    assert_eq!(outcome.verdict, Verdict::Suspicious);
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("Scan frequency anomaly") && f.contains("last day")));
}

#[tokio::test]
async fn risky_supplier_history_penalizes_score() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;
    store
        .insert_features(
            payload.org_id.clone(),
            FraudRiskFeatures {
                suspicious_rate: Some(0.5),
                supplier_reputation: Some(0.2),
                fraud_incidents: Some(12),
                location_diversity: Some(2),
                verification_velocity_7d: Some(10),
                multi_user_same_product: Some(false),
            },
        )
        .await;

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let outcome = pipeline.verify(request(encrypted)).await.unwrap();

    // Fraud risk 25 + 20 + 30 = 75, critical: 90 - 75 * 0.3 = 67.5
    assert_eq!(outcome.verdict, Verdict::Suspicious);
    assert_eq!(outcome.ai_score, 67.5);
    assert_eq!(outcome.risk_level, RiskLevel::Critical);
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("fraud incidents")));
}

#[tokio::test]
async fn passing_image_adds_serial_bonus() {
    let store = Arc::new(MemoryStore::new());
    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let pipeline = VerificationPipeline::new(
        codec(),
        PipelineStores {
            products: store.clone(),
            history: store.clone(),
            features: store.clone(),
            sink: store,
        },
        Some(Arc::new(StaticForensics::passing())),
        AnomalyConfig::default(),
    );

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let mut req = request(encrypted);
    req.image_url = Some("https://img.example/scan.jpg".into());
    let outcome = pipeline.verify(req).await.unwrap();

    // 90 + serial match 10, clamped at 100.
    assert_eq!(outcome.ai_score, 100.0);
    assert_eq!(outcome.verdict, Verdict::Genuine);
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("Serial number matches")));
}

#[tokio::test]
async fn forensics_outage_degrades_without_aborting() {
    let store = Arc::new(MemoryStore::new());
    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let pipeline = VerificationPipeline::new(
        codec(),
        PipelineStores {
            products: store.clone(),
            history: store.clone(),
            features: store.clone(),
            sink: store,
        },
        Some(Arc::new(UnavailableForensics)),
        AnomalyConfig::default(),
    );

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let mut req = request(encrypted);
    req.image_url = Some("https://img.example/scan.jpg".into());
    let outcome = pipeline.verify(req).await.unwrap();

    assert_eq!(outcome.verdict, Verdict::Genuine);
    assert!(outcome
        .factors
        .iter()
        .any(|f| f.contains("Image forensics unavailable")));
}

#[tokio::test]
async fn repeated_scans_chain_the_ledger() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    for _ in 0..5 {
        let encrypted = pipeline.codec().encode(&payload).unwrap();
        pipeline.verify(request(encrypted)).await.unwrap();
    }

    let ledger = store.ledger().await;
    assert_eq!(ledger.len(), 5);
    assert!(ledger.verify_chain().is_valid);
    assert_eq!(ledger.entries_for_org(&payload.org_id).len(), 5);
}

#[tokio::test]
async fn identical_state_yields_identical_verdicts() {
    let store_a = Arc::new(MemoryStore::new());
    let store_b = Arc::new(MemoryStore::new());
    let pipeline_a = pipeline(store_a.clone());
    let pipeline_b = pipeline(store_b.clone());

    let payload = payload(30);
    store_a.insert_product(registered_product(&payload)).await;
    store_b.insert_product(registered_product(&payload)).await;

    let encrypted = pipeline_a.codec().encode(&payload).unwrap();
    let a = pipeline_a.verify(request(encrypted.clone())).await.unwrap();
    let b = pipeline_b.verify(request(encrypted)).await.unwrap();

    assert_eq!(a.verdict, b.verdict);
    assert_eq!(a.ai_score, b.ai_score);
    assert_eq!(a.factors, b.factors);
}

/// Sink whose scan writes fail, for the fatal-persistence path.
struct FailingScanSink;

#[async_trait]
impl VerificationSink for FailingScanSink {
    async fn append_scan(&self, record: ScanRecord) -> Result<(), StoreError> {
        Err(StoreError::AppendScan {
            scan_id: record.scan_id.to_string(),
            message: "disk full".into(),
        })
    }

    async fn append_audit(
        &self,
        _transaction: AuditTransaction,
    ) -> Result<TransactionReceipt, AuditError> {
        unreachable!("scan write fails first")
    }
}

/// Sink whose audit writes fail after a successful scan write.
struct FailingAuditSink {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl VerificationSink for FailingAuditSink {
    async fn append_scan(&self, record: ScanRecord) -> Result<(), StoreError> {
        self.inner.append_scan(record).await
    }

    async fn append_audit(
        &self,
        transaction: AuditTransaction,
    ) -> Result<TransactionReceipt, AuditError> {
        Err(AuditError::AppendFailed {
            ref_id: transaction.ref_id,
            message: "ledger unavailable".into(),
        })
    }
}

#[tokio::test]
async fn scan_write_failure_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let pipeline = VerificationPipeline::new(
        codec(),
        PipelineStores {
            products: store.clone(),
            history: store.clone(),
            features: store,
            sink: Arc::new(FailingScanSink),
        },
        None,
        AnomalyConfig::default(),
    );

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let err = pipeline.verify(request(encrypted)).await.unwrap_err();
    assert!(matches!(err, VeritagError::Store(_)));
}

#[tokio::test]
async fn audit_write_failure_surfaces_not_swallowed() {
    let store = Arc::new(MemoryStore::new());
    let payload = payload(1);
    store.insert_product(registered_product(&payload)).await;

    let pipeline = VerificationPipeline::new(
        codec(),
        PipelineStores {
            products: store.clone(),
            history: store.clone(),
            features: store.clone(),
            sink: Arc::new(FailingAuditSink {
                inner: store.clone(),
            }),
        },
        None,
        AnomalyConfig::default(),
    );

    let encrypted = pipeline.codec().encode(&payload).unwrap();
    let err = pipeline.verify(request(encrypted)).await.unwrap_err();
    assert!(matches!(err, VeritagError::Audit(_)));

    // The scan record itself was written before the audit failure.
    assert_eq!(store.scan_count().await, 1);
}
