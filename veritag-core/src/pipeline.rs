//! The verification pipeline — one scan in, one verdict out.
//!
//! Orchestrates the stages in their only required order: decode first,
//! then product/history fetches, then the four scoring signals folded
//! into the accumulator, then banding and persistence. Every external
//! collaborator failure except persistence degrades the assessment
//! instead of aborting it: the business guarantee is that a caller
//! always receives a verdict, and that every completed scan is durably
//! recorded in both the scan history and the audit ledger.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerting::VerificationEvent;
use crate::anomaly::{ScanContext, UsageAnomalyDetector};
use crate::audit::AuditTransaction;
use crate::codec::{payload_size_class, QrCodec};
use crate::config::AnomalyConfig;
use crate::error::Result;
use crate::forensics::{self, ImageForensics};
use crate::fraud;
use crate::metadata::MetadataScorer;
use crate::store::{FraudFeatureSource, ProductStore, ScanHistoryStore, VerificationSink};
use crate::types::{
    ImageVerificationResult, ProductSummary, QrPayload, ScanRecord, VerificationOutcome,
};
use crate::verdict::{FinalAssessment, ScoreAccumulator};

/// Placeholder identity recorded when the payload cannot be decoded.
const UNKNOWN_ID: &str = "unknown";

/// Capacity of the verification event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One incoming scan to verify.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// The base64 wire string read from the QR code.
    pub encrypted_payload: String,
    /// Identity of the scanning holder.
    pub verifier_id: String,
    /// Reported scan location, if any.
    pub location: Option<String>,
    /// Reference to an uploaded verification photo, if any.
    pub image_url: Option<String>,
}

/// External collaborators injected into the pipeline.
///
/// Lifecycle is owned by the caller: construct once per process and
/// inject into request handlers.
pub struct PipelineStores {
    pub products: Arc<dyn ProductStore>,
    pub history: Arc<dyn ScanHistoryStore>,
    pub features: Arc<dyn FraudFeatureSource>,
    pub sink: Arc<dyn VerificationSink>,
}

/// The verification and risk-scoring pipeline.
pub struct VerificationPipeline {
    codec: QrCodec,
    metadata: MetadataScorer,
    detector: UsageAnomalyDetector,
    stores: PipelineStores,
    forensics: Option<Arc<dyn ImageForensics>>,
    anomaly_config: AnomalyConfig,
    events: broadcast::Sender<VerificationEvent>,
}

impl VerificationPipeline {
    pub fn new(
        codec: QrCodec,
        stores: PipelineStores,
        forensics: Option<Arc<dyn ImageForensics>>,
        anomaly_config: AnomalyConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            codec,
            metadata: MetadataScorer::new(),
            detector: UsageAnomalyDetector::new(),
            stores,
            forensics,
            anomaly_config,
            events,
        }
    }

    /// The codec in use; registration-time encoding goes through the
    /// same instance so issued codes decode symmetrically.
    pub fn codec(&self) -> &QrCodec {
        &self.codec
    }

    /// Subscribe to per-scan verification events.
    pub fn subscribe(&self) -> broadcast::Receiver<VerificationEvent> {
        self.events.subscribe()
    }

    /// Verify one scan end to end.
    ///
    /// Always yields a verdict on the success path; only persistence
    /// failures surface as errors.
    pub async fn verify(&self, request: VerificationRequest) -> Result<VerificationOutcome> {
        let scan_id = Uuid::new_v4();
        debug!(%scan_id, verifier_id = %request.verifier_id, "verification started");

        // Decoding must complete before any other stage runs. A failed
        // decode is a first-class INVALID verdict, not an error.
        let Some(payload) = self.codec.decode(&request.encrypted_payload) else {
            info!(%scan_id, "payload decode failed, recording INVALID");
            return self.record_invalid(scan_id, &request).await;
        };

        let product = match self.stores.products.get_product(&payload.product_id).await {
            Ok(product) => product,
            Err(e) => {
                warn!(%scan_id, error = %e, "product lookup failed, scoring as missing");
                None
            }
        };

        let now = Utc::now();
        let mut acc = ScoreAccumulator::new();

        // Stage 1: metadata consistency.
        acc.apply(&self.metadata.score(product.as_ref(), &payload, now));

        // Stage 2: image forensics, when an image was supplied.
        let image_result = self.run_forensics(scan_id, &request, &payload).await;
        match &image_result {
            Some(result) => acc.apply(&forensics::fold_image_signal(result)),
            None if request.image_url.is_some() => {
                // Adapter failed or is not wired; degrade, don't abort.
                acc.apply(&crate::types::SignalScore {
                    score_delta: 0.0,
                    risk_delta: 0.0,
                    factors: vec![
                        "Image forensics unavailable - scored without image signals".into(),
                    ],
                });
            }
            None => acc.apply(&forensics::no_image_signal()),
        }

        // Stage 3: usage anomalies over the bounded history window.
        let history = self.fetch_history(scan_id, &payload, &mut acc).await;
        let verifier_hour_count = self
            .stores
            .history
            .verifier_scan_count_since(&request.verifier_id, now - Duration::hours(1))
            .await
            .unwrap_or(0);
        let assessment = self.detector.detect(
            &history,
            &ScanContext {
                now,
                location: request.location.as_deref(),
                verifier_id: &request.verifier_id,
                payload_class: payload_size_class(&request.encrypted_payload),
                verifier_hour_count,
            },
        );
        acc.apply(&assessment.as_signal());
        acc.raise_risk_floor(assessment.risk_floor());

        // Stage 4: aggregate fraud risk, independent of this scan.
        let features = match self
            .stores
            .features
            .features_for(&payload.org_id, &payload.product_id)
            .await
        {
            Ok(features) => features,
            Err(e) => {
                warn!(%scan_id, error = %e, "fraud features unavailable, using empty snapshot");
                Default::default()
            }
        };
        let estimate = fraud::estimate(&features);
        acc.apply(&estimate.as_signal());
        acc.cap_confidence(estimate.confidence);
        acc.raise_risk_floor(estimate.risk_floor());

        let assessment = acc.finalize();
        info!(
            %scan_id,
            product_id = %payload.product_id,
            verdict = %assessment.verdict,
            score = assessment.score,
            risk_level = %assessment.risk_level,
            "verification scored"
        );

        self.record(scan_id, &request, &payload, product.as_ref(), image_result, assessment)
            .await
    }

    /// Run the forensics adapter, tolerating absence and failure.
    async fn run_forensics(
        &self,
        scan_id: Uuid,
        request: &VerificationRequest,
        payload: &QrPayload,
    ) -> Option<ImageVerificationResult> {
        let image_url = request.image_url.as_deref()?;
        let forensics = self.forensics.as_ref()?;
        match forensics.verify_image(image_url, &payload.product_id).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(%scan_id, error = %e, "image forensics failed, continuing without");
                None
            }
        }
    }

    /// Fetch the bounded scan history; a failed fetch is equivalent to a
    /// first scan ever seen, which is the conservative direction.
    async fn fetch_history(
        &self,
        scan_id: Uuid,
        payload: &QrPayload,
        acc: &mut ScoreAccumulator,
    ) -> Vec<ScanRecord> {
        match self
            .stores
            .history
            .recent_scans(&payload.product_id, self.anomaly_config.effective_window())
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(%scan_id, error = %e, "scan history unavailable, treating as empty");
                acc.apply(&crate::types::SignalScore {
                    score_delta: 0.0,
                    risk_delta: 0.0,
                    factors: vec!["Scan history unavailable - anomaly checks degraded".into()],
                });
                Vec::new()
            }
        }
    }

    /// Persist and respond for a successfully decoded scan.
    async fn record(
        &self,
        scan_id: Uuid,
        request: &VerificationRequest,
        payload: &QrPayload,
        product: Option<&crate::types::Product>,
        image: Option<ImageVerificationResult>,
        assessment: FinalAssessment,
    ) -> Result<VerificationOutcome> {
        let now = Utc::now();
        let record = ScanRecord {
            scan_id,
            product_id: payload.product_id.clone(),
            timestamp: now,
            verifier_id: request.verifier_id.clone(),
            location: request.location.clone(),
            verdict: assessment.verdict,
            ai_score: assessment.score,
            payload_class: payload_size_class(&request.encrypted_payload),
            image,
        };
        self.stores.sink.append_scan(record).await?;

        let transaction = AuditTransaction::verify_record(
            scan_id.to_string(),
            payload.org_id.clone(),
            request.verifier_id.clone(),
            serde_json::json!({
                "verdict": assessment.verdict,
                "aiScore": assessment.score,
                "riskLevel": assessment.risk_level,
                "factors": assessment.factors,
            }),
            now,
        );
        // The scan record is already durable at this point; an audit
        // failure must surface so the two stores are never silently
        // allowed to disagree.
        let receipt = self.stores.sink.append_audit(transaction).await?;

        let event = VerificationEvent {
            scan_id,
            product_id: payload.product_id.clone(),
            org_id: payload.org_id.clone(),
            manufacturer_id: payload.manufacturer_id.clone(),
            verdict: assessment.verdict,
            risk_level: assessment.risk_level,
            ai_score: assessment.score,
            timestamp: now,
        };
        let _ = self.events.send(event);

        Ok(VerificationOutcome {
            verdict: assessment.verdict,
            ai_score: assessment.score,
            confidence: assessment.confidence,
            risk_level: assessment.risk_level,
            factors: assessment.factors,
            product: product.map(ProductSummary::from),
            transaction: receipt,
        })
    }

    /// The INVALID fast path still produces a scan record and an audit
    /// transaction for completeness, under placeholder identities.
    async fn record_invalid(
        &self,
        scan_id: Uuid,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome> {
        let assessment = FinalAssessment::invalid_payload();
        let now = Utc::now();

        let record = ScanRecord {
            scan_id,
            product_id: UNKNOWN_ID.to_string(),
            timestamp: now,
            verifier_id: request.verifier_id.clone(),
            location: request.location.clone(),
            verdict: assessment.verdict,
            ai_score: assessment.score,
            payload_class: payload_size_class(&request.encrypted_payload),
            image: None,
        };
        self.stores.sink.append_scan(record).await?;

        let transaction = AuditTransaction::verify_record(
            scan_id.to_string(),
            UNKNOWN_ID,
            request.verifier_id.clone(),
            serde_json::json!({
                "verdict": assessment.verdict,
                "aiScore": assessment.score,
                "factors": assessment.factors,
            }),
            now,
        );
        let receipt = self.stores.sink.append_audit(transaction).await?;

        let event = VerificationEvent {
            scan_id,
            product_id: UNKNOWN_ID.to_string(),
            org_id: UNKNOWN_ID.to_string(),
            manufacturer_id: UNKNOWN_ID.to_string(),
            verdict: assessment.verdict,
            risk_level: assessment.risk_level,
            ai_score: assessment.score,
            timestamp: now,
        };
        let _ = self.events.send(event);

        Ok(VerificationOutcome {
            verdict: assessment.verdict,
            ai_score: assessment.score,
            confidence: assessment.confidence,
            risk_level: assessment.risk_level,
            factors: assessment.factors,
            product: None,
            transaction: receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{FraudRiskFeatures, Product, ProductStatus, Verdict};

    fn pipeline_with(store: Arc<MemoryStore>) -> VerificationPipeline {
        VerificationPipeline::new(
            QrCodec::generate(),
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

    fn active_product(codec_payload: &QrPayload) -> Product {
        Product {
            product_id: codec_payload.product_id.clone(),
            org_id: codec_payload.org_id.clone(),
            manufacturer_id: codec_payload.manufacturer_id.clone(),
            name: "Widget".into(),
            sku: "W-1".into(),
            category: "widgets".into(),
            status: ProductStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn request(encrypted: String) -> VerificationRequest {
        VerificationRequest {
            encrypted_payload: encrypted,
            verifier_id: "v-1".into(),
            location: Some("NYC".into()),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_undecodable_payload_records_invalid() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone());

        let outcome = pipeline
            .verify(request("garbage-not-base64".into()))
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Invalid);
        assert_eq!(outcome.ai_score, 0.0);
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.product.is_none());

        // Audit completeness: a scan record and ledger entry exist.
        assert_eq!(store.scan_count().await, 1);
        let ledger = store.ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].transaction.org_id, "unknown");
    }

    #[tokio::test]
    async fn test_fresh_product_scores_genuine() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone());

        let payload = QrPayload {
            product_id: "prod-1".into(),
            org_id: "org-1".into(),
            manufacturer_id: "mfr-1".into(),
            issued_at: Utc::now() - Duration::days(1),
        };
        store.insert_product(active_product(&payload)).await;
        store
            .insert_features("org-1", FraudRiskFeatures::default())
            .await;

        let encrypted = pipeline.codec().encode(&payload).unwrap();
        let outcome = pipeline.verify(request(encrypted)).await.unwrap();

        assert_eq!(outcome.verdict, Verdict::Genuine);
        assert!(outcome.ai_score >= 80.0);
        assert!(outcome.product.is_some());
        assert!(!outcome
            .factors
            .iter()
            .any(|f| f.contains("anomaly")));
    }

    #[tokio::test]
    async fn test_scan_and_audit_verdicts_agree() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone());

        let payload = QrPayload {
            product_id: "prod-1".into(),
            org_id: "org-1".into(),
            manufacturer_id: "mfr-1".into(),
            issued_at: Utc::now() - Duration::days(1),
        };
        store.insert_product(active_product(&payload)).await;

        let encrypted = pipeline.codec().encode(&payload).unwrap();
        let outcome = pipeline.verify(request(encrypted)).await.unwrap();

        let ledger = store.ledger().await;
        let entry = ledger.find_by_tx_hash(&outcome.transaction.tx_hash).unwrap();
        let audited_verdict = entry.transaction.payload["verdict"].as_str().unwrap();
        assert_eq!(audited_verdict, outcome.verdict.to_string());
        assert!(ledger.verify_chain().is_valid);
    }

    #[tokio::test]
    async fn test_event_emitted_per_scan() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone());
        let mut events = pipeline.subscribe();

        let payload = QrPayload {
            product_id: "prod-1".into(),
            org_id: "org-1".into(),
            manufacturer_id: "mfr-1".into(),
            issued_at: Utc::now() - Duration::days(1),
        };
        store.insert_product(active_product(&payload)).await;
        let encrypted = pipeline.codec().encode(&payload).unwrap();

        pipeline.verify(request(encrypted)).await.unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.product_id, "prod-1");
        assert_eq!(event.manufacturer_id, "mfr-1");
    }
}
