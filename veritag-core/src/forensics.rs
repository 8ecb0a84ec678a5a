//! Image forensics adapter — the consumed contract of the external
//! logo/tampering/OCR scorer.
//!
//! The pipeline treats the scorer as a black box behind the
//! [`ImageForensics`] trait. Its signals adjust the running assessment by
//! fixed increments; the adapter being slow or unavailable degrades the
//! scoring, it never aborts the verification.

use async_trait::async_trait;

use crate::error::ForensicsError;
use crate::types::{ImageVerificationResult, SignalScore};

// Fixed increments applied when forensics signals are present.
pub const LOW_LOGO_MATCH_SCORE: f64 = -20.0;
pub const LOW_LOGO_MATCH_RISK: f64 = 25.0;
pub const TAMPERING_SCORE: f64 = -25.0;
pub const TAMPERING_RISK: f64 = 30.0;
pub const SERIAL_MATCH_SCORE: f64 = 10.0;
/// Absence of corroborating evidence is itself a weak negative signal.
pub const NO_IMAGE_RISK: f64 = 10.0;

/// Logo match below this threshold is treated as a failed match.
const LOGO_MATCH_THRESHOLD: f64 = 0.5;
/// Tampering score above this threshold is treated as manipulation.
const TAMPERING_THRESHOLD: f64 = 0.4;

/// Contract of the external image forensics service.
#[async_trait]
pub trait ImageForensics: Send + Sync {
    /// Score a verification photo against the registered product imagery.
    async fn verify_image(
        &self,
        image_url: &str,
        product_id: &str,
    ) -> Result<ImageVerificationResult, ForensicsError>;
}

/// Fold a forensics result into a signal contribution.
pub fn fold_image_signal(result: &ImageVerificationResult) -> SignalScore {
    let mut signal = SignalScore::default();

    if result.logo_match < LOGO_MATCH_THRESHOLD {
        signal.score_delta += LOW_LOGO_MATCH_SCORE;
        signal.risk_delta += LOW_LOGO_MATCH_RISK;
        signal
            .factors
            .push("Logo match below confidence threshold - HIGH RISK".into());
    }
    if result.tampering_score > TAMPERING_THRESHOLD {
        signal.score_delta += TAMPERING_SCORE;
        signal.risk_delta += TAMPERING_RISK;
        signal
            .factors
            .push("Image tampering indicators detected - HIGH RISK".into());
    }
    if result.serial_number_match {
        signal.score_delta += SERIAL_MATCH_SCORE;
        signal
            .factors
            .push("Serial number matches registration".into());
    }
    signal.factors.extend(result.factors.iter().cloned());
    signal
}

/// Signal applied when the caller supplied no image at all.
pub fn no_image_signal() -> SignalScore {
    SignalScore {
        score_delta: 0.0,
        risk_delta: NO_IMAGE_RISK,
        factors: vec!["No verification image supplied - LOW RISK".into()],
    }
}

/// Deterministic forensics stub returning a canned result. Used by tests
/// and the demo server wiring.
pub struct StaticForensics {
    result: ImageVerificationResult,
}

impl StaticForensics {
    pub fn new(result: ImageVerificationResult) -> Self {
        Self { result }
    }

    /// A clean pass: strong logo match, no tampering, serial match.
    pub fn passing() -> Self {
        Self::new(ImageVerificationResult {
            logo_match: 0.95,
            tampering_score: 0.05,
            text_extracted: true,
            serial_number_match: true,
            factors: vec![],
        })
    }
}

#[async_trait]
impl ImageForensics for StaticForensics {
    async fn verify_image(
        &self,
        _image_url: &str,
        _product_id: &str,
    ) -> Result<ImageVerificationResult, ForensicsError> {
        Ok(self.result.clone())
    }
}

/// Forensics stub that always fails, for degradation-path tests.
pub struct UnavailableForensics;

#[async_trait]
impl ImageForensics for UnavailableForensics {
    async fn verify_image(
        &self,
        _image_url: &str,
        _product_id: &str,
    ) -> Result<ImageVerificationResult, ForensicsError> {
        Err(ForensicsError::Unavailable {
            message: "forensics service offline".into(),
        })
    }
}
