//! # Veritag Core
//!
//! Verification and risk-scoring pipeline for QR-tagged physical
//! products. A scanned code is decrypted, scored against the product
//! registry, recent usage patterns, image forensics, and supplier fraud
//! history, then banded into a verdict and recorded in a tamper-evident
//! audit ledger.
//!
//! The central entry point is [`pipeline::VerificationPipeline`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use veritag_core::codec::QrCodec;
//! use veritag_core::config::AnomalyConfig;
//! use veritag_core::pipeline::{PipelineStores, VerificationPipeline, VerificationRequest};
//! use veritag_core::store::MemoryStore;
//!
//! # async fn run() -> veritag_core::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let pipeline = VerificationPipeline::new(
//!     QrCodec::generate(),
//!     PipelineStores {
//!         products: store.clone(),
//!         history: store.clone(),
//!         features: store.clone(),
//!         sink: store,
//!     },
//!     None,
//!     AnomalyConfig::default(),
//! );
//!
//! let outcome = pipeline
//!     .verify(VerificationRequest {
//!         encrypted_payload: "scanned-qr-content".into(),
//!         verifier_id: "user-1".into(),
//!         location: None,
//!         image_url: None,
//!     })
//!     .await?;
//! println!("{}", outcome.verdict);
//! # Ok(())
//! # }
//! ```

pub mod alerting;
pub mod anomaly;
pub mod audit;
pub mod codec;
pub mod config;
pub mod error;
pub mod forensics;
pub mod fraud;
pub mod metadata;
pub mod pipeline;
pub mod store;
pub mod types;
pub mod verdict;

pub use error::{Result, VeritagError};
pub use pipeline::{PipelineStores, VerificationPipeline, VerificationRequest};
pub use types::{RiskLevel, Verdict, VerificationOutcome};
