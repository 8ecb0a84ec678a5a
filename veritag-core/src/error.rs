//! Error types for the Veritag core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the codec, store, forensics, audit, and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the Veritag core library.
#[derive(Debug, thiserror::Error)]
pub enum VeritagError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Forensics error: {0}")]
    Forensics(#[from] ForensicsError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from QR payload encoding. Decoding is fail-closed and never
/// surfaces an error; see `QrCodec::decode`.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Encryption failed: {message}")]
    EncryptFailed { message: String },

    #[error("Invalid key length: expected 32 bytes, got {got}")]
    InvalidKeyLength { got: usize },

    #[error("Secret is not valid base64: {message}")]
    InvalidSecret { message: String },

    #[error("Payload serialization failed: {message}")]
    Serialize { message: String },
}

/// Errors from the external product/scan-history stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Product lookup failed for '{product_id}': {message}")]
    ProductLookup { product_id: String, message: String },

    #[error("Scan history query failed for '{product_id}': {message}")]
    HistoryQuery { product_id: String, message: String },

    #[error("Failed to append scan record {scan_id}: {message}")]
    AppendScan { scan_id: String, message: String },

    #[error("Fraud feature aggregation failed for org '{org_id}': {message}")]
    FeatureAggregation { org_id: String, message: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors from the image forensics service.
#[derive(Debug, thiserror::Error)]
pub enum ForensicsError {
    #[error("Forensics service unavailable: {message}")]
    Unavailable { message: String },

    #[error("Forensics request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Forensics response invalid: {message}")]
    InvalidResponse { message: String },

    #[error("Image reference not fetchable: {url}")]
    ImageUnavailable { url: String },
}

/// Errors from the append-only audit ledger.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Failed to append audit transaction for scan {ref_id}: {message}")]
    AppendFailed { ref_id: String, message: String },

    #[error("Audit chain broken at sequence {sequence}")]
    ChainBroken { sequence: u64 },

    #[error("Audit ledger is empty")]
    EmptyLedger,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level [`VeritagError`].
pub type Result<T> = std::result::Result<T, VeritagError>;
