//! Collaborator contracts the pipeline depends on, plus an in-memory
//! implementation used by tests and the demo server wiring.
//!
//! The pipeline never talks to a concrete database: products, scan
//! history, fraud features, and the persistence sink all sit behind
//! async traits so the scorer is unit-testable with fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::audit::{AuditLedger, AuditTransaction};
use crate::error::{AuditError, StoreError};
use crate::types::{FraudRiskFeatures, Product, ScanRecord, TransactionReceipt};

/// Authoritative product records.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, StoreError>;
}

/// Append-only scan history, queried newest-first.
#[async_trait]
pub trait ScanHistoryStore: Send + Sync {
    /// Most recent scans of a product, newest first, at most `limit`.
    async fn recent_scans(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, StoreError>;

    /// How many scans a verifier performed across all products since the
    /// given instant.
    async fn verifier_scan_count_since(
        &self,
        verifier_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Durable persistence of completed verifications. Both writes must
/// succeed for a request to be considered fully recorded.
#[async_trait]
pub trait VerificationSink: Send + Sync {
    async fn append_scan(&self, record: ScanRecord) -> Result<(), StoreError>;

    async fn append_audit(
        &self,
        transaction: AuditTransaction,
    ) -> Result<TransactionReceipt, AuditError>;
}

/// Supplies pre-aggregated fraud features for a supplier/product.
#[async_trait]
pub trait FraudFeatureSource: Send + Sync {
    async fn features_for(
        &self,
        org_id: &str,
        product_id: &str,
    ) -> Result<FraudRiskFeatures, StoreError>;
}

/// In-memory implementation of all collaborator contracts.
#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<String, Product>>,
    scans: RwLock<Vec<ScanRecord>>,
    ledger: RwLock<AuditLedger>,
    features: RwLock<HashMap<String, FraudRiskFeatures>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product record.
    pub async fn insert_product(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.product_id.clone(), product);
    }

    /// Seed fraud features for an organization.
    pub async fn insert_features(&self, org_id: impl Into<String>, features: FraudRiskFeatures) {
        self.features.write().await.insert(org_id.into(), features);
    }

    /// Number of recorded scans, across all products.
    pub async fn scan_count(&self) -> usize {
        self.scans.read().await.len()
    }

    /// Snapshot of the audit ledger.
    pub async fn ledger(&self) -> AuditLedger {
        self.ledger.read().await.clone()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get_product(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.read().await.get(product_id).cloned())
    }
}

#[async_trait]
impl ScanHistoryStore for MemoryStore {
    async fn recent_scans(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, StoreError> {
        let scans = self.scans.read().await;
        let mut matching: Vec<ScanRecord> = scans
            .iter()
            .filter(|s| s.product_id == product_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn verifier_scan_count_since(
        &self,
        verifier_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let scans = self.scans.read().await;
        Ok(scans
            .iter()
            .filter(|s| s.verifier_id == verifier_id && s.timestamp > since)
            .count())
    }
}

#[async_trait]
impl VerificationSink for MemoryStore {
    async fn append_scan(&self, record: ScanRecord) -> Result<(), StoreError> {
        self.scans.write().await.push(record);
        Ok(())
    }

    async fn append_audit(
        &self,
        transaction: AuditTransaction,
    ) -> Result<TransactionReceipt, AuditError> {
        let mut ledger = self.ledger.write().await;
        Ok(ledger.append(transaction).receipt())
    }
}

#[async_trait]
impl FraudFeatureSource for MemoryStore {
    async fn features_for(
        &self,
        org_id: &str,
        _product_id: &str,
    ) -> Result<FraudRiskFeatures, StoreError> {
        Ok(self
            .features
            .read()
            .await
            .get(org_id)
            .cloned()
            .unwrap_or_default())
    }
}
