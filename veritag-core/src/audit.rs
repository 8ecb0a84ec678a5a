//! Append-only audit ledger for verification events.
//!
//! Every completed scan appends exactly one [`AuditTransaction`], hash
//! identified and chained to its predecessor so the full ledger is
//! tamper-evident: recomputing any entry's chain hash detects edits, and
//! [`AuditLedger::verify_chain`] walks the whole ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::TransactionReceipt;

/// Transaction type recorded for verification events.
pub const TX_TYPE_VERIFY: &str = "VERIFY";

/// Ledger entry status reported in receipts.
const TX_STATUS_CONFIRMED: &str = "CONFIRMED";

/// One write-once ledger entry recording a verification event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTransaction {
    /// Deterministic identity: SHA-256 over type, ref id, timestamp, org.
    pub tx_hash: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    /// The scan this transaction records.
    pub ref_id: String,
    pub org_id: String,
    pub created_by: String,
    /// Arbitrary event payload (verdict, score, factors).
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditTransaction {
    /// Build a VERIFY transaction for a completed scan.
    pub fn verify_record(
        ref_id: impl Into<String>,
        org_id: impl Into<String>,
        created_by: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        let ref_id = ref_id.into();
        let org_id = org_id.into();
        let tx_hash = compute_tx_hash(TX_TYPE_VERIFY, &ref_id, created_at, &org_id);
        Self {
            tx_hash,
            tx_type: TX_TYPE_VERIFY.to_string(),
            ref_id,
            org_id,
            created_by: created_by.into(),
            payload,
            created_at,
        }
    }
}

/// Compute the deterministic transaction hash.
pub fn compute_tx_hash(
    tx_type: &str,
    ref_id: &str,
    timestamp: DateTime<Utc>,
    org_id: &str,
) -> String {
    let preimage = format!(
        "{tx_type}|{ref_id}|{}|{org_id}",
        timestamp.timestamp_millis()
    );
    hex_sha256(preimage.as_bytes())
}

/// A transaction bound into the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 0-based position in the ledger; doubles as the block number
    /// reported in receipts.
    pub sequence: u64,
    pub transaction: AuditTransaction,
    /// Chain hash of the previous entry (all zeros for the genesis entry).
    pub previous_hash: String,
    /// SHA-256(sequence || tx_hash || previous_hash).
    pub chain_hash: String,
}

impl LedgerEntry {
    /// The caller-facing receipt for this entry.
    pub fn receipt(&self) -> TransactionReceipt {
        TransactionReceipt {
            tx_hash: self.transaction.tx_hash.clone(),
            block_number: self.sequence,
            status: TX_STATUS_CONFIRMED.to_string(),
            tx_type: self.transaction.tx_type.clone(),
            timestamp: self.transaction.created_at,
        }
    }
}

/// Result of verifying ledger integrity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub checked_entries: usize,
    pub first_invalid: Option<u64>,
}

/// Append-only, hash-chained ledger of audit transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLedger {
    entries: Vec<LedgerEntry>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Latest chain hash, or `None` if the ledger is empty.
    pub fn root_hash(&self) -> Option<&str> {
        self.entries.last().map(|e| e.chain_hash.as_str())
    }

    /// Append a transaction, binding it to the chain.
    pub fn append(&mut self, transaction: AuditTransaction) -> &LedgerEntry {
        let sequence = self.entries.len() as u64;
        let previous_hash = self
            .entries
            .last()
            .map(|e| e.chain_hash.clone())
            .unwrap_or_else(genesis_hash);
        let chain_hash = compute_chain_hash(sequence, &transaction.tx_hash, &previous_hash);

        self.entries.push(LedgerEntry {
            sequence,
            transaction,
            previous_hash,
            chain_hash,
        });
        self.entries.last().expect("entry was just pushed")
    }

    /// Find an entry by transaction hash.
    pub fn find_by_tx_hash(&self, tx_hash: &str) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .find(|e| e.transaction.tx_hash == tx_hash)
    }

    /// All entries recorded for one organization, oldest first.
    pub fn entries_for_org(&self, org_id: &str) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.transaction.org_id == org_id)
            .collect()
    }

    /// Verify one entry's chain hash and its link to the predecessor.
    pub fn verify_entry(&self, index: usize) -> bool {
        let Some(entry) = self.entries.get(index) else {
            return false;
        };
        let expected = compute_chain_hash(
            entry.sequence,
            &entry.transaction.tx_hash,
            &entry.previous_hash,
        );
        if expected != entry.chain_hash {
            return false;
        }
        if index == 0 {
            entry.previous_hash == genesis_hash()
        } else {
            entry.previous_hash == self.entries[index - 1].chain_hash
        }
    }

    /// Verify the integrity of the entire ledger.
    pub fn verify_chain(&self) -> ChainVerification {
        for i in 0..self.entries.len() {
            if !self.verify_entry(i) {
                return ChainVerification {
                    is_valid: false,
                    checked_entries: i + 1,
                    first_invalid: Some(i as u64),
                };
            }
        }
        ChainVerification {
            is_valid: true,
            checked_entries: self.entries.len(),
            first_invalid: None,
        }
    }
}

fn genesis_hash() -> String {
    "0".repeat(64)
}

fn compute_chain_hash(sequence: u64, tx_hash: &str, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(tx_hash.as_bytes());
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
