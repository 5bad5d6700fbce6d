//! Receipt side channel.
//!
//! A `Ledger` certifies individual writes: after a statement has executed the
//! store hands the ledger a canonical `WriteRequest` and gets a `Receipt` back.
//! `HashChainLedger` is the in-process implementation; every receipt links to
//! the one before it, so rewriting history breaks the chain.

use async_trait::async_trait;
use chrono::Utc;
use domain::{Receipt, RequestHash};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::warn;

/// One write as the ledger sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRequest {
    pub statement: String,
    pub params: Vec<String>,
}

impl WriteRequest {
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Certifies a write that has already executed. `None` means no receipt
    /// was produced and the write must not be committed.
    async fn record(&self, request: &WriteRequest) -> Option<Receipt>;

    /// Whether a receipt with this hash was ever issued.
    async fn contains(&self, hash: &RequestHash) -> bool;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("receipt chain broken at sequence {sequence}")]
    BrokenLink { sequence: u64 },
}

struct Entry {
    request: Vec<u8>,
    receipt: Receipt,
}

#[derive(Default)]
struct Chain {
    entries: Vec<Entry>,
    index: HashMap<RequestHash, usize>,
}

pub struct HashChainLedger {
    genesis: RequestHash,
    chain: Mutex<Chain>,
}

impl HashChainLedger {
    pub fn new(genesis_seed: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(genesis_seed.as_bytes()).into();
        Self {
            genesis: RequestHash::from_bytes(digest),
            chain: Mutex::new(Chain::default()),
        }
    }

    pub fn genesis(&self) -> RequestHash {
        self.genesis
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up an issued receipt by hash, for auditing a stored
    /// `request_hash` against its position in the chain.
    pub fn receipt(&self, hash: &RequestHash) -> Option<Receipt> {
        let chain = self.lock();
        chain
            .index
            .get(hash)
            .map(|&pos| chain.entries[pos].receipt.clone())
    }

    /// Recomputes every link from genesis. Returns the chain length.
    pub fn verify_chain(&self) -> Result<u64, LedgerError> {
        let chain = self.lock();
        let mut previous = self.genesis;
        for (pos, entry) in chain.entries.iter().enumerate() {
            let sequence = pos as u64 + 1;
            let receipt = &entry.receipt;
            if receipt.sequence != sequence
                || receipt.previous_hash != previous
                || link_hash(&previous, sequence, &entry.request) != receipt.request_hash
            {
                return Err(LedgerError::BrokenLink { sequence });
            }
            previous = receipt.request_hash;
        }
        Ok(chain.entries.len() as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Ledger for HashChainLedger {
    async fn record(&self, request: &WriteRequest) -> Option<Receipt> {
        let bytes = match request.canonical_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode write request");
                return None;
            }
        };

        let mut chain = self.lock();
        let previous_hash = chain
            .entries
            .last()
            .map_or(self.genesis, |e| e.receipt.request_hash);
        let sequence = chain.entries.len() as u64 + 1;
        let receipt = Receipt {
            sequence,
            request_hash: link_hash(&previous_hash, sequence, &bytes),
            previous_hash,
            recorded_at: Utc::now().naive_utc(),
        };

        let pos = chain.entries.len();
        chain.index.insert(receipt.request_hash, pos);
        chain.entries.push(Entry {
            request: bytes,
            receipt: receipt.clone(),
        });
        Some(receipt)
    }

    async fn contains(&self, hash: &RequestHash) -> bool {
        self.lock().index.contains_key(hash)
    }
}

fn link_hash(previous: &RequestHash, sequence: u64, request: &[u8]) -> RequestHash {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(sequence.to_be_bytes());
    hasher.update(request);
    RequestHash::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> WriteRequest {
        WriteRequest {
            statement: "INSERT INTO comments (content) VALUES (?)".to_string(),
            params: vec![content.to_string()],
        }
    }

    #[tokio::test]
    async fn test_receipts_form_a_chain() {
        let ledger = HashChainLedger::new("seed");
        assert!(ledger.is_empty());

        let first = ledger.record(&request("a")).await.unwrap();
        let second = ledger.record(&request("b")).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(first.previous_hash, ledger.genesis());
        assert_eq!(second.sequence, 2);
        assert_eq!(second.previous_hash, first.request_hash);
        assert_ne!(first.request_hash, second.request_hash);

        assert!(ledger.contains(&first.request_hash).await);
        assert_eq!(ledger.receipt(&second.request_hash), Some(second));
        assert_eq!(ledger.verify_chain(), Ok(2));
    }

    #[tokio::test]
    async fn test_identical_requests_get_distinct_receipts() {
        let ledger = HashChainLedger::new("seed");
        let first = ledger.record(&request("same")).await.unwrap();
        let second = ledger.record(&request("same")).await.unwrap();
        assert_ne!(first.request_hash, second.request_hash);
    }

    #[tokio::test]
    async fn test_genesis_depends_on_seed() {
        let a = HashChainLedger::new("a");
        let b = HashChainLedger::new("b");
        assert_ne!(a.genesis(), b.genesis());

        let unknown = b.record(&request("x")).await.unwrap();
        assert!(!a.contains(&unknown.request_hash).await);
    }

    #[tokio::test]
    async fn test_tampering_is_detected() {
        let ledger = HashChainLedger::new("seed");
        for content in ["a", "b", "c"] {
            ledger.record(&request(content)).await.unwrap();
        }

        {
            let mut chain = ledger.lock();
            chain.entries[1].request = request("rewritten").canonical_bytes().unwrap();
        }

        assert_eq!(
            ledger.verify_chain(),
            Err(LedgerError::BrokenLink { sequence: 2 })
        );
    }
}
