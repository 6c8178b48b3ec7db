//! Hash chain over ledger records
//!
//! Each record's hash covers its serialized body and the previous
//! record's hash, so editing, dropping or reordering any record breaks
//! every hash after it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Chain position and hashes stored alongside a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// 1-based position in the ledger
    pub sequence: u64,

    /// Hash of the preceding record, `None` for the first
    pub previous_hash: Option<String>,

    /// Hash of this record
    pub hash: String,
}

/// Running head of a hash chain
#[derive(Debug, Clone, Default)]
pub struct HashChain {
    sequence: u64,
    head: Option<String>,
}

impl HashChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a chain from the last link already written
    pub fn resume(last: &ChainLink) -> Self {
        Self {
            sequence: last.sequence,
            head: Some(last.hash.clone()),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Compute the link for the next record without advancing
    pub fn next_link(&self, payload: &[u8]) -> ChainLink {
        let sequence = self.sequence + 1;
        ChainLink {
            sequence,
            previous_hash: self.head.clone(),
            hash: compute_hash(sequence, payload, self.head.as_deref()),
        }
    }

    /// Advance past a link once its record is durably written
    pub fn advance(&mut self, link: &ChainLink) {
        self.sequence = link.sequence;
        self.head = Some(link.hash.clone());
    }

    /// Check that `link` correctly follows the current head
    pub fn verify_next(&self, payload: &[u8], link: &ChainLink) -> bool {
        link.sequence == self.sequence + 1
            && link.previous_hash.as_deref() == self.head.as_deref()
            && link.hash == compute_hash(link.sequence, payload, self.head.as_deref())
    }
}

fn compute_hash(sequence: u64, payload: &[u8], previous: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(payload);
    if let Some(prev) = previous {
        hasher.update(prev.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_verifies_in_order() {
        let mut chain = HashChain::new();
        let a = chain.next_link(b"first");
        chain.advance(&a);
        let b = chain.next_link(b"second");

        let mut check = HashChain::new();
        assert!(check.verify_next(b"first", &a));
        check.advance(&a);
        assert!(check.verify_next(b"second", &b));
        assert_eq!(b.previous_hash.as_deref(), Some(a.hash.as_str()));
    }

    #[test]
    fn test_tampered_payload_detected() {
        let chain = HashChain::new();
        let link = chain.next_link(b"original");
        assert!(!HashChain::new().verify_next(b"tampered", &link));
    }

    #[test]
    fn test_resume_continues_sequence() {
        let mut chain = HashChain::new();
        let a = chain.next_link(b"a");
        chain.advance(&a);

        let resumed = HashChain::resume(&a);
        assert_eq!(resumed.sequence(), 1);
        assert_eq!(resumed.next_link(b"b"), chain.next_link(b"b"));
    }
}
