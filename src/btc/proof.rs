//! Transaction Proof Validation
//!
//! The settlement core only consumes `validate_proof(tx, proof) -> tx_hash`.
//! A proof names the block holding the transaction and the merkle path to
//! it; the block's merkle root and depth come from a [`HeaderRelay`], never
//! from the proof itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::hash::double_sha256_pair;
use super::relay::{HeaderRelay, RelayError};
use super::tx_vector::BitcoinTxInfo;
use crate::types::TxHash;

/// Proof validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("merkle path does not lead to the relayed merkle root")]
    MerkleMismatch,

    #[error("insufficient confirmations: {got} < {required}")]
    InsufficientConfirmations { got: u32, required: u32 },

    #[error("merkle path too long: {0} levels")]
    PathTooLong(usize),

    #[error("64-byte transactions cannot be proven")]
    AmbiguousLength,

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ProofError {
    pub fn code(&self) -> &'static str {
        match self {
            ProofError::MerkleMismatch => "PROOF_INVALID",
            ProofError::InsufficientConfirmations { .. } => "PROOF_INSUFFICIENT_CONFIRMATIONS",
            ProofError::PathTooLong(_) | ProofError::AmbiguousLength => "PROOF_INVALID",
            ProofError::Relay(e) => e.code(),
        }
    }
}

/// Inclusion proof for a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpvProof {
    /// Hash of the block containing the transaction (internal byte order)
    #[serde(with = "hex::serde")]
    pub block_hash: [u8; 32],
    /// Sibling hashes from leaf to root
    pub siblings: Vec<Sibling>,
    /// Position of the transaction in the block
    pub tx_index: u32,
}

/// One sibling hash in a merkle path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sibling(#[serde(with = "hex::serde")] pub [u8; 32]);

/// Upstream proof check consumed by the settlement core
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProofValidator: Send + Sync {
    /// Validate that `tx` is confirmed and return its hash
    async fn validate_proof(&self, tx: &BitcoinTxInfo, proof: &SpvProof)
        -> Result<TxHash, ProofError>;
}

/// Merkle-inclusion validator over relayed headers with a minimum
/// confirmation depth
pub struct MerkleProofValidator {
    relay: Arc<dyn HeaderRelay>,
    required_confirmations: u32,
}

impl MerkleProofValidator {
    pub fn new(relay: Arc<dyn HeaderRelay>, required_confirmations: u32) -> Self {
        Self {
            relay,
            required_confirmations,
        }
    }

    /// Compute the merkle root implied by a leaf and its path
    pub fn compute_root(leaf: &[u8; 32], siblings: &[Sibling], tx_index: u32) -> [u8; 32] {
        let mut current = *leaf;
        let mut pos = tx_index;

        for sibling in siblings {
            current = if pos % 2 == 1 {
                double_sha256_pair(&sibling.0, &current)
            } else {
                double_sha256_pair(&current, &sibling.0)
            };
            pos /= 2;
        }

        current
    }
}

/// Depth of a block at `height` under `tip`; 0 when above the tip
fn confirmations(tip: u64, height: u64) -> u32 {
    match tip.checked_sub(height) {
        Some(depth) => u32::try_from(depth.saturating_add(1)).unwrap_or(u32::MAX),
        None => 0,
    }
}

#[async_trait]
impl ProofValidator for MerkleProofValidator {
    async fn validate_proof(
        &self,
        tx: &BitcoinTxInfo,
        proof: &SpvProof,
    ) -> Result<TxHash, ProofError> {
        if proof.siblings.len() > 32 {
            return Err(ProofError::PathTooLong(proof.siblings.len()));
        }
        // a 64-byte transaction serializes like an inner merkle node
        if tx.serialized_len() == 64 {
            return Err(ProofError::AmbiguousLength);
        }

        let header = self.relay.header(&proof.block_hash).await?;
        let tip = self.relay.tip_height().await?;

        let got = confirmations(tip, header.height);
        if got < self.required_confirmations {
            return Err(ProofError::InsufficientConfirmations {
                got,
                required: self.required_confirmations,
            });
        }

        let tx_hash = tx.hash();
        let root = Self::compute_root(&tx_hash.0, &proof.siblings, proof.tx_index);
        if root != header.merkle_root {
            return Err(ProofError::MerkleMismatch);
        }

        Ok(tx_hash)
    }
}
