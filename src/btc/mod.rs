//! Bitcoin Primitives
//!
//! Hashing, input/output vector decoding, header relays and transaction
//! proof validation.

pub mod hash;
pub mod proof;
pub mod relay;
pub mod tx_vector;

pub use proof::{MerkleProofValidator, ProofError, ProofValidator, Sibling, SpvProof};
pub use relay::{EsploraRelay, HeaderRelay, MemoryHeaderRelay, RelayError, RelayedHeader};
pub use tx_vector::{BitcoinTxInfo, CodecError, CodecResult, ParsedInput};
