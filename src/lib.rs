//! BTC Settlement - Sweep Settlement and Reserved Deposits
//!
//! Settles Bitcoin deposits swept by a custodial wallet into balances on a
//! token ledger, and runs the reserved-deposit lifecycle on top of it.
//!
//! ## Components
//!
//! 1. **Transaction vectors** - compact-size input/output vector decoding
//! 2. **Proofs** - merkle inclusion checked against headers from a trusted
//!    relay
//! 3. **Sweep settlement** - validates a proven sweep, splits its fee and
//!    credits every swept deposit exactly once
//! 4. **Reservations** - reserve a funding UTXO for a fixed window, then
//!    redeem it before expiry or liquidate it after
//!
//! Operations are pure `(state, command) -> Transition`; the
//! [`SettlementService`] commits transitions to storage and the ledger.

pub mod api;
pub mod btc;
pub mod common;
pub mod ledger;
pub mod settlement;
pub mod storage;
pub mod types;

// Re-exports: errors and config
pub use common::{ErrorCategory, Result, SettlementConfig, SettlementError};

// Re-exports: Bitcoin primitives
pub use btc::{
    BitcoinTxInfo, CodecError, EsploraRelay, HeaderRelay, MemoryHeaderRelay, MerkleProofValidator,
    ProofError, ProofValidator, RelayError, RelayedHeader, SpvProof,
};

// Re-exports: settlement core
pub use settlement::{
    create_shared_service, FundingReveal, ReservationError, ReserveRequest, RevealError,
    RevealRequest, SettlementService, SettlementState, SharedSettlement, SweepError,
    SweepOutcome, SweepRequest, Transition,
};

// Re-exports: ledger and storage
pub use ledger::{BalanceUpdate, Ledger, LedgerError, LedgerOp, MemoryLedger};
pub use storage::{MemoryStore, SettlementStore, SqliteStore, StorageError};
