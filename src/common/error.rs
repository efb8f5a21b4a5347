//! Common Error Types for the Settlement Service
//!
//! Every module error rolls up into [`SettlementError`], which carries a
//! stable code and a category used by the API layer.

use serde::Serialize;
use thiserror::Error;

use crate::btc::{CodecError, ProofError, RelayError};
use crate::ledger::LedgerError;
use crate::settlement::{ReservationError, RevealError, SweepError, WalletError};
use crate::storage::StorageError;

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input could not be decoded or is structurally wrong
    Malformed,
    /// Referenced record does not exist
    NotFound,
    /// Named precondition failed; retrying later may succeed
    Precondition,
    /// Sweep spends an input that is neither a deposit nor the main UTXO
    UnknownInput,
    /// Internal accounting invariant would be broken
    Invariant,
    /// Storage, configuration or IO failure
    Infrastructure,
}

/// Root error type for the settlement service
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Reveal(#[from] RevealError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Reservation(#[from] ReservationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Storage errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn codec_category(_: &CodecError) -> ErrorCategory {
    ErrorCategory::Malformed
}

fn proof_category(e: &ProofError) -> ErrorCategory {
    match e {
        ProofError::InsufficientConfirmations { .. } => ErrorCategory::Precondition,
        ProofError::MerkleMismatch | ProofError::PathTooLong(_) | ProofError::AmbiguousLength => {
            ErrorCategory::Malformed
        }
        ProofError::Relay(RelayError::BlockNotFound(_) | RelayError::NotInBestChain(_)) => {
            ErrorCategory::Precondition
        }
        ProofError::Relay(RelayError::Http(_) | RelayError::Parse(_)) => {
            ErrorCategory::Infrastructure
        }
    }
}

fn ledger_category(e: &LedgerError) -> ErrorCategory {
    match e {
        LedgerError::InsufficientBalance { .. } => ErrorCategory::Precondition,
        LedgerError::Overflow(_) | LedgerError::LengthMismatch { .. } => ErrorCategory::Invariant,
    }
}

fn reveal_category(e: &RevealError) -> ErrorCategory {
    match e {
        RevealError::Codec(c) => codec_category(c),
        _ => ErrorCategory::Precondition,
    }
}

fn reservation_category(e: &ReservationError) -> ErrorCategory {
    match e {
        ReservationError::Reveal(r) => reveal_category(r),
        ReservationError::NotFound(_) => ErrorCategory::NotFound,
        ReservationError::Unbalanced(_) | ReservationError::ExpiryOverflow => {
            ErrorCategory::Invariant
        }
        _ => ErrorCategory::Precondition,
    }
}

fn sweep_category(e: &SweepError) -> ErrorCategory {
    match e {
        SweepError::Codec(c) => codec_category(c),
        SweepError::Proof(p) => proof_category(p),
        SweepError::Reservation(r) => reservation_category(r),
        SweepError::UnknownInput { .. } => ErrorCategory::UnknownInput,
        SweepError::OutputCount(_)
        | SweepError::OutputWalletMismatch { .. }
        | SweepError::OutputExceedsInputs { .. } => ErrorCategory::Malformed,
        SweepError::ValueOverflow => ErrorCategory::Invariant,
        _ => ErrorCategory::Precondition,
    }
}

impl SettlementError {
    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            SettlementError::Config(_) => "CONFIG_ERROR",
            SettlementError::Logging(_) => "LOGGING_ERROR",
            SettlementError::Codec(e) => e.code(),
            SettlementError::Proof(e) => e.code(),
            SettlementError::Wallet(e) => e.code(),
            SettlementError::Reveal(e) => e.code(),
            SettlementError::Sweep(e) => e.code(),
            SettlementError::Reservation(e) => e.code(),
            SettlementError::Ledger(e) => e.code(),
            SettlementError::Storage(e) => e.code(),
            SettlementError::Io(_) => "IO_ERROR",
        }
    }

    /// Taxonomy bucket of this failure
    pub fn category(&self) -> ErrorCategory {
        match self {
            SettlementError::Codec(e) => codec_category(e),
            SettlementError::Proof(e) => proof_category(e),
            SettlementError::Wallet(WalletError::UnknownWallet(_)) => ErrorCategory::NotFound,
            SettlementError::Wallet(_) => ErrorCategory::Precondition,
            SettlementError::Reveal(e) => reveal_category(e),
            SettlementError::Sweep(e) => sweep_category(e),
            SettlementError::Reservation(e) => reservation_category(e),
            SettlementError::Ledger(e) => ledger_category(e),
            SettlementError::Config(_)
            | SettlementError::Logging(_)
            | SettlementError::Storage(_)
            | SettlementError::Io(_) => ErrorCategory::Infrastructure,
        }
    }
}

/// Result type alias using SettlementError
pub type Result<T> = std::result::Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DepositKey, TxHash};

    #[test]
    fn test_codes_pass_through() {
        let err: SettlementError = SweepError::NoDeposits.into();
        assert_eq!(err.error_code(), "SWEEP_WITHOUT_DEPOSITS");
        assert_eq!(err.category(), ErrorCategory::Precondition);

        let err: SettlementError = SweepError::Codec(CodecError::EmptyVarInt).into();
        assert_eq!(err.error_code(), "INVALID_VARINT");
        assert_eq!(err.category(), ErrorCategory::Malformed);
    }

    #[test]
    fn test_categories() {
        let unknown: SettlementError = SweepError::UnknownInput {
            tx_hash: TxHash([1; 32]),
            index: 0,
        }
        .into();
        assert_eq!(unknown.category(), ErrorCategory::UnknownInput);

        let missing: SettlementError = ReservationError::NotFound(DepositKey([2; 32])).into();
        assert_eq!(missing.category(), ErrorCategory::NotFound);

        let storage: SettlementError = StorageError::Database("locked".into()).into();
        assert_eq!(storage.category(), ErrorCategory::Infrastructure);
        assert_eq!(storage.error_code(), "STORAGE_DATABASE");
    }

    #[test]
    fn test_relay_failures() {
        let unknown: SettlementError =
            SweepError::Proof(RelayError::BlockNotFound("00".into()).into()).into();
        assert_eq!(unknown.error_code(), "PROOF_UNKNOWN_BLOCK");
        assert_eq!(unknown.category(), ErrorCategory::Precondition);

        let down: SettlementError = ProofError::Relay(RelayError::Http("timeout".into())).into();
        assert_eq!(down.error_code(), "PROOF_RELAY_UNAVAILABLE");
        assert_eq!(down.category(), ErrorCategory::Infrastructure);
    }
}
