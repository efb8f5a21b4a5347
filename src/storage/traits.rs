//! Storage Trait Definitions
//!
//! Persistence for the materialized settlement state, its event log and the
//! ledger balances the committed ledger batches left behind.
//! Implementations can use SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::ledger::BalanceUpdate;
use crate::settlement::state::{SettlementState, StateDelta};
use crate::types::{DepositKey, DepositRecord, Identity, LoggedEvent, ReservationRecord};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl StorageError {
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Duplicate(_) => "STORAGE_DUPLICATE",
            StorageError::Database(_) => "STORAGE_DATABASE",
            StorageError::InvalidData(_) => "STORAGE_INVALID_DATA",
            StorageError::Connection(_) => "STORAGE_CONNECTION",
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Settlement state storage interface
///
/// Implementations:
/// - `SqliteStore` - Production storage with SQLite
/// - `MemoryStore` - In-memory storage for testing
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Persist a state delta, the events that produced it and the balances
    /// its ledger batch leaves, all or nothing
    async fn commit(
        &self,
        delta: &StateDelta,
        events: &[LoggedEvent],
        balances: &[BalanceUpdate],
    ) -> StorageResult<()>;

    /// Load the full state and event log (events ordered by sequence)
    async fn load(&self) -> StorageResult<(SettlementState, Vec<LoggedEvent>)>;

    /// Every persisted ledger balance, ordered by account
    async fn load_balances(&self) -> StorageResult<Vec<BalanceUpdate>>;

    /// Get a deposit by key
    async fn get_deposit(&self, key: &DepositKey) -> StorageResult<Option<DepositRecord>>;

    /// Get a reservation by UTXO hash
    async fn get_reservation(&self, utxo_hash: &DepositKey)
        -> StorageResult<Option<ReservationRecord>>;

    /// Reservations of a depositor, in creation order
    async fn reservations_by_depositor(
        &self,
        depositor: &Identity,
    ) -> StorageResult<Vec<ReservationRecord>>;

    /// Events with `seq > after`
    async fn events_since(&self, after: u64) -> StorageResult<Vec<LoggedEvent>>;
}
