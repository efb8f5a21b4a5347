//! Deposit Types
//!
//! One record per revealed deposit, keyed by the funding outpoint hash.
//! A record moves `revealed → swept` exactly once.

use serde::{Deserialize, Serialize};

use super::primitives::{DepositKey, ExtraData, Identity, PubKeyHash, TxHash, RESERVATION_TAG};

/// Settlement status of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Revealed, waiting to be swept
    Revealed,
    /// Consumed by a sweep transaction
    Swept,
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revealed => write!(f, "revealed"),
            Self::Swept => write!(f, "swept"),
        }
    }
}

/// A revealed deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// `sha256(funding_tx_hash || funding_output_index)`
    pub key: DepositKey,
    pub funding_tx_hash: TxHash,
    pub funding_output_index: u32,
    /// Owner of the credited balance
    pub depositor: Identity,
    /// Wallet the deposit was revealed to
    pub wallet_pubkey_hash: PubKeyHash,
    /// Satoshis read from the funding output at reveal time
    pub amount: u64,
    pub revealed_at: u64,
    /// Zero until swept
    pub swept_at: u64,
    /// Optional routing target for the settled balance
    pub vault: Option<Identity>,
    /// Satoshis owed to the treasury, fixed at reveal (zero for reserved deposits)
    pub treasury_fee: u64,
    pub extra_data: Option<ExtraData>,
}

impl DepositRecord {
    pub fn status(&self) -> DepositStatus {
        if self.swept_at == 0 {
            DepositStatus::Revealed
        } else {
            DepositStatus::Swept
        }
    }

    pub fn is_swept(&self) -> bool {
        self.swept_at != 0
    }

    /// Whether this deposit backs a reservation
    pub fn is_reserved(&self) -> bool {
        self.extra_data == Some(RESERVATION_TAG)
    }
}

/// Read-only view returned by deposit status queries
#[derive(Debug, Clone, Serialize)]
pub struct DepositStatusResponse {
    pub key: DepositKey,
    pub status: DepositStatus,
    pub depositor: Identity,
    pub amount: u64,
    pub treasury_fee: u64,
    pub vault: Option<Identity>,
    pub reserved: bool,
    pub revealed_at: u64,
    pub swept_at: u64,
}

impl From<&DepositRecord> for DepositStatusResponse {
    fn from(record: &DepositRecord) -> Self {
        Self {
            key: record.key,
            status: record.status(),
            depositor: record.depositor.clone(),
            amount: record.amount,
            treasury_fee: record.treasury_fee,
            vault: record.vault.clone(),
            reserved: record.is_reserved(),
            revealed_at: record.revealed_at,
            swept_at: record.swept_at,
        }
    }
}
