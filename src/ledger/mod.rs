//! Balance Ledger
//!
//! The token ledger the settlement core credits and debits. Only five
//! primitives are consumed; everything the core does to balances is
//! expressed as a batch of [`LedgerOp`]s so it can be dry-run before the
//! state commit and applied atomically after it.
//!
//! Operations without an explicit source act on the bridge account.
//!
//! A dry run reports the balances the batch would leave on every account it
//! touches; the service persists those next to the state so a restarted
//! ledger can be restored to them.

pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Identity;

pub use memory::MemoryLedger;

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient balance for {account}: has {balance}, needs {required}")]
    InsufficientBalance {
        account: Identity,
        balance: u64,
        required: u64,
    },

    #[error("balance overflow for {0}")]
    Overflow(Identity),

    #[error("recipient/amount length mismatch: {recipients} recipients, {amounts} amounts")]
    LengthMismatch { recipients: usize, amounts: usize },
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::Overflow(_) => "BALANCE_OVERFLOW",
            LedgerError::LengthMismatch { .. } => "LEDGER_LENGTH_MISMATCH",
        }
    }
}

/// Result type for ledger calls
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Balance of one account after a batch
pub type BalanceUpdate = (Identity, u64);

/// One ledger call issued by a settlement operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    /// Mint to one recipient
    IncreaseBalance { recipient: Identity, amount: u64 },
    /// Mint to many recipients (vault batching)
    IncreaseBalances {
        recipients: Vec<Identity>,
        amounts: Vec<u64>,
    },
    /// Burn from the bridge account
    DecreaseBalance { amount: u64 },
    /// Pay from the bridge account
    TransferBalance { to: Identity, amount: u64 },
    /// Move balance between two accounts
    TransferBalanceFrom {
        from: Identity,
        to: Identity,
        amount: u64,
    },
}

/// Ledger primitives consumed by the settlement core
pub trait Ledger: Send + Sync {
    /// Account that holds the liquidation-bonus pool and burns redeemed balances
    fn bridge(&self) -> &Identity;

    fn balance_of(&self, account: &Identity) -> u64;

    fn increase_balance(&mut self, recipient: &Identity, amount: u64) -> LedgerResult<()>;

    fn increase_balances(&mut self, recipients: &[Identity], amounts: &[u64]) -> LedgerResult<()>;

    fn decrease_balance(&mut self, amount: u64) -> LedgerResult<()>;

    fn transfer_balance(&mut self, to: &Identity, amount: u64) -> LedgerResult<()>;

    fn transfer_balance_from(&mut self, from: &Identity, to: &Identity, amount: u64)
        -> LedgerResult<()>;

    /// Dry-run a batch; returns the resulting balance of every account it
    /// changes, ordered by account
    fn preview_batch(&self, ops: &[LedgerOp]) -> LedgerResult<Vec<BalanceUpdate>>;

    /// Apply a batch; either every op lands or none does
    fn apply_batch(&mut self, ops: &[LedgerOp]) -> LedgerResult<()>;

    /// Overwrite balances with persisted ones
    fn restore(&mut self, balances: &[BalanceUpdate]);

    /// Dispatch one op to its primitive
    fn apply_op(&mut self, op: &LedgerOp) -> LedgerResult<()> {
        match op {
            LedgerOp::IncreaseBalance { recipient, amount } => {
                self.increase_balance(recipient, *amount)
            }
            LedgerOp::IncreaseBalances {
                recipients,
                amounts,
            } => self.increase_balances(recipients, amounts),
            LedgerOp::DecreaseBalance { amount } => self.decrease_balance(*amount),
            LedgerOp::TransferBalance { to, amount } => self.transfer_balance(to, *amount),
            LedgerOp::TransferBalanceFrom { from, to, amount } => {
                self.transfer_balance_from(from, to, *amount)
            }
        }
    }
}
