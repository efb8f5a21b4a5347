//! Settlement Events
//!
//! Every committed command emits one or more events. Events are appended to
//! the log with a monotonically increasing sequence number.

use serde::{Deserialize, Serialize};

use super::primitives::{DepositKey, Identity, PubKeyHash, TxHash};
use super::wallet::{MainUtxo, WalletState};

/// Domain event emitted by a committed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    DepositRevealed {
        key: DepositKey,
        funding_tx_hash: TxHash,
        funding_output_index: u32,
        depositor: Identity,
        wallet_pubkey_hash: PubKeyHash,
        amount: u64,
        vault: Option<Identity>,
        treasury_fee: u64,
        reserved: bool,
    },

    /// One deposit consumed by a sweep
    DepositSettled {
        key: DepositKey,
        depositor: Identity,
        sweep_tx_hash: TxHash,
        /// Amount credited to the depositor (or its vault)
        credited: u64,
        fee_share: u64,
        treasury_fee: u64,
    },

    /// Summary of one accepted sweep
    DepositsSwept {
        wallet_pubkey_hash: PubKeyHash,
        sweep_tx_hash: TxHash,
        deposit_count: usize,
        total_fee: u64,
    },

    MainUtxoUpdated {
        wallet_pubkey_hash: PubKeyHash,
        main_utxo: MainUtxo,
    },

    ReservationCreated {
        utxo_hash: DepositKey,
        depositor: Identity,
        btc_amount: u64,
        tbtc_minted: u64,
        treasury_fee: u64,
        liquidation_bonus: u64,
        expiry_timestamp: u64,
    },

    ReservationActivated {
        utxo_hash: DepositKey,
        sweep_fee: u64,
        tbtc_minted: u64,
    },

    ReservationRedeemed {
        utxo_hash: DepositKey,
        redeemer: Identity,
        tbtc_burned: u64,
        liquidation_bonus: u64,
    },

    ReservationLiquidated {
        utxo_hash: DepositKey,
        liquidator: Identity,
        liquidation_bonus: u64,
    },

    PriorityRedemptionRequested {
        utxo_hash: DepositKey,
        wallet_pubkey_hash: PubKeyHash,
        requested_amount: u64,
        fee_allowance: u64,
    },

    WalletRegistered {
        wallet_pubkey_hash: PubKeyHash,
        state: WalletState,
    },

    WalletStateChanged {
        wallet_pubkey_hash: PubKeyHash,
        from: WalletState,
        to: WalletState,
    },

    VaultStatusUpdated {
        vault: Identity,
        trusted: bool,
    },
}

impl SettlementEvent {
    /// Stable event name, matching the serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DepositRevealed { .. } => "deposit_revealed",
            Self::DepositSettled { .. } => "deposit_settled",
            Self::DepositsSwept { .. } => "deposits_swept",
            Self::MainUtxoUpdated { .. } => "main_utxo_updated",
            Self::ReservationCreated { .. } => "reservation_created",
            Self::ReservationActivated { .. } => "reservation_activated",
            Self::ReservationRedeemed { .. } => "reservation_redeemed",
            Self::ReservationLiquidated { .. } => "reservation_liquidated",
            Self::PriorityRedemptionRequested { .. } => "priority_redemption_requested",
            Self::WalletRegistered { .. } => "wallet_registered",
            Self::WalletStateChanged { .. } => "wallet_state_changed",
            Self::VaultStatusUpdated { .. } => "vault_status_updated",
        }
    }
}

/// Event as stored in the append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub seq: u64,
    /// Unix seconds at commit
    pub at: u64,
    #[serde(flatten)]
    pub event: SettlementEvent,
}
