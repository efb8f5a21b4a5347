//! Deposit Reveal
//!
//! Registers a funding output as a deposit so a later sweep can consume it.
//! The amount is read from the funding transaction itself; the depositor
//! only names the output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{SettlementState, Transition};
use crate::btc::tx_vector::{extract_output_at, extract_value};
use crate::btc::{BitcoinTxInfo, CodecError};
use crate::types::{
    DepositKey, DepositParams, DepositRecord, ExtraData, Identity, PubKeyHash, SettlementEvent,
    SettlementParams, WalletState, RESERVATION_TAG,
};

/// Reveal errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevealError {
    #[error("malformed funding transaction: {0}")]
    Codec(#[from] CodecError),

    #[error("wallet {wallet} is {state}, deposits need a live wallet")]
    WalletNotLive {
        wallet: PubKeyHash,
        state: WalletState,
    },

    #[error("vault {0} is not trusted")]
    UntrustedVault(Identity),

    #[error("extra data value is reserved for reservation-backed deposits")]
    ReservedExtraData,

    #[error("deposit {0} already revealed")]
    AlreadyRevealed(DepositKey),

    #[error("deposit amount {amount} below dust threshold {threshold}")]
    BelowDustThreshold { amount: u64, threshold: u64 },
}

impl RevealError {
    pub fn code(&self) -> &'static str {
        match self {
            RevealError::Codec(e) => e.code(),
            RevealError::WalletNotLive { .. } => "WALLET_NOT_LIVE",
            RevealError::UntrustedVault(_) => "VAULT_NOT_TRUSTED",
            RevealError::ReservedExtraData => "RESERVED_EXTRA_DATA",
            RevealError::AlreadyRevealed(_) => "DEPOSIT_ALREADY_REVEALED",
            RevealError::BelowDustThreshold { .. } => "DEPOSIT_BELOW_DUST",
        }
    }
}

/// Funding output being revealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingReveal {
    pub funding_tx: BitcoinTxInfo,
    pub funding_output_index: u32,
    /// Wallet the funding output pays into
    pub wallet_pubkey_hash: PubKeyHash,
    #[serde(default)]
    pub vault: Option<Identity>,
}

impl FundingReveal {
    /// Key the revealed deposit will be stored under
    pub fn deposit_key(&self) -> DepositKey {
        DepositKey::from_outpoint(&self.funding_tx.hash(), self.funding_output_index)
    }
}

/// Ordinary reveal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealRequest {
    #[serde(flatten)]
    pub funding: FundingReveal,
    #[serde(default)]
    pub extra_data: Option<ExtraData>,
}

/// Build the deposit record for a funding output after checking every
/// reveal precondition. Reservation-tagged deposits carry no treasury fee.
pub(crate) fn build_deposit(
    state: &SettlementState,
    params: &DepositParams,
    depositor: &Identity,
    funding: &FundingReveal,
    extra_data: Option<ExtraData>,
    now: u64,
) -> Result<DepositRecord, RevealError> {
    let wallet = funding.wallet_pubkey_hash;
    let wallet_state = state.wallet_state(&wallet);
    if !wallet_state.accepts_deposits() {
        return Err(RevealError::WalletNotLive {
            wallet,
            state: wallet_state,
        });
    }

    if let Some(vault) = &funding.vault {
        if !state.is_trusted_vault(vault) {
            return Err(RevealError::UntrustedVault(vault.clone()));
        }
    }

    let funding_tx_hash = funding.funding_tx.hash();
    let key = DepositKey::from_outpoint(&funding_tx_hash, funding.funding_output_index);
    if state.deposits.contains_key(&key) {
        return Err(RevealError::AlreadyRevealed(key));
    }

    let output = extract_output_at(
        &funding.funding_tx.output_vector,
        funding.funding_output_index as u64,
    )?;
    let amount = extract_value(output)?;
    if amount < params.dust_threshold {
        return Err(RevealError::BelowDustThreshold {
            amount,
            threshold: params.dust_threshold,
        });
    }

    let treasury_fee = if extra_data == Some(RESERVATION_TAG) || params.treasury_fee_divisor == 0 {
        0
    } else {
        amount / params.treasury_fee_divisor
    };

    Ok(DepositRecord {
        key,
        funding_tx_hash,
        funding_output_index: funding.funding_output_index,
        depositor: depositor.clone(),
        wallet_pubkey_hash: wallet,
        amount,
        revealed_at: now,
        swept_at: 0,
        vault: funding.vault.clone(),
        treasury_fee,
        extra_data,
    })
}

pub(crate) fn revealed_event(record: &DepositRecord) -> SettlementEvent {
    SettlementEvent::DepositRevealed {
        key: record.key,
        funding_tx_hash: record.funding_tx_hash,
        funding_output_index: record.funding_output_index,
        depositor: record.depositor.clone(),
        wallet_pubkey_hash: record.wallet_pubkey_hash,
        amount: record.amount,
        vault: record.vault.clone(),
        treasury_fee: record.treasury_fee,
        reserved: record.is_reserved(),
    }
}

/// Reveal an ordinary deposit on behalf of `depositor`
pub fn reveal(
    state: &SettlementState,
    params: &SettlementParams,
    depositor: &Identity,
    request: &RevealRequest,
    now: u64,
) -> Result<Transition<DepositKey>, RevealError> {
    if request.extra_data == Some(RESERVATION_TAG) {
        return Err(RevealError::ReservedExtraData);
    }

    let record = build_deposit(
        state,
        &params.deposit,
        depositor,
        &request.funding,
        request.extra_data,
        now,
    )?;
    let key = record.key;
    let event = revealed_event(&record);

    let mut next = state.clone();
    next.deposits.insert(key, record);

    let mut transition = Transition::new(next, key);
    transition.events.push(event);
    Ok(transition)
}
