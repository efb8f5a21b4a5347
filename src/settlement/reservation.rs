//! Reserved Deposit Lifecycle
//!
//! Creation prices the reservation and reveals the underlying deposit with
//! the reservation tag. The sweep that consumes the UTXO finalizes it
//! (charging its network fee share) and makes it active. An active
//! reservation ends exactly once: redeemed by its depositor up to and
//! including the expiry second, or liquidated by anyone after it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fees::{liquidation_bonus, storage_fee, SECONDS_PER_DAY};
use super::reveal::{build_deposit, revealed_event, FundingReveal, RevealError};
use super::state::{SettlementState, Transition};
use crate::ledger::LedgerOp;
use crate::types::{
    DepositKey, Identity, PriorityRedemption, RedemptionAddress, ReservationRecord,
    ReservationStatus, SettlementEvent, SettlementParams, RESERVATION_TAG,
};

/// Reservation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    #[error(transparent)]
    Reveal(#[from] RevealError),

    #[error("reservation days must be in 1..={max}, got {days}")]
    InvalidDays { days: u32, max: u32 },

    #[error("reservation amount {amount} below minimum {minimum}")]
    AmountTooSmall { amount: u64, minimum: u64 },

    #[error("storage fee {storage_fee} plus bonus {liquidation_bonus} leaves nothing of {amount}")]
    FeeExceedsAmount {
        storage_fee: u64,
        liquidation_bonus: u64,
        amount: u64,
    },

    #[error("utxo {0} is already reserved")]
    AlreadyReserved(DepositKey),

    #[error("reservation {0} not found")]
    NotFound(DepositKey),

    #[error("reservation {key} is {status}")]
    NotActive {
        key: DepositKey,
        status: ReservationStatus,
    },

    #[error("reservation {key} is {status} and cannot be finalized")]
    AlreadyFinalized {
        key: DepositKey,
        status: ReservationStatus,
    },

    #[error("caller {caller} is not the depositor")]
    NotDepositor { caller: Identity },

    #[error("reservation expired at {expiry}, now {now}")]
    Expired { expiry: u64, now: u64 },

    #[error("reservation expires at {expiry}, now {now}")]
    NotExpired { expiry: u64, now: u64 },

    #[error("sweep fee share {share} exhausts minted amount {tbtc_minted} of {key}")]
    SweepFeeExhausted {
        key: DepositKey,
        tbtc_minted: u64,
        share: u64,
    },

    #[error("reservation {0} violates its accounting identity")]
    Unbalanced(DepositKey),

    #[error("expiry timestamp overflows")]
    ExpiryOverflow,
}

impl ReservationError {
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::Reveal(e) => e.code(),
            ReservationError::InvalidDays { .. } => "INVALID_RESERVATION_DAYS",
            ReservationError::AmountTooSmall { .. } => "RESERVATION_AMOUNT_TOO_SMALL",
            ReservationError::FeeExceedsAmount { .. } => "STORAGE_FEE_EXCEEDS_AMOUNT",
            ReservationError::AlreadyReserved(_) => "ALREADY_RESERVED",
            ReservationError::NotFound(_) => "RESERVATION_NOT_FOUND",
            ReservationError::NotActive { .. } => "RESERVATION_NOT_ACTIVE",
            ReservationError::AlreadyFinalized { .. } => "RESERVATION_ALREADY_FINALIZED",
            ReservationError::NotDepositor { .. } => "NOT_DEPOSITOR",
            ReservationError::Expired { .. } => "RESERVATION_EXPIRED",
            ReservationError::NotExpired { .. } => "RESERVATION_NOT_EXPIRED",
            ReservationError::SweepFeeExhausted { .. } => "SWEEP_FEE_EXHAUSTS_RESERVATION",
            ReservationError::Unbalanced(_) => "RESERVATION_UNBALANCED",
            ReservationError::ExpiryOverflow => "EXPIRY_OVERFLOW",
        }
    }
}

/// Reservation request; the caller becomes the depositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    #[serde(flatten)]
    pub funding: FundingReveal,
    pub reservation_days: u32,
    pub btc_redemption_address: RedemptionAddress,
}

/// Values a sweep settles for a finalized reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizedReservation {
    pub tbtc_minted: u64,
    pub treasury_fee: u64,
    pub liquidation_bonus: u64,
}

// =============================================================================
// Create
// =============================================================================

/// Reserve a funding UTXO for `reservation_days` days
pub fn reserve(
    state: &SettlementState,
    params: &SettlementParams,
    caller: &Identity,
    request: &ReserveRequest,
    now: u64,
) -> Result<Transition<ReservationRecord>, ReservationError> {
    let pricing = &params.reservation;
    let days = request.reservation_days;
    if days == 0 || days > pricing.max_days {
        return Err(ReservationError::InvalidDays {
            days,
            max: pricing.max_days,
        });
    }

    let key = request.funding.deposit_key();
    if state.reservations.contains_key(&key) {
        return Err(ReservationError::AlreadyReserved(key));
    }

    let deposit = build_deposit(
        state,
        &params.deposit,
        caller,
        &request.funding,
        Some(RESERVATION_TAG),
        now,
    )?;

    let amount = deposit.amount;
    if amount < pricing.min_amount {
        return Err(ReservationError::AmountTooSmall {
            amount,
            minimum: pricing.min_amount,
        });
    }

    let fee = storage_fee(amount, days, pricing);
    let bonus = liquidation_bonus(fee, pricing);
    let tbtc_minted = fee
        .checked_add(bonus)
        .and_then(|charged| amount.checked_sub(charged))
        .filter(|minted| *minted > 0)
        .ok_or(ReservationError::FeeExceedsAmount {
            storage_fee: fee,
            liquidation_bonus: bonus,
            amount,
        })?;

    let expiry_timestamp = (days as u64)
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|window| now.checked_add(window))
        .ok_or(ReservationError::ExpiryOverflow)?;

    let record = ReservationRecord {
        utxo_hash: key,
        depositor: caller.clone(),
        btc_amount: amount,
        tbtc_minted,
        treasury_fee: fee,
        liquidation_bonus: bonus,
        sweep_fee: 0,
        deposit_timestamp: now,
        expiry_timestamp,
        btc_redemption_address: request.btc_redemption_address.clone(),
        wallet_pubkey_hash: deposit.wallet_pubkey_hash,
        funding_tx_hash: deposit.funding_tx_hash,
        funding_output_index: deposit.funding_output_index,
        status: ReservationStatus::Revealed,
    };

    let revealed = revealed_event(&deposit);
    let mut next = state.clone();
    next.deposits.insert(key, deposit);
    next.reservations.insert(key, record.clone());
    next.depositor_reservations
        .entry(caller.clone())
        .or_default()
        .push(key);

    let mut transition = Transition::new(next, record.clone());
    transition.events.push(revealed);
    transition.events.push(SettlementEvent::ReservationCreated {
        utxo_hash: key,
        depositor: record.depositor,
        btc_amount: record.btc_amount,
        tbtc_minted: record.tbtc_minted,
        treasury_fee: record.treasury_fee,
        liquidation_bonus: record.liquidation_bonus,
        expiry_timestamp: record.expiry_timestamp,
    });
    Ok(transition)
}

// =============================================================================
// Finalize (called from inside a sweep)
// =============================================================================

/// Charge the sweep's fee share and activate the reservation.
///
/// Runs against the sweep's working state; the sweep discards that state on
/// any error, so a failure here leaves nothing behind.
pub(crate) fn finalize_sweep(
    state: &mut SettlementState,
    utxo_hash: &DepositKey,
    share: u64,
    events: &mut Vec<SettlementEvent>,
) -> Result<FinalizedReservation, ReservationError> {
    let record = state
        .reservations
        .get_mut(utxo_hash)
        .ok_or(ReservationError::NotFound(*utxo_hash))?;

    if record.status != ReservationStatus::Revealed {
        return Err(ReservationError::AlreadyFinalized {
            key: *utxo_hash,
            status: record.status,
        });
    }
    if !record.is_balanced() {
        return Err(ReservationError::Unbalanced(*utxo_hash));
    }
    if record.tbtc_minted <= share {
        return Err(ReservationError::SweepFeeExhausted {
            key: *utxo_hash,
            tbtc_minted: record.tbtc_minted,
            share,
        });
    }

    record.tbtc_minted -= share;
    record.sweep_fee = share;
    record.status = ReservationStatus::Active;

    events.push(SettlementEvent::ReservationActivated {
        utxo_hash: *utxo_hash,
        sweep_fee: share,
        tbtc_minted: record.tbtc_minted,
    });

    Ok(FinalizedReservation {
        tbtc_minted: record.tbtc_minted,
        treasury_fee: record.treasury_fee,
        liquidation_bonus: record.liquidation_bonus,
    })
}

/// Active, balanced reservation or the reason it cannot be closed
fn active_reservation<'a>(
    state: &'a SettlementState,
    utxo_hash: &DepositKey,
) -> Result<&'a ReservationRecord, ReservationError> {
    let record = state
        .reservation(utxo_hash)
        .ok_or(ReservationError::NotFound(*utxo_hash))?;

    if !record.is_active() {
        return Err(ReservationError::NotActive {
            key: *utxo_hash,
            status: record.status,
        });
    }
    if !record.is_balanced() {
        return Err(ReservationError::Unbalanced(*utxo_hash));
    }
    Ok(record)
}

// =============================================================================
// Redeem
// =============================================================================

/// Redeem an active reservation before expiry.
///
/// The depositor returns `tbtc_minted` to the bridge, which burns it; the
/// forfeited liquidation bonus goes to the treasury. The custodial wallet is
/// then obliged to pay the committed address.
pub fn redeem(
    state: &SettlementState,
    params: &SettlementParams,
    caller: &Identity,
    utxo_hash: &DepositKey,
    now: u64,
) -> Result<Transition<PriorityRedemption>, ReservationError> {
    let record = active_reservation(state, utxo_hash)?;

    if caller != &record.depositor {
        return Err(ReservationError::NotDepositor {
            caller: caller.clone(),
        });
    }
    if now > record.expiry_timestamp {
        return Err(ReservationError::Expired {
            expiry: record.expiry_timestamp,
            now,
        });
    }

    let redemption = PriorityRedemption {
        utxo_hash: *utxo_hash,
        wallet_pubkey_hash: record.wallet_pubkey_hash,
        redeemer: caller.clone(),
        redemption_address: record.btc_redemption_address.clone(),
        output_script: hex::encode(record.btc_redemption_address.output_script().as_bytes()),
        requested_amount: record.btc_amount,
        fee_allowance: record.treasury_fee + record.liquidation_bonus,
        requested_at: now,
    };

    let ledger_ops = vec![
        LedgerOp::TransferBalanceFrom {
            from: caller.clone(),
            to: params.bridge.clone(),
            amount: record.tbtc_minted,
        },
        LedgerOp::DecreaseBalance {
            amount: record.tbtc_minted,
        },
        LedgerOp::TransferBalance {
            to: params.treasury.clone(),
            amount: record.liquidation_bonus,
        },
    ];

    let events = vec![
        SettlementEvent::ReservationRedeemed {
            utxo_hash: *utxo_hash,
            redeemer: caller.clone(),
            tbtc_burned: record.tbtc_minted,
            liquidation_bonus: record.liquidation_bonus,
        },
        SettlementEvent::PriorityRedemptionRequested {
            utxo_hash: *utxo_hash,
            wallet_pubkey_hash: redemption.wallet_pubkey_hash,
            requested_amount: redemption.requested_amount,
            fee_allowance: redemption.fee_allowance,
        },
    ];

    let mut next = state.clone();
    if let Some(record) = next.reservations.get_mut(utxo_hash) {
        record.status = ReservationStatus::Redeemed;
    }
    next.priority_redemptions
        .insert(*utxo_hash, redemption.clone());

    Ok(Transition {
        state: next,
        events,
        ledger_ops,
        output: redemption,
    })
}

// =============================================================================
// Liquidate
// =============================================================================

/// Close an expired reservation, paying its liquidation bonus to `caller`.
///
/// The underlying deposit drops its reservation tag and stays swept, so the
/// UTXO can never be minted again.
pub fn liquidate(
    state: &SettlementState,
    caller: &Identity,
    utxo_hash: &DepositKey,
    now: u64,
) -> Result<Transition<u64>, ReservationError> {
    let record = active_reservation(state, utxo_hash)?;

    if now <= record.expiry_timestamp {
        return Err(ReservationError::NotExpired {
            expiry: record.expiry_timestamp,
            now,
        });
    }

    let bonus = record.liquidation_bonus;
    let mut next = state.clone();
    if let Some(record) = next.reservations.get_mut(utxo_hash) {
        record.status = ReservationStatus::Liquidated;
    }
    if let Some(deposit) = next.deposits.get_mut(utxo_hash) {
        deposit.extra_data = None;
    }

    Ok(Transition {
        state: next,
        events: vec![SettlementEvent::ReservationLiquidated {
            utxo_hash: *utxo_hash,
            liquidator: caller.clone(),
            liquidation_bonus: bonus,
        }],
        ledger_ops: vec![LedgerOp::TransferBalance {
            to: caller.clone(),
            amount: bonus,
        }],
        output: bonus,
    })
}
