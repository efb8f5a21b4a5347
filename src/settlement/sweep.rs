//! Sweep Settlement
//!
//! Settles a proven sweep transaction: a wallet consolidating revealed
//! deposits (plus its current main UTXO) into a single new output.
//!
//! ## Flow
//! 1. Wallet must accept sweeps; the claimed main UTXO must match its slot
//! 2. Exactly one output, locked to the wallet's public key hash
//! 3. Every input is a revealed, unswept deposit of this wallet routed to
//!    the same vault, or the claimed main UTXO (at most once)
//! 4. Network fee = inputs - output, split evenly with the remainder on the
//!    last deposit in input order
//! 5. Ordinary deposits pay treasury fee + share; reserved deposits are
//!    finalized with their share
//! 6. Credits to depositors (or the vault), treasury and bonus pool; the
//!    output becomes the new main UTXO
//!
//! Any failure rejects the whole sweep.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fees::distribute_fee;
use super::reservation::{finalize_sweep, ReservationError};
use super::state::{SettlementState, Transition};
use crate::btc::tx_vector::{
    extract_output_at, extract_pubkey_hash, extract_value, input_count, parse_input_at,
    validate_output_vector,
};
use crate::btc::{BitcoinTxInfo, CodecError, ProofError, SpvProof};
use crate::ledger::LedgerOp;
use crate::types::{
    DepositKey, Identity, MainUtxo, PubKeyHash, SettlementEvent, SettlementParams, TxHash,
    WalletState,
};

/// Sweep errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    #[error("malformed sweep transaction: {0}")]
    Codec(#[from] CodecError),

    #[error("sweep proof rejected: {0}")]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Reservation(#[from] ReservationError),

    #[error("wallet {wallet} is {state}, sweeps need a live or moving-funds wallet")]
    WalletNotSweepable {
        wallet: PubKeyHash,
        state: WalletState,
    },

    #[error("claimed main utxo does not match the wallet's main utxo")]
    MainUtxoMismatch,

    #[error("main utxo claimed for a wallet without one")]
    UnexpectedMainUtxo,

    #[error("wallet main utxo was not spent by the sweep")]
    MainUtxoNotSpent,

    #[error("sweep must have exactly one output, found {0}")]
    OutputCount(u64),

    #[error("sweep output pays {got}, expected wallet {expected}")]
    OutputWalletMismatch { expected: PubKeyHash, got: PubKeyHash },

    #[error("input {tx_hash}:{index} is neither a revealed deposit nor the main utxo")]
    UnknownInput { tx_hash: TxHash, index: u32 },

    #[error("deposit {0} already swept")]
    AlreadySwept(DepositKey),

    #[error("deposit {key} was revealed to wallet {wallet}")]
    DepositWalletMismatch { key: DepositKey, wallet: PubKeyHash },

    #[error("deposit {key} routes to vault {expected:?}, sweep targets {got:?}")]
    VaultMismatch {
        key: DepositKey,
        expected: Option<Identity>,
        got: Option<Identity>,
    },

    #[error("sweep consumes no deposits")]
    NoDeposits,

    #[error("sweep output {output} exceeds total input value {inputs}")]
    OutputExceedsInputs { inputs: u64, output: u64 },

    #[error("per-deposit fee share {share} exceeds maximum {max}")]
    FeeExceedsCap { share: u64, max: u64 },

    #[error("deposit {key} of {amount} cannot cover fees of {fees}")]
    DepositExhausted { key: DepositKey, amount: u64, fees: u64 },

    #[error("sweep value overflows")]
    ValueOverflow,
}

impl SweepError {
    pub fn code(&self) -> &'static str {
        match self {
            SweepError::Codec(e) => e.code(),
            SweepError::Proof(e) => e.code(),
            SweepError::Reservation(e) => e.code(),
            SweepError::WalletNotSweepable { .. } => "WALLET_NOT_SWEEPABLE",
            SweepError::MainUtxoMismatch => "MAIN_UTXO_MISMATCH",
            SweepError::UnexpectedMainUtxo => "UNEXPECTED_MAIN_UTXO",
            SweepError::MainUtxoNotSpent => "MAIN_UTXO_NOT_SPENT",
            SweepError::OutputCount(_) => "SWEEP_OUTPUT_COUNT",
            SweepError::OutputWalletMismatch { .. } => "SWEEP_OUTPUT_WALLET_MISMATCH",
            SweepError::UnknownInput { .. } => "UNKNOWN_SWEEP_INPUT",
            SweepError::AlreadySwept(_) => "DEPOSIT_ALREADY_SWEPT",
            SweepError::DepositWalletMismatch { .. } => "DEPOSIT_WALLET_MISMATCH",
            SweepError::VaultMismatch { .. } => "VAULT_MISMATCH",
            SweepError::NoDeposits => "SWEEP_WITHOUT_DEPOSITS",
            SweepError::OutputExceedsInputs { .. } => "OUTPUT_EXCEEDS_INPUTS",
            SweepError::FeeExceedsCap { .. } => "SWEEP_FEE_EXCEEDS_CAP",
            SweepError::DepositExhausted { .. } => "DEPOSIT_EXHAUSTED_BY_FEES",
            SweepError::ValueOverflow => "VALUE_OVERFLOW",
        }
    }
}

/// Sweep submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepRequest {
    pub wallet_pubkey_hash: PubKeyHash,
    pub sweep_tx: BitcoinTxInfo,
    pub proof: SpvProof,
    /// Current main UTXO of the wallet, required once it has one
    #[serde(default)]
    pub main_utxo: Option<MainUtxo>,
    /// Vault every swept deposit routes to
    #[serde(default)]
    pub vault: Option<Identity>,
}

/// Per-deposit settlement result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettledDeposit {
    pub key: DepositKey,
    pub depositor: Identity,
    pub credited: u64,
    pub fee_share: u64,
    pub treasury_fee: u64,
    pub liquidation_bonus: u64,
    pub reserved: bool,
}

/// Result of an accepted sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub sweep_tx_hash: TxHash,
    pub main_utxo: MainUtxo,
    pub total_fee: u64,
    pub settled: Vec<SettledDeposit>,
}

/// Check the wallet gate and the claimed main UTXO against the wallet slot
fn check_wallet(
    state: &SettlementState,
    wallet: &PubKeyHash,
    claimed: Option<&MainUtxo>,
) -> Result<(), SweepError> {
    let wallet_state = state.wallet_state(wallet);
    if !wallet_state.accepts_sweeps() {
        return Err(SweepError::WalletNotSweepable {
            wallet: *wallet,
            state: wallet_state,
        });
    }

    let slot = state.wallet(wallet).and_then(|w| w.main_utxo_hash);
    match (slot, claimed) {
        (Some(expected), Some(utxo)) if utxo.hash() == expected => Ok(()),
        (Some(_), _) => Err(SweepError::MainUtxoMismatch),
        (None, Some(_)) => Err(SweepError::UnexpectedMainUtxo),
        (None, None) => Ok(()),
    }
}

/// Single sweep output: its value, after checking it pays the wallet
fn sweep_output_value(tx: &BitcoinTxInfo, wallet: &PubKeyHash) -> Result<u64, SweepError> {
    let count = validate_output_vector(&tx.output_vector)?;
    if count != 1 {
        return Err(SweepError::OutputCount(count));
    }

    let output = extract_output_at(&tx.output_vector, 0)?;
    let got = extract_pubkey_hash(output)?;
    if &got != wallet {
        return Err(SweepError::OutputWalletMismatch {
            expected: *wallet,
            got,
        });
    }
    Ok(extract_value(output)?)
}

/// Settle a sweep whose proof has already been validated to `sweep_tx_hash`
pub fn settle_sweep(
    state: &SettlementState,
    params: &SettlementParams,
    request: &SweepRequest,
    sweep_tx_hash: TxHash,
    now: u64,
) -> Result<Transition<SweepOutcome>, SweepError> {
    let wallet = request.wallet_pubkey_hash;
    let claimed = request.main_utxo.as_ref();
    check_wallet(state, &wallet, claimed)?;

    let output_value = sweep_output_value(&request.sweep_tx, &wallet)?;

    // Walk inputs
    let vector = &request.sweep_tx.input_vector;
    let (count, mut offset) = input_count(vector)?;
    let mut swept: Vec<DepositKey> = Vec::new();
    let mut main_utxo_spent = false;
    let mut input_value: u64 = 0;

    for _ in 0..count {
        let input = parse_input_at(vector, offset)?;
        offset += input.input_length;

        let key = DepositKey::from_outpoint(&input.outpoint_tx_hash, input.outpoint_index);
        if let Some(deposit) = state.deposit(&key) {
            if deposit.is_swept() || swept.contains(&key) {
                return Err(SweepError::AlreadySwept(key));
            }
            if deposit.wallet_pubkey_hash != wallet {
                return Err(SweepError::DepositWalletMismatch {
                    key,
                    wallet: deposit.wallet_pubkey_hash,
                });
            }
            if deposit.vault != request.vault {
                return Err(SweepError::VaultMismatch {
                    key,
                    expected: deposit.vault.clone(),
                    got: request.vault.clone(),
                });
            }
            input_value = input_value
                .checked_add(deposit.amount)
                .ok_or(SweepError::ValueOverflow)?;
            swept.push(key);
            continue;
        }

        match claimed {
            Some(utxo)
                if !main_utxo_spent
                    && utxo.tx_hash == input.outpoint_tx_hash
                    && utxo.output_index == input.outpoint_index =>
            {
                main_utxo_spent = true;
                input_value = input_value
                    .checked_add(utxo.value)
                    .ok_or(SweepError::ValueOverflow)?;
            }
            _ => {
                return Err(SweepError::UnknownInput {
                    tx_hash: input.outpoint_tx_hash,
                    index: input.outpoint_index,
                })
            }
        }
    }

    if offset != vector.len() {
        return Err(CodecError::TrailingBytes {
            trailing: vector.len().saturating_sub(offset),
        }
        .into());
    }
    if claimed.is_some() && !main_utxo_spent {
        return Err(SweepError::MainUtxoNotSpent);
    }

    // Fee split
    let total_fee = input_value
        .checked_sub(output_value)
        .ok_or(SweepError::OutputExceedsInputs {
            inputs: input_value,
            output: output_value,
        })?;
    let split = distribute_fee(total_fee, swept.len()).ok_or(SweepError::NoDeposits)?;
    if split.max_share() > params.deposit.tx_max_fee {
        return Err(SweepError::FeeExceedsCap {
            share: split.max_share(),
            max: params.deposit.tx_max_fee,
        });
    }

    // Settle deposits against a working copy
    let mut next = state.clone();
    let mut events = Vec::new();
    let mut settled = Vec::with_capacity(swept.len());

    for (i, key) in swept.iter().enumerate() {
        let share = split.share(i, swept.len());
        let Some(deposit) = next.deposits.get_mut(key) else {
            return Err(ReservationError::NotFound(*key).into());
        };
        deposit.swept_at = now;
        let depositor = deposit.depositor.clone();
        let amount = deposit.amount;
        let treasury_fee = deposit.treasury_fee;

        let entry = if deposit.is_reserved() {
            let finalized = finalize_sweep(&mut next, key, share, &mut events)?;
            SettledDeposit {
                key: *key,
                depositor,
                credited: finalized.tbtc_minted,
                fee_share: share,
                treasury_fee: finalized.treasury_fee,
                liquidation_bonus: finalized.liquidation_bonus,
                reserved: true,
            }
        } else {
            let fees = treasury_fee
                .checked_add(share)
                .ok_or(SweepError::ValueOverflow)?;
            if amount <= fees {
                return Err(SweepError::DepositExhausted {
                    key: *key,
                    amount,
                    fees,
                });
            }
            SettledDeposit {
                key: *key,
                depositor,
                credited: amount - fees,
                fee_share: share,
                treasury_fee,
                liquidation_bonus: 0,
                reserved: false,
            }
        };

        events.push(SettlementEvent::DepositSettled {
            key: *key,
            depositor: entry.depositor.clone(),
            sweep_tx_hash,
            credited: entry.credited,
            fee_share: share,
            treasury_fee: entry.treasury_fee,
        });
        settled.push(entry);
    }

    // Ledger credits
    let treasury_total = settled.iter().map(|s| s.treasury_fee).sum::<u64>();
    let bonus_total = settled.iter().map(|s| s.liquidation_bonus).sum::<u64>();
    let mut ledger_ops = Vec::new();

    match &request.vault {
        Some(vault) if state.is_trusted_vault(vault) => {
            ledger_ops.push(LedgerOp::IncreaseBalance {
                recipient: vault.clone(),
                amount: settled.iter().map(|s| s.credited).sum(),
            });
        }
        _ => {
            ledger_ops.push(LedgerOp::IncreaseBalances {
                recipients: settled.iter().map(|s| s.depositor.clone()).collect(),
                amounts: settled.iter().map(|s| s.credited).collect(),
            });
        }
    }
    if treasury_total > 0 {
        ledger_ops.push(LedgerOp::IncreaseBalance {
            recipient: params.treasury.clone(),
            amount: treasury_total,
        });
    }
    if bonus_total > 0 {
        ledger_ops.push(LedgerOp::IncreaseBalance {
            recipient: params.bridge.clone(),
            amount: bonus_total,
        });
    }

    // New main UTXO
    let main_utxo = MainUtxo {
        tx_hash: sweep_tx_hash,
        output_index: 0,
        value: output_value,
    };
    if let Some(w) = next.wallets.get_mut(&wallet) {
        w.main_utxo_hash = Some(main_utxo.hash());
    }

    events.push(SettlementEvent::DepositsSwept {
        wallet_pubkey_hash: wallet,
        sweep_tx_hash,
        deposit_count: settled.len(),
        total_fee,
    });
    events.push(SettlementEvent::MainUtxoUpdated {
        wallet_pubkey_hash: wallet,
        main_utxo,
    });

    Ok(Transition {
        state: next,
        events,
        ledger_ops,
        output: SweepOutcome {
            sweep_tx_hash,
            main_utxo,
            total_fee,
            settled,
        },
    })
}
