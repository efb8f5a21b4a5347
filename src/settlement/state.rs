//! Settlement State
//!
//! The materialized view the pure operations read and produce: deposit and
//! reservation tables, wallet slots, the depositor index, priority
//! redemptions and vault trust flags.
//!
//! Operations never mutate a shared state in place. Each one clones the
//! snapshot it was given, applies its changes to the clone and returns a
//! [`Transition`]; the caller decides whether to commit it.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ledger::LedgerOp;
use crate::types::{
    DepositKey, DepositRecord, Identity, PriorityRedemption, PubKeyHash, ReservationRecord,
    SettlementEvent, Wallet, WalletState,
};

/// Wallet setup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("wallet {0} is not registered")]
    UnknownWallet(PubKeyHash),

    #[error("wallet {0} is already registered")]
    AlreadyRegistered(PubKeyHash),
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::UnknownWallet(_) => "UNKNOWN_WALLET",
            WalletError::AlreadyRegistered(_) => "WALLET_ALREADY_REGISTERED",
        }
    }
}

/// Materialized settlement state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementState {
    pub deposits: BTreeMap<DepositKey, DepositRecord>,
    pub reservations: BTreeMap<DepositKey, ReservationRecord>,
    pub wallets: BTreeMap<PubKeyHash, Wallet>,
    /// Reservation keys per depositor, in creation order
    pub depositor_reservations: BTreeMap<Identity, Vec<DepositKey>>,
    pub priority_redemptions: BTreeMap<DepositKey, PriorityRedemption>,
    /// Vault trust flags; absent means untrusted
    pub vaults: BTreeMap<Identity, bool>,
}

/// Result of a pure operation: the proposed next state, its events and the
/// ledger calls that must be applied alongside it
#[derive(Debug, Clone)]
pub struct Transition<T = ()> {
    pub state: SettlementState,
    pub events: Vec<SettlementEvent>,
    pub ledger_ops: Vec<LedgerOp>,
    pub output: T,
}

impl<T> Transition<T> {
    pub fn new(state: SettlementState, output: T) -> Self {
        Self {
            state,
            events: Vec::new(),
            ledger_ops: Vec::new(),
            output,
        }
    }
}

/// Rows that differ between two states. Records are never deleted, so a
/// delta is a set of upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub deposits: Vec<DepositRecord>,
    pub reservations: Vec<ReservationRecord>,
    pub wallets: Vec<Wallet>,
    pub depositor_reservations: Vec<(Identity, Vec<DepositKey>)>,
    pub priority_redemptions: Vec<PriorityRedemption>,
    pub vaults: Vec<(Identity, bool)>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
            && self.reservations.is_empty()
            && self.wallets.is_empty()
            && self.depositor_reservations.is_empty()
            && self.priority_redemptions.is_empty()
            && self.vaults.is_empty()
    }

    /// Apply the upserts to a state (used when loading from storage)
    pub fn apply_to(self, state: &mut SettlementState) {
        for record in self.deposits {
            state.deposits.insert(record.key, record);
        }
        for record in self.reservations {
            state.reservations.insert(record.utxo_hash, record);
        }
        for wallet in self.wallets {
            state.wallets.insert(wallet.pubkey_hash, wallet);
        }
        for (depositor, keys) in self.depositor_reservations {
            state.depositor_reservations.insert(depositor, keys);
        }
        for redemption in self.priority_redemptions {
            state.priority_redemptions.insert(redemption.utxo_hash, redemption);
        }
        for (vault, trusted) in self.vaults {
            state.vaults.insert(vault, trusted);
        }
    }
}

fn changed<K: Ord + Clone, V: PartialEq + Clone>(
    before: &BTreeMap<K, V>,
    after: &BTreeMap<K, V>,
) -> Vec<(K, V)> {
    after
        .iter()
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn changed_values<K: Ord + Clone, V: PartialEq + Clone>(
    before: &BTreeMap<K, V>,
    after: &BTreeMap<K, V>,
) -> Vec<V> {
    changed(before, after).into_iter().map(|(_, v)| v).collect()
}

impl SettlementState {
    // =========================================================================
    // Queries
    // =========================================================================

    pub fn deposit(&self, key: &DepositKey) -> Option<&DepositRecord> {
        self.deposits.get(key)
    }

    pub fn reservation(&self, utxo_hash: &DepositKey) -> Option<&ReservationRecord> {
        self.reservations.get(utxo_hash)
    }

    pub fn wallet(&self, pubkey_hash: &PubKeyHash) -> Option<&Wallet> {
        self.wallets.get(pubkey_hash)
    }

    /// Wallet state, `Unknown` for unregistered wallets
    pub fn wallet_state(&self, pubkey_hash: &PubKeyHash) -> WalletState {
        self.wallets
            .get(pubkey_hash)
            .map(|w| w.state)
            .unwrap_or(WalletState::Unknown)
    }

    pub fn is_trusted_vault(&self, vault: &Identity) -> bool {
        self.vaults.get(vault).copied().unwrap_or(false)
    }

    /// Reservations of a depositor, in creation order
    pub fn reservations_of(&self, depositor: &Identity) -> Vec<&ReservationRecord> {
        self.depositor_reservations
            .get(depositor)
            .map(|keys| keys.iter().filter_map(|k| self.reservations.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn priority_redemption(&self, utxo_hash: &DepositKey) -> Option<&PriorityRedemption> {
        self.priority_redemptions.get(utxo_hash)
    }

    /// Priority redemptions a wallet still has to pay
    pub fn pending_priority_redemptions(&self, wallet: &PubKeyHash) -> Vec<&PriorityRedemption> {
        self.priority_redemptions
            .values()
            .filter(|r| &r.wallet_pubkey_hash == wallet)
            .collect()
    }

    /// Rows of `next` that differ from `self`
    pub fn diff(&self, next: &SettlementState) -> StateDelta {
        StateDelta {
            deposits: changed_values(&self.deposits, &next.deposits),
            reservations: changed_values(&self.reservations, &next.reservations),
            wallets: changed_values(&self.wallets, &next.wallets),
            depositor_reservations: changed(
                &self.depositor_reservations,
                &next.depositor_reservations,
            ),
            priority_redemptions: changed_values(
                &self.priority_redemptions,
                &next.priority_redemptions,
            ),
            vaults: changed(&self.vaults, &next.vaults),
        }
    }
}

// =============================================================================
// Setup operations
// =============================================================================

/// Register a custodial wallet
pub fn register_wallet(
    state: &SettlementState,
    pubkey_hash: PubKeyHash,
    wallet_state: WalletState,
) -> Result<Transition, WalletError> {
    if state.wallets.contains_key(&pubkey_hash) {
        return Err(WalletError::AlreadyRegistered(pubkey_hash));
    }

    let mut next = state.clone();
    next.wallets
        .insert(pubkey_hash, Wallet::new(pubkey_hash, wallet_state));

    let mut transition = Transition::new(next, ());
    transition.events.push(SettlementEvent::WalletRegistered {
        wallet_pubkey_hash: pubkey_hash,
        state: wallet_state,
    });
    Ok(transition)
}

/// Move a registered wallet to another lifecycle state
pub fn set_wallet_state(
    state: &SettlementState,
    pubkey_hash: PubKeyHash,
    wallet_state: WalletState,
) -> Result<Transition, WalletError> {
    let current = state
        .wallets
        .get(&pubkey_hash)
        .ok_or(WalletError::UnknownWallet(pubkey_hash))?;
    let from = current.state;

    let mut next = state.clone();
    if let Some(wallet) = next.wallets.get_mut(&pubkey_hash) {
        wallet.state = wallet_state;
    }

    let mut transition = Transition::new(next, ());
    if from != wallet_state {
        transition.events.push(SettlementEvent::WalletStateChanged {
            wallet_pubkey_hash: pubkey_hash,
            from,
            to: wallet_state,
        });
    }
    Ok(transition)
}

/// Mark a vault as trusted or untrusted
pub fn set_vault_status(state: &SettlementState, vault: Identity, trusted: bool) -> Transition {
    let mut next = state.clone();
    next.vaults.insert(vault.clone(), trusted);

    let mut transition = Transition::new(next, ());
    transition
        .events
        .push(SettlementEvent::VaultStatusUpdated { vault, trusted });
    transition
}
