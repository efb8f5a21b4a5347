//! Settlement Service
//!
//! Owns the committed state and event log, and the handles to storage, the
//! ledger, the proof validator and the clock. Every command computes a
//! [`Transition`] against the current snapshot and commits it:
//!
//! 1. dry-run the ledger batch, collecting the balances it leaves
//! 2. stage the events with sequence numbers
//! 3. persist the state delta, the staged events and those balances in one
//!    storage commit
//! 4. apply the ledger batch
//! 5. swap in the new state and append the events
//!
//! A failure before step 3 completes leaves storage, ledger and memory
//! untouched. Loading restores the ledger from the persisted balances.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::clock::{Clock, SystemClock};
use super::log::EventLog;
use super::reservation::{self, ReserveRequest};
use super::reveal::{self, RevealRequest};
use super::state::{self, SettlementState, Transition};
use super::sweep::{self, SweepError, SweepOutcome, SweepRequest};
use crate::btc::{EsploraRelay, MerkleProofValidator, ProofValidator};
use crate::common::config::SettlementConfig;
use crate::common::error::{Result, SettlementError};
use crate::common::logging::{log_ledger_batch, log_rejection, log_settlement_event};
use crate::ledger::{Ledger, MemoryLedger};
use crate::storage::{SettlementStore, SqliteStore};
use crate::types::{
    DepositKey, DepositRecord, Identity, LoggedEvent, PriorityRedemption, PubKeyHash,
    ReservationRecord, SettlementParams, Wallet, WalletState,
};

/// Log a rejected command and convert its error
fn rejected(
    command: &str,
    caller: Option<&Identity>,
    err: impl Into<SettlementError>,
) -> SettlementError {
    let err = err.into();
    log_rejection(
        command,
        err.error_code(),
        &err.to_string(),
        caller.map(Identity::as_str),
    );
    err
}

/// Settlement service
pub struct SettlementService {
    params: SettlementParams,
    state: SettlementState,
    log: EventLog,
    store: Arc<dyn SettlementStore>,
    ledger: Box<dyn Ledger>,
    validator: Arc<dyn ProofValidator>,
    clock: Arc<dyn Clock>,
}

impl SettlementService {
    /// Build a service over whatever the store already holds
    pub async fn load(
        params: SettlementParams,
        store: Arc<dyn SettlementStore>,
        mut ledger: Box<dyn Ledger>,
        validator: Arc<dyn ProofValidator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (state, events) = store.load().await?;
        let balances = store.load_balances().await?;
        ledger.restore(&balances);
        info!(
            target: "settlement::service",
            deposits = state.deposits.len(),
            reservations = state.reservations.len(),
            events = events.len(),
            accounts = balances.len(),
            "settlement state loaded"
        );

        Ok(Self {
            params,
            state,
            log: EventLog::from_events(events),
            store,
            ledger,
            validator,
            clock,
        })
    }

    /// Open the SQLite store named by the config and wire the default
    /// ledger, clock and a validator over the configured Esplora headers
    pub async fn from_config(config: &SettlementConfig) -> Result<Self> {
        let store = SqliteStore::new(&config.db_path)?;
        let relay = Arc::new(EsploraRelay::new(&config.esplora_url));

        Self::load(
            config.params.clone(),
            Arc::new(store),
            Box::new(MemoryLedger::new(config.params.bridge.clone())),
            Arc::new(MerkleProofValidator::new(relay, config.proof_confirmations)),
            Arc::new(SystemClock),
        )
        .await
    }

    pub fn params(&self) -> &SettlementParams {
        &self.params
    }

    pub fn state(&self) -> &SettlementState {
        &self.state
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // =========================================================================
    // Commit
    // =========================================================================

    async fn commit<T>(
        &mut self,
        command: &str,
        caller: Option<&Identity>,
        at: u64,
        transition: Transition<T>,
    ) -> Result<T> {
        let Transition {
            state: next,
            events,
            ledger_ops,
            output,
        } = transition;

        let balances = match self.ledger.preview_batch(&ledger_ops) {
            Ok(balances) => balances,
            Err(e) => return Err(rejected(command, caller, e)),
        };

        let staged = self.log.stage(events, at);
        let delta = self.state.diff(&next);
        if let Err(e) = self.store.commit(&delta, &staged, &balances).await {
            error!(target: "settlement::service", command, error = %e, "storage commit failed");
            return Err(rejected(command, caller, e));
        }

        // The store now holds `next` and its balances; memory follows it even
        // if the ledger refuses a batch it accepted during the dry run.
        let applied = self.ledger.apply_batch(&ledger_ops);
        self.state = next;
        for event in &staged {
            log_settlement_event(event);
        }
        if !ledger_ops.is_empty() {
            log_ledger_batch(command, ledger_ops.len(), staged.first().map(|e| e.seq));
        }
        self.log.append(staged);

        if let Err(e) = applied {
            error!(
                target: "settlement::ledger",
                command,
                error = %e,
                "ledger rejected a checked batch after commit"
            );
            return Err(e.into());
        }
        Ok(output)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Reveal an ordinary deposit
    pub async fn reveal_deposit(
        &mut self,
        depositor: &Identity,
        request: &RevealRequest,
    ) -> Result<DepositKey> {
        const COMMAND: &str = "reveal_deposit";
        let now = self.clock.now();
        let transition = reveal::reveal(&self.state, &self.params, depositor, request, now)
            .map_err(|e| rejected(COMMAND, Some(depositor), e))?;
        self.commit(COMMAND, Some(depositor), now, transition).await
    }

    /// Validate a sweep proof and settle every deposit the sweep consumes
    pub async fn settle_sweep(
        &mut self,
        caller: &Identity,
        request: &SweepRequest,
    ) -> Result<SweepOutcome> {
        const COMMAND: &str = "settle_sweep";
        let now = self.clock.now();
        let sweep_tx_hash = self
            .validator
            .validate_proof(&request.sweep_tx, &request.proof)
            .await
            .map_err(|e| rejected(COMMAND, Some(caller), SweepError::from(e)))?;

        let transition = sweep::settle_sweep(&self.state, &self.params, request, sweep_tx_hash, now)
            .map_err(|e| rejected(COMMAND, Some(caller), e))?;
        self.commit(COMMAND, Some(caller), now, transition).await
    }

    /// Reveal and reserve a funding UTXO
    pub async fn reserve(
        &mut self,
        caller: &Identity,
        request: &ReserveRequest,
    ) -> Result<ReservationRecord> {
        const COMMAND: &str = "reserve";
        let now = self.clock.now();
        let transition = reservation::reserve(&self.state, &self.params, caller, request, now)
            .map_err(|e| rejected(COMMAND, Some(caller), e))?;
        self.commit(COMMAND, Some(caller), now, transition).await
    }

    /// Redeem an active reservation
    pub async fn redeem(
        &mut self,
        caller: &Identity,
        utxo_hash: &DepositKey,
    ) -> Result<PriorityRedemption> {
        const COMMAND: &str = "redeem";
        let now = self.clock.now();
        let transition = reservation::redeem(&self.state, &self.params, caller, utxo_hash, now)
            .map_err(|e| rejected(COMMAND, Some(caller), e))?;
        self.commit(COMMAND, Some(caller), now, transition).await
    }

    /// Liquidate an expired reservation; returns the bonus paid to `caller`
    pub async fn liquidate(&mut self, caller: &Identity, utxo_hash: &DepositKey) -> Result<u64> {
        const COMMAND: &str = "liquidate";
        let now = self.clock.now();
        let transition = reservation::liquidate(&self.state, caller, utxo_hash, now)
            .map_err(|e| rejected(COMMAND, Some(caller), e))?;
        self.commit(COMMAND, Some(caller), now, transition).await
    }

    pub async fn register_wallet(
        &mut self,
        pubkey_hash: PubKeyHash,
        wallet_state: WalletState,
    ) -> Result<()> {
        const COMMAND: &str = "register_wallet";
        let now = self.clock.now();
        let transition = state::register_wallet(&self.state, pubkey_hash, wallet_state)
            .map_err(|e| rejected(COMMAND, None, e))?;
        self.commit(COMMAND, None, now, transition).await
    }

    pub async fn set_wallet_state(
        &mut self,
        pubkey_hash: PubKeyHash,
        wallet_state: WalletState,
    ) -> Result<()> {
        const COMMAND: &str = "set_wallet_state";
        let now = self.clock.now();
        let transition = state::set_wallet_state(&self.state, pubkey_hash, wallet_state)
            .map_err(|e| rejected(COMMAND, None, e))?;
        self.commit(COMMAND, None, now, transition).await
    }

    pub async fn set_vault_status(&mut self, vault: Identity, trusted: bool) -> Result<()> {
        let now = self.clock.now();
        let transition = state::set_vault_status(&self.state, vault, trusted);
        self.commit("set_vault_status", None, now, transition).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn deposit(&self, key: &DepositKey) -> Option<&DepositRecord> {
        self.state.deposit(key)
    }

    pub fn reservation(&self, utxo_hash: &DepositKey) -> Option<&ReservationRecord> {
        self.state.reservation(utxo_hash)
    }

    pub fn reservations_of(&self, depositor: &Identity) -> Vec<&ReservationRecord> {
        self.state.reservations_of(depositor)
    }

    pub fn wallet(&self, pubkey_hash: &PubKeyHash) -> Option<&Wallet> {
        self.state.wallet(pubkey_hash)
    }

    pub fn priority_redemption(&self, utxo_hash: &DepositKey) -> Option<&PriorityRedemption> {
        self.state.priority_redemption(utxo_hash)
    }

    pub fn pending_priority_redemptions(&self, wallet: &PubKeyHash) -> Vec<&PriorityRedemption> {
        self.state.pending_priority_redemptions(wallet)
    }

    pub fn balance_of(&self, account: &Identity) -> u64 {
        self.ledger.balance_of(account)
    }

    /// Committed events with `seq > after`
    pub fn events_since(&self, after: u64) -> &[LoggedEvent] {
        self.log.since(after)
    }
}

/// Thread-safe service handle: commands take the write lock, queries the read lock
pub type SharedSettlement = Arc<RwLock<SettlementService>>;

/// Create a shared settlement service
pub fn create_shared_service(service: SettlementService) -> SharedSettlement {
    Arc::new(RwLock::new(service))
}
