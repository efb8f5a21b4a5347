//! Settlement Core
//!
//! Pure operations over [`SettlementState`] plus the service that commits
//! their transitions.
//!
//! # Flow:
//! 1. A depositor reveals a funding output (`reveal`) or reserves it (`reserve`)
//! 2. The wallet sweeps revealed outputs into its main UTXO (`settle_sweep`)
//! 3. Ordinary deposits are credited; reservations activate
//! 4. An active reservation is redeemed before expiry or liquidated after it

pub mod clock;
pub mod fees;
pub mod log;
pub mod reservation;
pub mod reveal;
pub mod service;
pub mod state;
pub mod sweep;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use fees::{distribute_fee, liquidation_bonus, storage_fee, FeeSplit};
pub use log::EventLog;
pub use reservation::{liquidate, redeem, reserve, ReservationError, ReserveRequest};
pub use reveal::{reveal, FundingReveal, RevealError, RevealRequest};
pub use service::{create_shared_service, SettlementService, SharedSettlement};
pub use state::{
    register_wallet, set_vault_status, set_wallet_state, SettlementState, StateDelta, Transition,
    WalletError,
};
pub use sweep::{settle_sweep, SettledDeposit, SweepError, SweepOutcome, SweepRequest};
