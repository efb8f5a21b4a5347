//! Shared Types Module
//!
//! Records, identifiers, events and parameters shared across the settlement core.

pub mod deposit;
pub mod events;
pub mod params;
pub mod primitives;
pub mod reservation;
pub mod units;
pub mod wallet;

// Re-exports for convenience
pub use deposit::{DepositRecord, DepositStatus, DepositStatusResponse};
pub use events::{LoggedEvent, SettlementEvent};
pub use params::{DepositParams, ReservationParams, SettlementParams, MAX_RESERVATION_DAYS};
pub use primitives::{DepositKey, ExtraData, Identity, PubKeyHash, TxHash, RESERVATION_TAG};
pub use reservation::{
    PriorityRedemption, RedemptionAddress, ReservationRecord, ReservationStatus,
    ReservationStatusResponse,
};
pub use units::{parse_sats, sats_to_btc_string, sats_to_display, SATS_PER_BTC};
pub use wallet::{MainUtxo, Wallet, WalletState};
