//! Settlement Parameters
//!
//! Governance-controlled values consumed by the pure operations. Loaded from
//! the environment by [`crate::common::config::SettlementConfig`].

use serde::{Deserialize, Serialize};

use super::primitives::Identity;

/// Parameters of the ordinary deposit path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositParams {
    /// Minimum funding output value accepted at reveal
    pub dust_threshold: u64,
    /// `treasury_fee = amount / divisor`; zero disables the fee
    pub treasury_fee_divisor: u64,
    /// Maximum network fee share any single deposit may carry in a sweep
    pub tx_max_fee: u64,
}

impl Default for DepositParams {
    fn default() -> Self {
        Self {
            dust_threshold: 1_000_000,
            treasury_fee_divisor: 2_000,
            tx_max_fee: 100_000,
        }
    }
}

/// Reserved-deposit pricing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationParams {
    /// Annualized storage fee in basis points
    pub storage_fee_bps: u64,
    /// Minimum storage fee per started year
    pub min_storage_fee: u64,
    /// Liquidation bonus as basis points of the storage fee
    pub liquidation_bonus_bps: u64,
    /// Smallest reservable UTXO value
    pub min_amount: u64,
    /// Longest reservation window in days
    pub max_days: u32,
}

/// Hard ceiling on the reservation window (four years)
pub const MAX_RESERVATION_DAYS: u32 = 1_460;

impl Default for ReservationParams {
    fn default() -> Self {
        Self {
            storage_fee_bps: 10,
            min_storage_fee: 1_000_000,
            liquidation_bonus_bps: 1_000,
            min_amount: 10_000_000,
            max_days: MAX_RESERVATION_DAYS,
        }
    }
}

/// Full parameter set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementParams {
    pub deposit: DepositParams,
    pub reservation: ReservationParams,
    /// Account receiving treasury fees
    pub treasury: Identity,
    /// Bridge account; holds the liquidation-bonus pool and burns redeemed balances
    pub bridge: Identity,
}

impl Default for SettlementParams {
    fn default() -> Self {
        Self {
            deposit: DepositParams::default(),
            reservation: ReservationParams::default(),
            treasury: Identity::new("treasury"),
            bridge: Identity::new("bridge"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SettlementParams::default();
        assert_eq!(params.deposit.treasury_fee_divisor, 2_000);
        assert_eq!(params.reservation.min_amount, 10_000_000);
        assert_eq!(params.reservation.max_days, MAX_RESERVATION_DAYS);
        assert_ne!(params.treasury, params.bridge);
    }
}
