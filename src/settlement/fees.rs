//! Fee Arithmetic
//!
//! Integer-only fee math shared by the sweep and reservation paths.

use crate::types::ReservationParams;

/// Seconds in one reservation day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Split of a sweep's network fee across its deposits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    /// `floor(fee / k)`, charged to every deposit
    pub per_deposit: u64,
    /// `fee % k`, charged on top to the last deposit in input order
    pub remainder: u64,
}

impl FeeSplit {
    /// Share of the deposit at position `index` of `count`
    pub fn share(&self, index: usize, count: usize) -> u64 {
        if index + 1 == count {
            self.per_deposit + self.remainder
        } else {
            self.per_deposit
        }
    }

    /// Largest share any deposit carries
    pub fn max_share(&self) -> u64 {
        self.per_deposit.saturating_add(self.remainder)
    }
}

/// Split `fee` over `count` deposits; `None` when there are no deposits
pub fn distribute_fee(fee: u64, count: usize) -> Option<FeeSplit> {
    let k = u64::try_from(count).ok().filter(|k| *k > 0)?;
    Some(FeeSplit {
        per_deposit: fee / k,
        remainder: fee % k,
    })
}

/// Storage fee for reserving `amount` satoshis for `days` days:
/// `max(amount·bps·days / (10000·365), min_fee·ceil(days/365))`
pub fn storage_fee(amount: u64, days: u32, params: &ReservationParams) -> u64 {
    let days = days as u128;
    let proportional =
        amount as u128 * params.storage_fee_bps as u128 * days / (10_000 * 365);
    let years = (days + 364) / 365;
    let minimum = params.min_storage_fee as u128 * years;

    u64::try_from(proportional.max(minimum)).unwrap_or(u64::MAX)
}

/// Liquidation bonus carved out of a storage fee
pub fn liquidation_bonus(storage_fee: u64, params: &ReservationParams) -> u64 {
    let bonus = storage_fee as u128 * params.liquidation_bonus_bps as u128 / 10_000;
    u64::try_from(bonus).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_remainder_goes_to_last() {
        let split = distribute_fee(7, 3).unwrap();
        let shares: Vec<u64> = (0..3).map(|i| split.share(i, 3)).collect();
        assert_eq!(shares, vec![2, 2, 3]);
        assert_eq!(split.max_share(), 3);
    }

    #[test]
    fn test_fee_split_sums_to_fee() {
        for (fee, k) in [(0u64, 1usize), (10, 1), (10, 4), (174_990, 7), (1, 5)] {
            let split = distribute_fee(fee, k).unwrap();
            let total: u64 = (0..k).map(|i| split.share(i, k)).sum();
            assert_eq!(total, fee);
        }
    }

    #[test]
    fn test_no_deposits_no_split() {
        assert_eq!(distribute_fee(10, 0), None);
    }

    #[test]
    fn test_one_btc_one_year() {
        let params = ReservationParams::default();
        let fee = storage_fee(100_000_000, 365, &params);
        assert_eq!(fee, 1_000_000);
        assert_eq!(liquidation_bonus(fee, &params), 100_000);
    }

    #[test]
    fn test_minimum_fee_per_started_year() {
        let params = ReservationParams::default();
        assert_eq!(storage_fee(10_000_000, 1, &params), 1_000_000);
        assert_eq!(storage_fee(10_000_000, 366, &params), 2_000_000);
        assert_eq!(storage_fee(10_000_000, 1_460, &params), 4_000_000);
    }

    #[test]
    fn test_proportional_fee_dominates_for_large_amounts() {
        let params = ReservationParams::default();
        // 100 BTC for a year: 0.1% = 0.1 BTC
        assert_eq!(storage_fee(10_000_000_000, 365, &params), 10_000_000);
    }
}
