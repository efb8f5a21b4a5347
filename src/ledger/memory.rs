//! In-Memory Ledger
//!
//! Balance map with atomic batches. Batches run against a copy that replaces
//! the live map only when every op succeeded.

use std::collections::HashMap;

use super::{BalanceUpdate, Ledger, LedgerError, LedgerOp, LedgerResult};
use crate::types::Identity;

/// In-memory balance ledger
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    bridge: Identity,
    balances: HashMap<Identity, u64>,
}

impl MemoryLedger {
    pub fn new(bridge: Identity) -> Self {
        Self {
            bridge,
            balances: HashMap::new(),
        }
    }

    /// Sum of every balance
    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }

    fn credit(&mut self, account: &Identity, amount: u64) -> LedgerResult<()> {
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(account.clone()))?;
        Ok(())
    }

    fn debit(&mut self, account: &Identity, amount: u64) -> LedgerResult<()> {
        let balance = self.balances.get(account).copied().unwrap_or(0);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: account.clone(),
                balance,
                required: amount,
            });
        }
        self.balances.insert(account.clone(), balance - amount);
        Ok(())
    }

    fn simulate(&self, ops: &[LedgerOp]) -> LedgerResult<MemoryLedger> {
        let mut scratch = self.clone();
        for op in ops {
            scratch.apply_op(op)?;
        }
        Ok(scratch)
    }
}

impl Ledger for MemoryLedger {
    fn bridge(&self) -> &Identity {
        &self.bridge
    }

    fn balance_of(&self, account: &Identity) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn increase_balance(&mut self, recipient: &Identity, amount: u64) -> LedgerResult<()> {
        self.credit(recipient, amount)
    }

    fn increase_balances(&mut self, recipients: &[Identity], amounts: &[u64]) -> LedgerResult<()> {
        if recipients.len() != amounts.len() {
            return Err(LedgerError::LengthMismatch {
                recipients: recipients.len(),
                amounts: amounts.len(),
            });
        }
        for (recipient, amount) in recipients.iter().zip(amounts) {
            self.credit(recipient, *amount)?;
        }
        Ok(())
    }

    fn decrease_balance(&mut self, amount: u64) -> LedgerResult<()> {
        let bridge = self.bridge.clone();
        self.debit(&bridge, amount)
    }

    fn transfer_balance(&mut self, to: &Identity, amount: u64) -> LedgerResult<()> {
        let bridge = self.bridge.clone();
        self.transfer_balance_from(&bridge, to, amount)
    }

    fn transfer_balance_from(
        &mut self,
        from: &Identity,
        to: &Identity,
        amount: u64,
    ) -> LedgerResult<()> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    fn preview_batch(&self, ops: &[LedgerOp]) -> LedgerResult<Vec<BalanceUpdate>> {
        let scratch = self.simulate(ops)?;
        let mut changed: Vec<BalanceUpdate> = scratch
            .balances
            .into_iter()
            .filter(|(account, balance)| self.balances.get(account) != Some(balance))
            .collect();
        changed.sort();
        Ok(changed)
    }

    fn apply_batch(&mut self, ops: &[LedgerOp]) -> LedgerResult<()> {
        *self = self.simulate(ops)?;
        Ok(())
    }

    fn restore(&mut self, balances: &[BalanceUpdate]) {
        for (account, balance) in balances {
            self.balances.insert(account.clone(), *balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    #[test]
    fn test_primitives() {
        let mut ledger = MemoryLedger::new(id("bridge"));

        ledger.increase_balance(&id("alice"), 1_000).unwrap();
        ledger.increase_balance(&id("bridge"), 500).unwrap();
        ledger.transfer_balance(&id("bob"), 200).unwrap();
        ledger
            .transfer_balance_from(&id("alice"), &id("bridge"), 400)
            .unwrap();
        ledger.decrease_balance(400).unwrap();

        assert_eq!(ledger.balance_of(&id("alice")), 600);
        assert_eq!(ledger.balance_of(&id("bob")), 200);
        assert_eq!(ledger.balance_of(&id("bridge")), 300);
        assert_eq!(ledger.total_supply(), 1_100);
    }

    #[test]
    fn test_increase_balances_length_mismatch() {
        let mut ledger = MemoryLedger::new(id("bridge"));
        let err = ledger
            .increase_balances(&[id("a"), id("b")], &[1])
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::LengthMismatch {
                recipients: 2,
                amounts: 1
            }
        );
    }

    #[test]
    fn test_failed_batch_leaves_balances_untouched() {
        let mut ledger = MemoryLedger::new(id("bridge"));
        ledger.increase_balance(&id("alice"), 100).unwrap();

        let batch = vec![
            LedgerOp::IncreaseBalance {
                recipient: id("bob"),
                amount: 50,
            },
            LedgerOp::TransferBalanceFrom {
                from: id("alice"),
                to: id("bridge"),
                amount: 101,
            },
        ];

        assert!(matches!(
            ledger.preview_batch(&batch),
            Err(LedgerError::InsufficientBalance { required: 101, .. })
        ));
        assert!(ledger.apply_batch(&batch).is_err());
        assert_eq!(ledger.balance_of(&id("bob")), 0);
        assert_eq!(ledger.balance_of(&id("alice")), 100);
    }

    #[test]
    fn test_preview_reports_changed_accounts() {
        let mut ledger = MemoryLedger::new(id("bridge"));
        ledger.increase_balance(&id("alice"), 100).unwrap();
        ledger.increase_balance(&id("carol"), 7).unwrap();

        let batch = vec![
            LedgerOp::IncreaseBalance {
                recipient: id("bridge"),
                amount: 30,
            },
            LedgerOp::TransferBalanceFrom {
                from: id("alice"),
                to: id("bob"),
                amount: 40,
            },
            LedgerOp::TransferBalance {
                to: id("alice"),
                amount: 10,
            },
        ];

        let preview = ledger.preview_batch(&batch).unwrap();
        assert_eq!(
            preview,
            vec![(id("alice"), 70), (id("bob"), 40), (id("bridge"), 20)]
        );
        // dry run only
        assert_eq!(ledger.balance_of(&id("bob")), 0);

        let mut restored = MemoryLedger::new(id("bridge"));
        restored.restore(&[(id("carol"), 7), (id("alice"), 100)]);
        restored.restore(&preview);
        ledger.apply_batch(&batch).unwrap();
        for account in ["alice", "bob", "bridge", "carol"] {
            assert_eq!(restored.balance_of(&id(account)), ledger.balance_of(&id(account)));
        }
    }

    #[test]
    fn test_overflow_rejected() {
        let mut ledger = MemoryLedger::new(id("bridge"));
        ledger.increase_balance(&id("alice"), u64::MAX).unwrap();
        assert_eq!(
            ledger.increase_balance(&id("alice"), 1),
            Err(LedgerError::Overflow(id("alice")))
        );
    }
}
