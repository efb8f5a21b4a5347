//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{SettlementStore, StorageError, StorageResult};
use crate::ledger::BalanceUpdate;
use crate::settlement::state::{SettlementState, StateDelta};
use crate::types::{DepositKey, DepositRecord, Identity, LoggedEvent, ReservationRecord};

#[derive(Default)]
struct Inner {
    state: SettlementState,
    events: Vec<LoggedEvent>,
    balances: BTreeMap<Identity, u64>,
}

/// In-memory settlement store
///
/// Uses Arc<RwLock<>> for concurrent access.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn commit(
        &self,
        delta: &StateDelta,
        events: &[LoggedEvent],
        balances: &[BalanceUpdate],
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;

        let next_seq = inner.events.last().map(|e| e.seq + 1).unwrap_or(1);
        if let Some(first) = events.first() {
            if first.seq < next_seq {
                return Err(StorageError::Duplicate(format!("event seq {}", first.seq)));
            }
        }

        delta.clone().apply_to(&mut inner.state);
        inner.events.extend_from_slice(events);
        inner.balances.extend(balances.iter().cloned());
        Ok(())
    }

    async fn load(&self) -> StorageResult<(SettlementState, Vec<LoggedEvent>)> {
        let inner = self.inner.read().await;
        Ok((inner.state.clone(), inner.events.clone()))
    }

    async fn load_balances(&self) -> StorageResult<Vec<BalanceUpdate>> {
        let inner = self.inner.read().await;
        Ok(inner
            .balances
            .iter()
            .map(|(account, balance)| (account.clone(), *balance))
            .collect())
    }

    async fn get_deposit(&self, key: &DepositKey) -> StorageResult<Option<DepositRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.state.deposit(key).cloned())
    }

    async fn get_reservation(
        &self,
        utxo_hash: &DepositKey,
    ) -> StorageResult<Option<ReservationRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.state.reservation(utxo_hash).cloned())
    }

    async fn reservations_by_depositor(
        &self,
        depositor: &Identity,
    ) -> StorageResult<Vec<ReservationRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .state
            .reservations_of(depositor)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn events_since(&self, after: u64) -> StorageResult<Vec<LoggedEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::state::set_vault_status;
    use crate::settlement::EventLog;

    #[tokio::test]
    async fn test_commit_and_load() {
        let store = MemoryStore::new();
        let before = SettlementState::default();
        let t = set_vault_status(&before, Identity::new("vault"), true);
        let events = EventLog::default().stage(t.events, 100);

        let balances = vec![(Identity::new("alice"), 5)];
        store
            .commit(&before.diff(&t.state), &events, &balances)
            .await
            .unwrap();

        let (state, loaded) = store.load().await.unwrap();
        assert_eq!(state, t.state);
        assert_eq!(loaded, events);
        assert_eq!(store.events_since(1).await.unwrap().len(), 0);
        assert_eq!(store.load_balances().await.unwrap(), balances);
    }

    #[tokio::test]
    async fn test_replayed_events_rejected() {
        let store = MemoryStore::new();
        let t = set_vault_status(&SettlementState::default(), Identity::new("v"), true);
        let events = EventLog::default().stage(t.events, 100);

        store
            .commit(&StateDelta::default(), &events, &[])
            .await
            .unwrap();
        assert!(matches!(
            store
                .commit(&StateDelta::default(), &events, &[(Identity::new("a"), 1)])
                .await,
            Err(StorageError::Duplicate(_))
        ));
        assert!(store.load_balances().await.unwrap().is_empty());
    }
}
