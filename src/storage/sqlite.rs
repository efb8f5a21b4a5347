//! SQLite Persistent Storage for Settlement State
//!
//! Provides durable storage for the settlement tables, the event log and
//! the ledger balances that survives service restarts. Uses connection
//! pooling via r2d2; every commit runs in one SQLite transaction.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use super::traits::{SettlementStore, StorageError, StorageResult};
use crate::ledger::BalanceUpdate;
use crate::settlement::state::{SettlementState, StateDelta};
use crate::types::{
    DepositKey, DepositRecord, Identity, LoggedEvent, PriorityRedemption, RedemptionAddress,
    ReservationRecord, SettlementEvent, Wallet,
};

/// SQLite-backed settlement store with connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Parse a text column through `FromStr`
fn parse_col<T>(row: &rusqlite::Row, idx: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.to_string().into())
    })
}

fn parse_opt_col<T>(row: &rusqlite::Row, idx: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse().map_err(|e: T::Err| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.to_string().into())
        })
    })
    .transpose()
}

fn get_u64(row: &rusqlite::Row, idx: &str) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

fn hash_from_hex(s: &str) -> Result<[u8; 32], hex::FromHexError> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

impl SqliteStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS deposits (
                key TEXT PRIMARY KEY,
                funding_tx_hash TEXT NOT NULL,
                funding_output_index INTEGER NOT NULL,
                depositor TEXT NOT NULL,
                wallet_pubkey_hash TEXT NOT NULL,
                amount INTEGER NOT NULL,
                revealed_at INTEGER NOT NULL,
                swept_at INTEGER NOT NULL DEFAULT 0,
                vault TEXT,
                treasury_fee INTEGER NOT NULL,
                extra_data TEXT
            );

            CREATE TABLE IF NOT EXISTS reservations (
                utxo_hash TEXT PRIMARY KEY,
                depositor TEXT NOT NULL,
                btc_amount INTEGER NOT NULL,
                tbtc_minted INTEGER NOT NULL,
                treasury_fee INTEGER NOT NULL,
                liquidation_bonus INTEGER NOT NULL,
                sweep_fee INTEGER NOT NULL DEFAULT 0,
                deposit_timestamp INTEGER NOT NULL,
                expiry_timestamp INTEGER NOT NULL,
                btc_redemption_address TEXT NOT NULL,
                wallet_pubkey_hash TEXT NOT NULL,
                funding_tx_hash TEXT NOT NULL,
                funding_output_index INTEGER NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wallets (
                pubkey_hash TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                main_utxo_hash TEXT
            );

            CREATE TABLE IF NOT EXISTS depositor_reservations (
                depositor TEXT NOT NULL,
                utxo_hash TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (depositor, utxo_hash)
            );

            CREATE TABLE IF NOT EXISTS priority_redemptions (
                utxo_hash TEXT PRIMARY KEY,
                wallet_pubkey_hash TEXT NOT NULL,
                redeemer TEXT NOT NULL,
                redemption_address TEXT NOT NULL,
                output_script TEXT NOT NULL,
                requested_amount INTEGER NOT NULL,
                fee_allowance INTEGER NOT NULL,
                requested_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vaults (
                vault TEXT PRIMARY KEY,
                trusted INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS balances (
                account TEXT PRIMARY KEY,
                balance INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                at INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deposits_wallet ON deposits(wallet_pubkey_hash);
            CREATE INDEX IF NOT EXISTS idx_reservations_status ON reservations(status);
            CREATE INDEX IF NOT EXISTS idx_priority_redemptions_wallet
                ON priority_redemptions(wallet_pubkey_hash);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    // =========================================================================
    // Row conversion
    // =========================================================================

    fn row_to_deposit(row: &rusqlite::Row) -> rusqlite::Result<DepositRecord> {
        Ok(DepositRecord {
            key: parse_col(row, "key")?,
            funding_tx_hash: parse_col(row, "funding_tx_hash")?,
            funding_output_index: row.get::<_, i64>("funding_output_index")? as u32,
            depositor: Identity::new(row.get::<_, String>("depositor")?),
            wallet_pubkey_hash: parse_col(row, "wallet_pubkey_hash")?,
            amount: get_u64(row, "amount")?,
            revealed_at: get_u64(row, "revealed_at")?,
            swept_at: get_u64(row, "swept_at")?,
            vault: row.get::<_, Option<String>>("vault")?.map(Identity::new),
            treasury_fee: get_u64(row, "treasury_fee")?,
            extra_data: parse_opt_col(row, "extra_data")?,
        })
    }

    fn row_to_reservation(row: &rusqlite::Row) -> rusqlite::Result<ReservationRecord> {
        let address: String = row.get("btc_redemption_address")?;
        let btc_redemption_address = RedemptionAddress::try_from(address)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into()))?;

        Ok(ReservationRecord {
            utxo_hash: parse_col(row, "utxo_hash")?,
            depositor: Identity::new(row.get::<_, String>("depositor")?),
            btc_amount: get_u64(row, "btc_amount")?,
            tbtc_minted: get_u64(row, "tbtc_minted")?,
            treasury_fee: get_u64(row, "treasury_fee")?,
            liquidation_bonus: get_u64(row, "liquidation_bonus")?,
            sweep_fee: get_u64(row, "sweep_fee")?,
            deposit_timestamp: get_u64(row, "deposit_timestamp")?,
            expiry_timestamp: get_u64(row, "expiry_timestamp")?,
            btc_redemption_address,
            wallet_pubkey_hash: parse_col(row, "wallet_pubkey_hash")?,
            funding_tx_hash: parse_col(row, "funding_tx_hash")?,
            funding_output_index: row.get::<_, i64>("funding_output_index")? as u32,
            status: parse_col(row, "status")?,
        })
    }

    fn row_to_wallet(row: &rusqlite::Row) -> rusqlite::Result<Wallet> {
        let main_utxo_hash = row
            .get::<_, Option<String>>("main_utxo_hash")?
            .map(|s| {
                hash_from_hex(&s).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })
            })
            .transpose()?;

        Ok(Wallet {
            pubkey_hash: parse_col(row, "pubkey_hash")?,
            state: parse_col(row, "state")?,
            main_utxo_hash,
        })
    }

    fn row_to_priority_redemption(row: &rusqlite::Row) -> rusqlite::Result<PriorityRedemption> {
        let address: String = row.get("redemption_address")?;
        let redemption_address = RedemptionAddress::try_from(address).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into())
        })?;

        Ok(PriorityRedemption {
            utxo_hash: parse_col(row, "utxo_hash")?,
            wallet_pubkey_hash: parse_col(row, "wallet_pubkey_hash")?,
            redeemer: Identity::new(row.get::<_, String>("redeemer")?),
            redemption_address,
            output_script: row.get("output_script")?,
            requested_amount: get_u64(row, "requested_amount")?,
            fee_allowance: get_u64(row, "fee_allowance")?,
            requested_at: get_u64(row, "requested_at")?,
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<LoggedEvent> {
        let payload: String = row.get("payload")?;
        let event: SettlementEvent = serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?;

        Ok(LoggedEvent {
            seq: get_u64(row, "seq")?,
            at: get_u64(row, "at")?,
            event,
        })
    }

    // =========================================================================
    // Writes (inside a transaction)
    // =========================================================================

    fn upsert_deposit(conn: &Connection, record: &DepositRecord) -> rusqlite::Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO deposits (
                key, funding_tx_hash, funding_output_index, depositor,
                wallet_pubkey_hash, amount, revealed_at, swept_at,
                vault, treasury_fee, extra_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.key.to_string(),
                record.funding_tx_hash.to_string(),
                record.funding_output_index as i64,
                record.depositor.as_str(),
                record.wallet_pubkey_hash.to_string(),
                record.amount as i64,
                record.revealed_at as i64,
                record.swept_at as i64,
                record.vault.as_ref().map(|v| v.as_str().to_string()),
                record.treasury_fee as i64,
                record.extra_data.map(|e| e.to_string()),
            ],
        )?;
        Ok(())
    }

    fn upsert_reservation(conn: &Connection, record: &ReservationRecord) -> rusqlite::Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO reservations (
                utxo_hash, depositor, btc_amount, tbtc_minted, treasury_fee,
                liquidation_bonus, sweep_fee, deposit_timestamp, expiry_timestamp,
                btc_redemption_address, wallet_pubkey_hash, funding_tx_hash,
                funding_output_index, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                record.utxo_hash.to_string(),
                record.depositor.as_str(),
                record.btc_amount as i64,
                record.tbtc_minted as i64,
                record.treasury_fee as i64,
                record.liquidation_bonus as i64,
                record.sweep_fee as i64,
                record.deposit_timestamp as i64,
                record.expiry_timestamp as i64,
                String::from(record.btc_redemption_address.clone()),
                record.wallet_pubkey_hash.to_string(),
                record.funding_tx_hash.to_string(),
                record.funding_output_index as i64,
                record.status.to_string(),
            ],
        )?;
        Ok(())
    }

    fn write_delta(conn: &Connection, delta: &StateDelta) -> rusqlite::Result<()> {
        for record in &delta.deposits {
            Self::upsert_deposit(conn, record)?;
        }
        for record in &delta.reservations {
            Self::upsert_reservation(conn, record)?;
        }
        for wallet in &delta.wallets {
            conn.execute(
                "INSERT OR REPLACE INTO wallets (pubkey_hash, state, main_utxo_hash) \
                 VALUES (?1, ?2, ?3)",
                params![
                    wallet.pubkey_hash.to_string(),
                    wallet.state.to_string(),
                    wallet.main_utxo_hash.map(hex::encode),
                ],
            )?;
        }
        for (depositor, keys) in &delta.depositor_reservations {
            for (position, key) in keys.iter().enumerate() {
                conn.execute(
                    "INSERT OR REPLACE INTO depositor_reservations \
                     (depositor, utxo_hash, position) VALUES (?1, ?2, ?3)",
                    params![depositor.as_str(), key.to_string(), position as i64],
                )?;
            }
        }
        for r in &delta.priority_redemptions {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO priority_redemptions (
                    utxo_hash, wallet_pubkey_hash, redeemer, redemption_address,
                    output_script, requested_amount, fee_allowance, requested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    r.utxo_hash.to_string(),
                    r.wallet_pubkey_hash.to_string(),
                    r.redeemer.as_str(),
                    String::from(r.redemption_address.clone()),
                    r.output_script,
                    r.requested_amount as i64,
                    r.fee_allowance as i64,
                    r.requested_at as i64,
                ],
            )?;
        }
        for (vault, trusted) in &delta.vaults {
            conn.execute(
                "INSERT OR REPLACE INTO vaults (vault, trusted) VALUES (?1, ?2)",
                params![vault.as_str(), *trusted as i64],
            )?;
        }
        Ok(())
    }

    // Synchronous helper methods for the trait implementations

    fn commit_sync(
        &self,
        delta: &StateDelta,
        events: &[LoggedEvent],
        balances: &[BalanceUpdate],
    ) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        Self::write_delta(&tx, delta).map_err(db_err)?;

        for (account, balance) in balances {
            tx.execute(
                "INSERT OR REPLACE INTO balances (account, balance) VALUES (?1, ?2)",
                params![account.as_str(), *balance as i64],
            )
            .map_err(db_err)?;
        }

        for logged in events {
            let payload = serde_json::to_string(&logged.event)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            tx.execute(
                "INSERT INTO events (seq, at, kind, payload) VALUES (?1, ?2, ?3, ?4)",
                params![
                    logged.seq as i64,
                    logged.at as i64,
                    logged.event.kind(),
                    payload
                ],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                    if err.extended_code == 1555 || err.extended_code == 2067 {
                        return StorageError::Duplicate(format!("event seq {}", logged.seq));
                    }
                }
                db_err(e)
            })?;
        }

        tx.commit().map_err(db_err)
    }

    fn query_all<T>(
        conn: &Connection,
        sql: &str,
        map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
    ) -> StorageResult<Vec<T>> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], map)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        Ok(rows)
    }

    fn load_sync(&self) -> StorageResult<(SettlementState, Vec<LoggedEvent>)> {
        let conn = self.conn()?;
        let mut state = SettlementState::default();

        for record in Self::query_all(&conn, "SELECT * FROM deposits", Self::row_to_deposit)? {
            state.deposits.insert(record.key, record);
        }
        for record in
            Self::query_all(&conn, "SELECT * FROM reservations", Self::row_to_reservation)?
        {
            state.reservations.insert(record.utxo_hash, record);
        }
        for wallet in Self::query_all(&conn, "SELECT * FROM wallets", Self::row_to_wallet)? {
            state.wallets.insert(wallet.pubkey_hash, wallet);
        }
        for redemption in Self::query_all(
            &conn,
            "SELECT * FROM priority_redemptions",
            Self::row_to_priority_redemption,
        )? {
            state.priority_redemptions.insert(redemption.utxo_hash, redemption);
        }

        let index = Self::query_all(
            &conn,
            "SELECT depositor, utxo_hash FROM depositor_reservations ORDER BY depositor, position",
            |row| {
                let depositor = Identity::new(row.get::<_, String>(0)?);
                Ok((depositor, parse_col::<DepositKey>(row, "utxo_hash")?))
            },
        )?;
        for (depositor, key) in index {
            state
                .depositor_reservations
                .entry(depositor)
                .or_default()
                .push(key);
        }

        let vaults = Self::query_all(&conn, "SELECT vault, trusted FROM vaults", |row| {
            Ok((Identity::new(row.get::<_, String>(0)?), row.get::<_, i64>(1)? != 0))
        })?;
        state.vaults.extend(vaults);

        let events = Self::query_all(
            &conn,
            "SELECT * FROM events ORDER BY seq ASC",
            Self::row_to_event,
        )?;

        Ok((state, events))
    }

    fn load_balances_sync(&self) -> StorageResult<Vec<BalanceUpdate>> {
        let conn = self.conn()?;
        Self::query_all(
            &conn,
            "SELECT account, balance FROM balances ORDER BY account ASC",
            |row| Ok((Identity::new(row.get::<_, String>(0)?), get_u64(row, "balance")?)),
        )
    }

    fn get_deposit_sync(&self, key: &DepositKey) -> StorageResult<Option<DepositRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM deposits WHERE key = ?1",
            params![key.to_string()],
            Self::row_to_deposit,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_reservation_sync(
        &self,
        utxo_hash: &DepositKey,
    ) -> StorageResult<Option<ReservationRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM reservations WHERE utxo_hash = ?1",
            params![utxo_hash.to_string()],
            Self::row_to_reservation,
        )
        .optional()
        .map_err(db_err)
    }

    fn reservations_by_depositor_sync(
        &self,
        depositor: &Identity,
    ) -> StorageResult<Vec<ReservationRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT r.* FROM depositor_reservations d
            JOIN reservations r ON r.utxo_hash = d.utxo_hash
            WHERE d.depositor = ?1
            ORDER BY d.position ASC
            "#,
            )
            .map_err(db_err)?;

        let records = stmt
            .query_map(params![depositor.as_str()], Self::row_to_reservation)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }

    fn events_since_sync(&self, after: u64) -> StorageResult<Vec<LoggedEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT * FROM events WHERE seq > ?1 ORDER BY seq ASC")
            .map_err(db_err)?;

        let events = stmt
            .query_map(params![after as i64], Self::row_to_event)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(events)
    }
}

#[async_trait]
impl SettlementStore for SqliteStore {
    async fn commit(
        &self,
        delta: &StateDelta,
        events: &[LoggedEvent],
        balances: &[BalanceUpdate],
    ) -> StorageResult<()> {
        self.commit_sync(delta, events, balances)
    }

    async fn load(&self) -> StorageResult<(SettlementState, Vec<LoggedEvent>)> {
        self.load_sync()
    }

    async fn load_balances(&self) -> StorageResult<Vec<BalanceUpdate>> {
        self.load_balances_sync()
    }

    async fn get_deposit(&self, key: &DepositKey) -> StorageResult<Option<DepositRecord>> {
        self.get_deposit_sync(key)
    }

    async fn get_reservation(
        &self,
        utxo_hash: &DepositKey,
    ) -> StorageResult<Option<ReservationRecord>> {
        self.get_reservation_sync(utxo_hash)
    }

    async fn reservations_by_depositor(
        &self,
        depositor: &Identity,
    ) -> StorageResult<Vec<ReservationRecord>> {
        self.reservations_by_depositor_sync(depositor)
    }

    async fn events_since(&self, after: u64) -> StorageResult<Vec<LoggedEvent>> {
        self.events_since_sync(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::reservation::{finalize_sweep, reserve, ReserveRequest};
    use crate::settlement::reveal::FundingReveal;
    use crate::settlement::state::{register_wallet, set_vault_status};
    use crate::settlement::test_support::{funding_tx, WALLET};
    use crate::settlement::EventLog;
    use crate::types::{SettlementParams, WalletState};

    /// Wallet, vault and one finalized reservation
    fn populated() -> (SettlementState, Vec<SettlementEvent>, DepositKey) {
        let params = SettlementParams::default();
        let mut events = Vec::new();

        let t = register_wallet(&SettlementState::default(), WALLET, WalletState::Live).unwrap();
        events.extend(t.events);
        let t = set_vault_status(&t.state, Identity::new("vault"), true);
        events.extend(t.events);

        let request = ReserveRequest {
            funding: FundingReveal {
                funding_tx: funding_tx(3, &[50_000_000]),
                funding_output_index: 0,
                wallet_pubkey_hash: WALLET,
                vault: None,
            },
            reservation_days: 90,
            btc_redemption_address: RedemptionAddress::new(vec![0x44; 32]).unwrap(),
        };
        let t = reserve(&t.state, &params, &Identity::new("alice"), &request, 1_000).unwrap();
        events.extend(t.events);
        let key = t.output.utxo_hash;

        let mut state = t.state;
        finalize_sweep(&mut state, &key, 25, &mut events).unwrap();
        if let Some(wallet) = state.wallets.get_mut(&WALLET) {
            wallet.main_utxo_hash = Some([0x55; 32]);
        }

        (state, events, key)
    }

    #[tokio::test]
    async fn test_commit_and_reload() {
        let store = SqliteStore::in_memory().unwrap();
        let (state, events, key) = populated();
        let logged = EventLog::default().stage(events, 1_000);

        let delta = SettlementState::default().diff(&state);
        let balances = vec![
            (Identity::new("alice"), 49_000_000),
            (Identity::new("bridge"), u64::MAX),
        ];
        store.commit(&delta, &logged, &balances).await.unwrap();

        let (loaded, loaded_events) = store.load().await.unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded_events, logged);
        assert_eq!(store.load_balances().await.unwrap(), balances);

        let reservation = store.get_reservation(&key).await.unwrap().unwrap();
        assert_eq!(reservation.sweep_fee, 25);
        assert!(store.get_deposit(&key).await.unwrap().unwrap().is_reserved());
        assert_eq!(
            store
                .reservations_by_depositor(&Identity::new("alice"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.events_since(2).await.unwrap().len(), logged.len() - 2);
    }

    #[tokio::test]
    async fn test_duplicate_event_rolls_back_delta() {
        let store = SqliteStore::in_memory().unwrap();
        let (state, events, key) = populated();
        let logged = EventLog::default().stage(events, 1_000);
        store
            .commit(&StateDelta::default(), &logged[..1], &[])
            .await
            .unwrap();

        // replays seq 1 alongside the delta: nothing from the delta may land
        let delta = SettlementState::default().diff(&state);
        assert!(matches!(
            store
                .commit(&delta, &logged, &[(Identity::new("alice"), 1)])
                .await,
            Err(StorageError::Duplicate(_))
        ));
        assert!(store.get_reservation(&key).await.unwrap().is_none());
        assert!(store.load_balances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_balances_overwrite_per_account() {
        let store = SqliteStore::in_memory().unwrap();
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");

        store
            .commit(&StateDelta::default(), &[], &[(alice.clone(), 10), (bob.clone(), 3)])
            .await
            .unwrap();
        store
            .commit(&StateDelta::default(), &[], &[(alice.clone(), 0)])
            .await
            .unwrap();

        assert_eq!(
            store.load_balances().await.unwrap(),
            vec![(alice, 0), (bob, 3)]
        );
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = SqliteStore::in_memory().unwrap();
        let key = DepositKey([1u8; 32]);
        assert!(store.get_deposit(&key).await.unwrap().is_none());
        assert!(store
            .reservations_by_depositor(&Identity::new("nobody"))
            .await
            .unwrap()
            .is_empty());
    }
}
