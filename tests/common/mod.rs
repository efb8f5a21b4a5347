//! Shared fixtures for settlement integration tests

#![allow(dead_code)]

use std::sync::Arc;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, WPubkeyHash, Witness,
};

use btc_settlement::btc::hash::double_sha256;
use btc_settlement::settlement::FixedClock;
use btc_settlement::types::{
    Identity, MainUtxo, PubKeyHash, RedemptionAddress, SettlementParams, TxHash, WalletState,
};
use btc_settlement::{
    BitcoinTxInfo, FundingReveal, MemoryHeaderRelay, MemoryLedger, MerkleProofValidator,
    RelayedHeader, ReserveRequest, RevealRequest, SettlementService, SettlementStore, SpvProof,
    SweepRequest,
};

pub const NOW: u64 = 1_700_000_000;
pub const DAY: u64 = 86_400;
pub const WALLET: PubKeyHash = PubKeyHash([0xaa; 20]);
pub const CONFIRMATIONS: u32 = 6;
pub const BLOCK_HEIGHT: u64 = 840_000;

fn tx_in(txid: [u8; 32], vout: u32) -> TxIn {
    TxIn {
        previous_output: OutPoint {
            txid: Txid::from_byte_array(txid),
            vout,
        },
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

fn p2wpkh(hash: [u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(hash))
}

/// Funding transaction with one output per amount
pub fn funding_tx(seed: u8, amounts: &[u64]) -> BitcoinTxInfo {
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![tx_in([seed; 32], 0)],
        output: amounts
            .iter()
            .map(|amount| TxOut {
                value: Amount::from_sat(*amount),
                script_pubkey: p2wpkh([seed; 20]),
            })
            .collect(),
    };
    BitcoinTxInfo::from(&tx)
}

/// Sweep transaction with a single output paying the wallet
pub fn sweep_tx(inputs: &[(TxHash, u32)], value: u64) -> BitcoinTxInfo {
    let tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs.iter().map(|(hash, vout)| tx_in(hash.0, *vout)).collect(),
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: p2wpkh(WALLET.0),
        }],
    };
    BitcoinTxInfo::from(&tx)
}

/// Relay a block holding only `tx`, buried `CONFIRMATIONS` deep, and prove
/// `tx` in it
pub fn single_tx_proof(relay: &MemoryHeaderRelay, tx: &BitcoinTxInfo) -> SpvProof {
    let block_hash = double_sha256(&tx.hash().0);
    relay.insert(RelayedHeader {
        block_hash,
        merkle_root: tx.hash().0,
        height: BLOCK_HEIGHT,
    });
    relay.set_tip(BLOCK_HEIGHT + CONFIRMATIONS as u64 - 1);
    SpvProof {
        block_hash,
        siblings: vec![],
        tx_index: 0,
    }
}

pub fn funding(tx: &BitcoinTxInfo, index: u32) -> FundingReveal {
    FundingReveal {
        funding_tx: tx.clone(),
        funding_output_index: index,
        wallet_pubkey_hash: WALLET,
        vault: None,
    }
}

pub fn reveal_request(tx: &BitcoinTxInfo, index: u32) -> RevealRequest {
    RevealRequest {
        funding: funding(tx, index),
        extra_data: None,
    }
}

pub fn reserve_request(tx: &BitcoinTxInfo, days: u32) -> ReserveRequest {
    ReserveRequest {
        funding: funding(tx, 0),
        reservation_days: days,
        btc_redemption_address: RedemptionAddress::new(vec![0x33; 20]).unwrap(),
    }
}

pub fn sweep_request(
    relay: &MemoryHeaderRelay,
    tx: BitcoinTxInfo,
    main_utxo: Option<MainUtxo>,
) -> SweepRequest {
    SweepRequest {
        wallet_pubkey_hash: WALLET,
        proof: single_tx_proof(relay, &tx),
        sweep_tx: tx,
        main_utxo,
        vault: None,
    }
}

pub fn id(name: &str) -> Identity {
    Identity::new(name)
}

/// Service over `store` and `relay`, with a fresh ledger
pub async fn load_service(
    params: SettlementParams,
    store: Arc<dyn SettlementStore>,
    relay: Arc<MemoryHeaderRelay>,
    now: u64,
) -> (SettlementService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now));
    let service = SettlementService::load(
        params.clone(),
        store,
        Box::new(MemoryLedger::new(params.bridge.clone())),
        Arc::new(MerkleProofValidator::new(relay, CONFIRMATIONS)),
        clock.clone(),
    )
    .await
    .unwrap();
    (service, clock)
}

/// Service over `store` with a live wallet registered
pub async fn service(
    params: SettlementParams,
    store: Arc<dyn SettlementStore>,
) -> (SettlementService, Arc<FixedClock>, Arc<MemoryHeaderRelay>) {
    let relay = Arc::new(MemoryHeaderRelay::new());
    let (mut service, clock) = load_service(params, store, relay.clone(), NOW).await;
    service
        .register_wallet(WALLET, WalletState::Live)
        .await
        .unwrap();
    (service, clock, relay)
}
