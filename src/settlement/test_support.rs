//! Transaction fixtures for settlement unit tests

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, WPubkeyHash, Witness,
};

use crate::btc::BitcoinTxInfo;
use crate::types::{PubKeyHash, TxHash};

pub const WALLET: PubKeyHash = PubKeyHash([0xaa; 20]);

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

/// Funding transaction with one output per amount; `seed` makes it unique
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

/// Sweep transaction spending `inputs` into one output paying `wallet`
pub fn sweep_tx(inputs: &[(TxHash, u32)], value: u64, wallet: PubKeyHash) -> BitcoinTxInfo {
    let tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs.iter().map(|(hash, vout)| tx_in(hash.0, *vout)).collect(),
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: p2wpkh(wallet.0),
        }],
    };
    BitcoinTxInfo::from(&tx)
}
