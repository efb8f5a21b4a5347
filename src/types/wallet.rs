//! Wallet Types
//!
//! Minimal view of a custodial wallet: lifecycle state and the hash of its
//! current main UTXO.

use serde::{Deserialize, Serialize};

use super::primitives::{PubKeyHash, TxHash};
use crate::btc::hash::sha256;

/// Lifecycle state of a custodial wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletState {
    Unknown,
    Live,
    MovingFunds,
    Closing,
    Closed,
    Terminated,
}

impl WalletState {
    /// Deposits can be revealed to (and reserved against) live wallets only
    pub fn accepts_deposits(&self) -> bool {
        matches!(self, WalletState::Live)
    }

    /// Sweeps are accepted while live or moving funds
    pub fn accepts_sweeps(&self) -> bool {
        matches!(self, WalletState::Live | WalletState::MovingFunds)
    }
}

impl std::fmt::Display for WalletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Live => "live",
            Self::MovingFunds => "moving_funds",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WalletState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "live" => Ok(Self::Live),
            "moving_funds" => Ok(Self::MovingFunds),
            "closing" => Ok(Self::Closing),
            "closed" => Ok(Self::Closed),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("unknown wallet state: {}", s)),
        }
    }
}

/// The wallet's single consolidated balance-holding output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainUtxo {
    pub tx_hash: TxHash,
    pub output_index: u32,
    pub value: u64,
}

impl MainUtxo {
    /// Commitment stored in the wallet's main-UTXO slot
    pub fn hash(&self) -> [u8; 32] {
        let mut preimage = [0u8; 44];
        preimage[..32].copy_from_slice(&self.tx_hash.0);
        preimage[32..36].copy_from_slice(&self.output_index.to_be_bytes());
        preimage[36..].copy_from_slice(&self.value.to_be_bytes());
        sha256(&preimage)
    }
}

/// Wallet state as consumed by the settlement core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub pubkey_hash: PubKeyHash,
    pub state: WalletState,
    /// Hash of the current main UTXO, `None` before the first sweep
    #[serde(with = "hex_opt")]
    pub main_utxo_hash: Option<[u8; 32]>,
}

impl Wallet {
    pub fn new(pubkey_hash: PubKeyHash, state: WalletState) -> Self {
        Self {
            pubkey_hash,
            state,
            main_utxo_hash: None,
        }
    }
}

mod hex_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<[u8; 32]>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 32]>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            let mut out = [0u8; 32];
            hex::decode_to_slice(&s, &mut out).map_err(serde::de::Error::custom)?;
            Ok(out)
        })
        .transpose()
    }
}
