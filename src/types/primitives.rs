//! Primitive Identifiers
//!
//! Fixed-size hashes and account identities used as table keys.
//! All byte arrays serialize as lowercase hex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::btc::hash::sha256;

/// Bitcoin transaction hash in internal (little-endian) byte order
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(#[serde(with = "hex::serde")] pub [u8; 32]);

/// Key of a deposit record: `sha256(funding_tx_hash || funding_output_index)`
///
/// Reservation records share the key of their underlying deposit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepositKey(#[serde(with = "hex::serde")] pub [u8; 32]);

/// 20-byte public key hash identifying a custodial wallet
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PubKeyHash(#[serde(with = "hex::serde")] pub [u8; 20]);

/// Opaque 32-byte tag attached to a deposit at reveal time
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtraData(#[serde(with = "hex::serde")] pub [u8; 32]);

/// Sentinel extra data marking a reservation-backed deposit.
///
/// The ordinary reveal path refuses it, so only `reserve` can produce it.
pub const RESERVATION_TAG: ExtraData = ExtraData([0xff; 32]);

/// Ledger account / caller identity
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl DepositKey {
    /// Derive the key for a funding outpoint
    pub fn from_outpoint(funding_tx_hash: &TxHash, funding_output_index: u32) -> Self {
        let mut preimage = [0u8; 36];
        preimage[..32].copy_from_slice(&funding_tx_hash.0);
        preimage[32..].copy_from_slice(&funding_output_index.to_be_bytes());
        Self(sha256(&preimage))
    }
}

macro_rules! hex_display {
    ($name:ident, $len:expr) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut out = [0u8; $len];
                hex::decode_to_slice(s, &mut out)?;
                Ok(Self(out))
            }
        }
    };
}

hex_display!(TxHash, 32);
hex_display!(DepositKey, 32);
hex_display!(PubKeyHash, 20);
hex_display!(ExtraData, 32);
