//! Reserved Deposit Types
//!
//! A reservation pre-commits one deposit UTXO to a redemption address for a
//! bounded window:
//!
//! ```text
//! revealed ──(sweep finalizes)──> active ──(redeem, now <= expiry)──> redeemed
//!                                    └────(liquidate, now > expiry)──> liquidated
//! ```
//!
//! Accounting identity for every record:
//! `tbtc_minted + treasury_fee + liquidation_bonus + sweep_fee == btc_amount`,
//! where `sweep_fee` stays zero until the sweep finalizes the reservation.

use bitcoin::opcodes::all::{OP_PUSHBYTES_0, OP_PUSHNUM_1};
use bitcoin::script::Builder;
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};

use super::primitives::{DepositKey, Identity, PubKeyHash, TxHash};

/// Reservation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created, waiting for the sweep to consume the UTXO
    Revealed,
    /// Swept and spendable
    Active,
    /// Redeemed by the depositor before expiry
    Redeemed,
    /// Closed by a liquidator after expiry
    Liquidated,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Revealed => "revealed",
            Self::Active => "active",
            Self::Redeemed => "redeemed",
            Self::Liquidated => "liquidated",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revealed" => Ok(Self::Revealed),
            "active" => Ok(Self::Active),
            "redeemed" => Ok(Self::Redeemed),
            "liquidated" => Ok(Self::Liquidated),
            _ => Err(format!("unknown reservation status: {}", s)),
        }
    }
}

/// Bitcoin destination committed at reservation time (20 or 32 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RedemptionAddress(Vec<u8>);

impl RedemptionAddress {
    /// Accepts a 20-byte key hash or a 32-byte witness program
    pub fn new(bytes: Vec<u8>) -> Result<Self, usize> {
        match bytes.len() {
            20 | 32 => Ok(Self(bytes)),
            len => Err(len),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Output script the wallet must pay: P2WPKH for 20 bytes, P2TR for 32
    pub fn output_script(&self) -> ScriptBuf {
        match <[u8; 20]>::try_from(self.0.as_slice()) {
            Ok(hash) => Builder::new()
                .push_opcode(OP_PUSHBYTES_0)
                .push_slice(hash)
                .into_script(),
            Err(_) => {
                let mut program = [0u8; 32];
                program.copy_from_slice(&self.0);
                Builder::new()
                    .push_opcode(OP_PUSHNUM_1)
                    .push_slice(program)
                    .into_script()
            }
        }
    }
}

impl TryFrom<String> for RedemptionAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&value).map_err(|e| format!("invalid hex: {}", e))?;
        Self::new(bytes)
            .map_err(|len| format!("redemption address must be 20 or 32 bytes, got {}", len))
    }
}

impl From<RedemptionAddress> for String {
    fn from(value: RedemptionAddress) -> Self {
        hex::encode(value.0)
    }
}

/// A reserved deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    /// Same key as the underlying deposit record
    pub utxo_hash: DepositKey,
    pub depositor: Identity,
    /// Gross satoshis of the reserved UTXO
    pub btc_amount: u64,
    /// Net credit; reduced once by the network fee share at sweep
    pub tbtc_minted: u64,
    /// Storage fee owed to the treasury
    pub treasury_fee: u64,
    pub liquidation_bonus: u64,
    /// Network fee share charged when the sweep finalized the reservation
    pub sweep_fee: u64,
    pub deposit_timestamp: u64,
    pub expiry_timestamp: u64,
    pub btc_redemption_address: RedemptionAddress,
    pub wallet_pubkey_hash: PubKeyHash,
    pub funding_tx_hash: TxHash,
    pub funding_output_index: u32,
    pub status: ReservationStatus,
}

impl ReservationRecord {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Check the accounting identity
    pub fn is_balanced(&self) -> bool {
        [self.tbtc_minted, self.treasury_fee, self.liquidation_bonus, self.sweep_fee]
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
            == Some(self.btc_amount)
    }
}

/// Read-only view returned by reservation status queries
#[derive(Debug, Clone, Serialize)]
pub struct ReservationStatusResponse {
    pub utxo_hash: DepositKey,
    pub status: ReservationStatus,
    pub is_active: bool,
    pub depositor: Identity,
    pub btc_amount: u64,
    pub tbtc_minted: u64,
    pub treasury_fee: u64,
    pub liquidation_bonus: u64,
    pub deposit_timestamp: u64,
    pub expiry_timestamp: u64,
    pub btc_redemption_address: RedemptionAddress,
}

impl From<&ReservationRecord> for ReservationStatusResponse {
    fn from(record: &ReservationRecord) -> Self {
        Self {
            utxo_hash: record.utxo_hash,
            status: record.status,
            is_active: record.is_active(),
            depositor: record.depositor.clone(),
            btc_amount: record.btc_amount,
            tbtc_minted: record.tbtc_minted,
            treasury_fee: record.treasury_fee,
            liquidation_bonus: record.liquidation_bonus,
            deposit_timestamp: record.deposit_timestamp,
            expiry_timestamp: record.expiry_timestamp,
            btc_redemption_address: record.btc_redemption_address.clone(),
        }
    }
}

/// Obligation for the custodial wallet to pay a redeemed reservation's address
/// on its next outgoing transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRedemption {
    pub utxo_hash: DepositKey,
    pub wallet_pubkey_hash: PubKeyHash,
    pub redeemer: Identity,
    pub redemption_address: RedemptionAddress,
    /// Hex-encoded output script derived from the redemption address
    pub output_script: String,
    /// Satoshis the wallet owes before fees
    pub requested_amount: u64,
    /// Maximum the wallet may deduct: original treasury fee plus liquidation bonus
    pub fee_allowance: u64,
    pub requested_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redemption_address_lengths() {
        assert!(RedemptionAddress::new(vec![0u8; 20]).is_ok());
        assert!(RedemptionAddress::new(vec![0u8; 32]).is_ok());
        assert_eq!(RedemptionAddress::new(vec![0u8; 21]), Err(21));
        assert_eq!(RedemptionAddress::new(vec![]), Err(0));
    }

    #[test]
    fn test_output_scripts() {
        let p2wpkh = RedemptionAddress::new(vec![0x11; 20]).unwrap().output_script();
        assert!(p2wpkh.is_p2wpkh());

        let p2tr = RedemptionAddress::new(vec![0x22; 32]).unwrap().output_script();
        assert!(p2tr.is_p2tr());
    }

    #[test]
    fn test_redemption_address_json_rejects_bad_length() {
        let ok: RedemptionAddress =
            serde_json::from_str(&format!("\"{}\"", "ab".repeat(20))).unwrap();
        assert_eq!(ok.as_bytes().len(), 20);

        let err = serde_json::from_str::<RedemptionAddress>(&format!("\"{}\"", "ab".repeat(21)));
        assert!(err.is_err());
    }

    #[test]
    fn test_balance_identity() {
        let mut record = ReservationRecord {
            utxo_hash: DepositKey([0u8; 32]),
            depositor: Identity::new("alice"),
            btc_amount: 100_000_000,
            tbtc_minted: 98_900_000,
            treasury_fee: 1_000_000,
            liquidation_bonus: 100_000,
            sweep_fee: 0,
            deposit_timestamp: 0,
            expiry_timestamp: 0,
            btc_redemption_address: RedemptionAddress::new(vec![0u8; 20]).unwrap(),
            wallet_pubkey_hash: PubKeyHash([0u8; 20]),
            funding_tx_hash: TxHash([0u8; 32]),
            funding_output_index: 0,
            status: ReservationStatus::Revealed,
        };
        assert!(record.is_balanced());

        record.tbtc_minted -= 10;
        assert!(!record.is_balanced());

        record.sweep_fee = 10;
        assert!(record.is_balanced());
    }
}
