//! Environment-based Configuration for the Settlement Service
//!
//! All settings come from `SETTLEMENT_*` environment variables (a `.env`
//! file is loaded first by the binary). Missing values fall back to
//! defaults, except the treasury account on mainnet.
//!
//! # Environment Variables
//!
//! ## Service
//! - `SETTLEMENT_NETWORK` - "mainnet", "testnet", or "regtest" (default: "regtest")
//! - `SETTLEMENT_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `SETTLEMENT_API_PORT` - HTTP port (default: 3001)
//! - `SETTLEMENT_DB_PATH` - SQLite database path (default: "data/settlement.db")
//!
//! ## Accounts
//! - `SETTLEMENT_TREASURY` - Treasury account (required on mainnet)
//! - `SETTLEMENT_BRIDGE` - Bridge account holding the liquidation-bonus pool
//!
//! ## Deposit Parameters
//! - `SETTLEMENT_DUST_THRESHOLD_SATS` - Minimum revealed amount
//! - `SETTLEMENT_TREASURY_FEE_DIVISOR` - `fee = amount / divisor`, 0 disables
//! - `SETTLEMENT_TX_MAX_FEE_SATS` - Maximum sweep fee share per deposit
//! - `SETTLEMENT_PROOF_CONFIRMATIONS` - Confirmations required on sweep proofs
//! - `SETTLEMENT_ESPLORA_URL` - Esplora API the block headers are read from
//!   (default: per network)
//!
//! ## Reservation Parameters
//! - `SETTLEMENT_STORAGE_FEE_BPS` - Annual storage fee in basis points
//! - `SETTLEMENT_MIN_STORAGE_FEE_SATS` - Minimum storage fee per started year
//! - `SETTLEMENT_LIQUIDATION_BONUS_BPS` - Bonus as basis points of the storage fee
//! - `SETTLEMENT_MIN_RESERVATION_SATS` - Smallest reservable UTXO
//! - `SETTLEMENT_MAX_RESERVATION_DAYS` - Longest reservation window (at most 1460)

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::types::{
    parse_sats, sats_to_display, DepositParams, Identity, ReservationParams, SettlementParams,
    MAX_RESERVATION_DAYS,
};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" | "dev" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "SETTLEMENT_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get bitcoin network enum
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Esplora API used for block headers when none is configured
    pub fn default_esplora_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://blockstream.info/api",
            Network::Testnet => "https://blockstream.info/testnet/api",
            Network::Regtest => "http://127.0.0.1:3002",
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Network environment
    pub network: Network,

    /// Log level
    pub log_level: String,

    /// HTTP API port
    pub api_port: u16,

    /// SQLite database path
    pub db_path: String,

    /// Settlement parameters (fees, limits, accounts)
    pub params: SettlementParams,

    /// Confirmations required on sweep proofs
    pub proof_confirmations: u32,

    /// Esplora API serving the block headers proofs are checked against
    pub esplora_url: String,
}

impl SettlementConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network: Network = lookup("SETTLEMENT_NETWORK")
            .unwrap_or_else(|| "regtest".to_string())
            .parse()?;

        let log_level = lookup("SETTLEMENT_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let api_port = parse_or(&lookup, "SETTLEMENT_API_PORT", 3001u16)?;
        let db_path =
            lookup("SETTLEMENT_DB_PATH").unwrap_or_else(|| "data/settlement.db".to_string());

        // Treasury must be explicit on mainnet
        let treasury = match lookup("SETTLEMENT_TREASURY") {
            Some(v) => Identity::new(v),
            None if network == Network::Mainnet => {
                return Err(ConfigError::MissingEnvVar("SETTLEMENT_TREASURY".to_string()))
            }
            None => Identity::new("treasury"),
        };
        let bridge = Identity::new(
            lookup("SETTLEMENT_BRIDGE").unwrap_or_else(|| "bridge".to_string()),
        );
        if treasury == bridge {
            return Err(ConfigError::InvalidValue(
                "SETTLEMENT_TREASURY".to_string(),
                "treasury and bridge must be different accounts".to_string(),
            ));
        }

        let deposit_defaults = DepositParams::default();
        let deposit = DepositParams {
            dust_threshold: sats_or(
                &lookup,
                "SETTLEMENT_DUST_THRESHOLD_SATS",
                deposit_defaults.dust_threshold,
            )?,
            treasury_fee_divisor: parse_or(
                &lookup,
                "SETTLEMENT_TREASURY_FEE_DIVISOR",
                deposit_defaults.treasury_fee_divisor,
            )?,
            tx_max_fee: sats_or(
                &lookup,
                "SETTLEMENT_TX_MAX_FEE_SATS",
                deposit_defaults.tx_max_fee,
            )?,
        };

        let reservation_defaults = ReservationParams::default();
        let reservation = ReservationParams {
            storage_fee_bps: parse_or(
                &lookup,
                "SETTLEMENT_STORAGE_FEE_BPS",
                reservation_defaults.storage_fee_bps,
            )?,
            min_storage_fee: sats_or(
                &lookup,
                "SETTLEMENT_MIN_STORAGE_FEE_SATS",
                reservation_defaults.min_storage_fee,
            )?,
            liquidation_bonus_bps: parse_or(
                &lookup,
                "SETTLEMENT_LIQUIDATION_BONUS_BPS",
                reservation_defaults.liquidation_bonus_bps,
            )?,
            min_amount: sats_or(
                &lookup,
                "SETTLEMENT_MIN_RESERVATION_SATS",
                reservation_defaults.min_amount,
            )?,
            max_days: parse_or(
                &lookup,
                "SETTLEMENT_MAX_RESERVATION_DAYS",
                reservation_defaults.max_days,
            )?,
        };

        if reservation.max_days == 0 || reservation.max_days > MAX_RESERVATION_DAYS {
            return Err(ConfigError::InvalidValue(
                "SETTLEMENT_MAX_RESERVATION_DAYS".to_string(),
                format!("must be in 1..={}", MAX_RESERVATION_DAYS),
            ));
        }
        if reservation.liquidation_bonus_bps > 10_000 {
            return Err(ConfigError::InvalidValue(
                "SETTLEMENT_LIQUIDATION_BONUS_BPS".to_string(),
                "cannot exceed 10000".to_string(),
            ));
        }

        let proof_confirmations = parse_or(&lookup, "SETTLEMENT_PROOF_CONFIRMATIONS", 6u32)?;
        let esplora_url = lookup("SETTLEMENT_ESPLORA_URL")
            .unwrap_or_else(|| network.default_esplora_url().to_string());

        Ok(Self {
            network,
            log_level,
            api_port,
            db_path,
            params: SettlementParams {
                deposit,
                reservation,
                treasury,
                bridge,
            },
            proof_confirmations,
            esplora_url,
        })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let d = &self.params.deposit;
        let r = &self.params.reservation;

        println!("=== Settlement Configuration ===");
        println!("Network: {:?} ({})", self.network, self.network.bitcoin_network());
        println!("API Port: {}", self.api_port);
        println!("Database: {}", self.db_path);
        println!("Treasury: {}", self.params.treasury);
        println!("Bridge: {}", self.params.bridge);
        println!("Dust Threshold: {}", sats_to_display(d.dust_threshold));
        println!(
            "Treasury Fee Divisor: {}",
            if d.treasury_fee_divisor == 0 {
                "disabled".to_string()
            } else {
                d.treasury_fee_divisor.to_string()
            }
        );
        println!("Max Sweep Fee Share: {}", sats_to_display(d.tx_max_fee));
        println!("Proof Confirmations: {}", self.proof_confirmations);
        println!("Header Relay: {}", self.esplora_url);
        println!("Storage Fee: {} bps/year", r.storage_fee_bps);
        println!("Min Storage Fee: {}", sats_to_display(r.min_storage_fee));
        println!("Liquidation Bonus: {} bps", r.liquidation_bonus_bps);
        println!("Min Reservation: {}", sats_to_display(r.min_amount));
        println!("Max Reservation Days: {}", r.max_days);
        println!("Log Level: {}", self.log_level);
        println!("================================");
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("cannot parse {:?}", raw))
        }),
        None => Ok(default),
    }
}

/// Satoshi variable; accepts `_` and `,` separators
fn sats_or<F>(lookup: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse_sats(&raw).ok_or_else(|| {
            ConfigError::InvalidValue(name.to_string(), format!("not a satoshi amount: {:?}", raw))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("testnet".parse::<Network>(), Ok(Network::Testnet)));
        assert!(matches!("regtest".parse::<Network>(), Ok(Network::Regtest)));
        assert!("invalid".parse::<Network>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = SettlementConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.proof_confirmations, 6);
        assert_eq!(config.esplora_url, "http://127.0.0.1:3002");
        assert_eq!(config.params, SettlementParams::default());
    }

    #[test]
    fn test_overrides() {
        let config = SettlementConfig::from_lookup(lookup(&[
            ("SETTLEMENT_API_PORT", "8080"),
            ("SETTLEMENT_DUST_THRESHOLD_SATS", "50_000"),
            ("SETTLEMENT_TREASURY_FEE_DIVISOR", "0"),
            ("SETTLEMENT_MAX_RESERVATION_DAYS", "365"),
            ("SETTLEMENT_TREASURY", "dao"),
            ("SETTLEMENT_ESPLORA_URL", "http://esplora.local/api"),
        ]))
        .unwrap();

        assert_eq!(config.esplora_url, "http://esplora.local/api");

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.params.deposit.dust_threshold, 50_000);
        assert_eq!(config.params.deposit.treasury_fee_divisor, 0);
        assert_eq!(config.params.reservation.max_days, 365);
        assert_eq!(config.params.treasury, Identity::new("dao"));
    }

    #[test]
    fn test_mainnet_requires_treasury() {
        let err = SettlementConfig::from_lookup(lookup(&[("SETTLEMENT_NETWORK", "mainnet")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "SETTLEMENT_TREASURY"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(SettlementConfig::from_lookup(lookup(&[("SETTLEMENT_API_PORT", "x")])).is_err());
        assert!(SettlementConfig::from_lookup(lookup(&[(
            "SETTLEMENT_MAX_RESERVATION_DAYS",
            "1461"
        )]))
        .is_err());
        assert!(SettlementConfig::from_lookup(lookup(&[
            ("SETTLEMENT_TREASURY", "same"),
            ("SETTLEMENT_BRIDGE", "same"),
        ]))
        .is_err());
    }
}
