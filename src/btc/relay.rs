//! Block Header Relay
//!
//! Source of truth for the merkle roots and chain depth that sweep proofs
//! are checked against. A proof only names its block; the header behind it
//! always comes from a relay the operator configured.
//!
//! - [`EsploraRelay`] reads headers, best-chain status and the tip height
//!   from an Esplora HTTP API
//! - [`MemoryHeaderRelay`] holds headers fed to it directly

use async_trait::async_trait;
use bitcoin::block::Header;
use bitcoin::consensus::encode::deserialize;
use bitcoin::hashes::Hash;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// Relay errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("block {0} is not on the best chain")]
    NotInBestChain(String),

    #[error("relay request failed: {0}")]
    Http(String),

    #[error("relay returned malformed data: {0}")]
    Parse(String),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::BlockNotFound(_) | RelayError::NotInBestChain(_) => "PROOF_UNKNOWN_BLOCK",
            RelayError::Http(_) | RelayError::Parse(_) => "PROOF_RELAY_UNAVAILABLE",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Http(e.to_string())
    }
}

/// Display form of a 32-byte hash (reversed hex)
pub fn display_hash(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

// ============================================================================
// Headers
// ============================================================================

/// The parts of a relayed header a proof is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayedHeader {
    /// Block hash (internal byte order)
    pub block_hash: [u8; 32],
    /// Merkle root of the block's transactions (internal byte order)
    pub merkle_root: [u8; 32],
    pub height: u64,
}

impl RelayedHeader {
    /// Parse a raw 80-byte header found at `height`
    pub fn from_raw(raw: &[u8], height: u64) -> Result<Self, RelayError> {
        if raw.len() != 80 {
            return Err(RelayError::Parse(format!(
                "invalid header length: {} bytes",
                raw.len()
            )));
        }
        let header: Header =
            deserialize(raw).map_err(|e| RelayError::Parse(format!("invalid header: {}", e)))?;

        Ok(Self {
            block_hash: header.block_hash().to_byte_array(),
            merkle_root: header.merkle_root.to_byte_array(),
            height,
        })
    }
}

/// Trusted header source consumed by the proof validator
#[async_trait]
pub trait HeaderRelay: Send + Sync {
    /// Header of a best-chain block
    async fn header(&self, block_hash: &[u8; 32]) -> Result<RelayedHeader, RelayError>;

    /// Height of the best-chain tip
    async fn tip_height(&self) -> Result<u64, RelayError>;
}

// ============================================================================
// Esplora
// ============================================================================

#[derive(Debug, Deserialize)]
struct EsploraBlockStatus {
    in_best_chain: bool,
    height: Option<u64>,
}

/// Header relay backed by an Esplora HTTP API
pub struct EsploraRelay {
    client: Client,
    base_url: String,
}

impl EsploraRelay {
    /// Create for mainnet
    pub fn mainnet() -> Self {
        Self::new("https://blockstream.info/api")
    }

    /// Create for testnet
    pub fn testnet() -> Self {
        Self::new("https://blockstream.info/testnet/api")
    }

    /// Create with custom URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(&self, path: &str, missing: &str) -> Result<String, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RelayError::BlockNotFound(missing.to_string()));
        }
        if !resp.status().is_success() {
            return Err(RelayError::Http(format!("{} returned {}", url, resp.status())));
        }
        Ok(resp.text().await?.trim().to_string())
    }
}

#[async_trait]
impl HeaderRelay for EsploraRelay {
    async fn header(&self, block_hash: &[u8; 32]) -> Result<RelayedHeader, RelayError> {
        let display = display_hash(block_hash);

        let status_url = format!("{}/block/{}/status", self.base_url, display);
        let resp = self.client.get(&status_url).send().await?;
        if !resp.status().is_success() {
            return Err(RelayError::BlockNotFound(display));
        }
        let status: EsploraBlockStatus = resp.json().await?;
        let height = match (status.in_best_chain, status.height) {
            (true, Some(height)) => height,
            _ => return Err(RelayError::NotInBestChain(display)),
        };

        let header_hex = self
            .get_text(&format!("/block/{}/header", display), &display)
            .await?;
        let raw = hex::decode(&header_hex)
            .map_err(|e| RelayError::Parse(format!("invalid header hex: {}", e)))?;
        let header = RelayedHeader::from_raw(&raw, height)?;

        // the relay must serve the block that was asked for
        if header.block_hash != *block_hash {
            return Err(RelayError::Parse(format!(
                "header for {} hashes to {}",
                display,
                display_hash(&header.block_hash)
            )));
        }
        Ok(header)
    }

    async fn tip_height(&self) -> Result<u64, RelayError> {
        self.get_text("/blocks/tip/height", "tip")
            .await?
            .parse()
            .map_err(|e| RelayError::Parse(format!("invalid height: {}", e)))
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Header relay over headers inserted by its owner
#[derive(Debug, Default)]
pub struct MemoryHeaderRelay {
    headers: RwLock<HashMap<[u8; 32], RelayedHeader>>,
    tip: AtomicU64,
}

impl MemoryHeaderRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a best-chain header; the tip never moves below it
    pub fn insert(&self, header: RelayedHeader) {
        self.headers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(header.block_hash, header);
        self.tip.fetch_max(header.height, Ordering::SeqCst);
    }

    /// Drop a header, as after a reorg
    pub fn remove(&self, block_hash: &[u8; 32]) {
        self.headers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(block_hash);
    }

    pub fn set_tip(&self, height: u64) {
        self.tip.store(height, Ordering::SeqCst);
    }
}

#[async_trait]
impl HeaderRelay for MemoryHeaderRelay {
    async fn header(&self, block_hash: &[u8; 32]) -> Result<RelayedHeader, RelayError> {
        self.headers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(block_hash)
            .copied()
            .ok_or_else(|| RelayError::BlockNotFound(display_hash(block_hash)))
    }

    async fn tip_height(&self) -> Result<u64, RelayError> {
        Ok(self.tip.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_HEADER: &str = concat!(
        "0100000000000000000000000000000000000000000000000000000000000000",
        "000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa",
        "4b1e5e4a29ab5f49ffff001d1dac2b7c"
    );

    #[test]
    fn test_parse_genesis_header() {
        let raw = hex::decode(GENESIS_HEADER).unwrap();
        let header = RelayedHeader::from_raw(&raw, 0).unwrap();

        assert_eq!(
            display_hash(&header.block_hash),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(
            display_hash(&header.merkle_root),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn test_truncated_header_rejected() {
        let raw = hex::decode(GENESIS_HEADER).unwrap();
        assert!(matches!(
            RelayedHeader::from_raw(&raw[..79], 0),
            Err(RelayError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_relay() {
        let relay = MemoryHeaderRelay::new();
        let header = RelayedHeader {
            block_hash: [1u8; 32],
            merkle_root: [2u8; 32],
            height: 100,
        };
        relay.insert(header);

        assert_eq!(relay.header(&[1u8; 32]).await.unwrap(), header);
        assert_eq!(relay.tip_height().await.unwrap(), 100);
        assert!(matches!(
            relay.header(&[3u8; 32]).await,
            Err(RelayError::BlockNotFound(_))
        ));

        relay.set_tip(105);
        relay.insert(RelayedHeader { height: 90, ..header });
        assert_eq!(relay.tip_height().await.unwrap(), 105);

        relay.remove(&[1u8; 32]);
        assert!(relay.header(&[1u8; 32]).await.is_err());
    }

    #[test]
    fn test_relay_error_codes() {
        assert_eq!(
            RelayError::NotInBestChain("x".into()).code(),
            "PROOF_UNKNOWN_BLOCK"
        );
        assert_eq!(RelayError::Http("down".into()).code(), "PROOF_RELAY_UNAVAILABLE");
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(
            EsploraRelay::new("http://localhost:3002/api/").base_url(),
            "http://localhost:3002/api"
        );
        assert_eq!(EsploraRelay::mainnet().base_url(), "https://blockstream.info/api");
    }
}
