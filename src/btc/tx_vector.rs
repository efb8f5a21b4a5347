//! Bitcoin Input/Output Vector Decoding
//!
//! Stateless decoding of serialized input and output vectors, as they
//! appear inside a raw transaction:
//!
//! ```text
//! input vector:  varint(count) || { outpoint_hash[32] | outpoint_index[4 LE]
//!                                   | varint(len) | script | sequence[4] }*
//! output vector: varint(count) || { value[8 LE] | varint(len) | script_pubkey }*
//! ```
//!
//! Vectors are expected to have passed SPV validation upstream, but every
//! read is still bounds-checked. Any error here aborts the caller's whole
//! operation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::double_sha256;
use crate::types::{PubKeyHash, TxHash};

/// Vector decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty compact-size integer")]
    EmptyVarInt,

    #[error("truncated read at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("output index {index} out of range ({count} outputs)")]
    OutputIndexOutOfRange { index: u64, count: u64 },

    #[error("output script is neither P2WPKH nor P2PKH")]
    UnsupportedOutputScript,

    #[error("vector has {trailing} trailing bytes after the last element")]
    TrailingBytes { trailing: usize },
}

impl CodecError {
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::EmptyVarInt => "INVALID_VARINT",
            CodecError::Truncated { .. } => "TRUNCATED_VECTOR",
            CodecError::OutputIndexOutOfRange { .. } => "OUTPUT_INDEX_OUT_OF_RANGE",
            CodecError::UnsupportedOutputScript => "UNSUPPORTED_OUTPUT_SCRIPT",
            CodecError::TrailingBytes { .. } => "TRAILING_BYTES",
        }
    }
}

/// Result type for vector decoding
pub type CodecResult<T> = Result<T, CodecError>;

// ============================================================================
// Transaction info
// ============================================================================

/// Raw transaction split into the four fields the settlement core consumes.
///
/// Witness data is not part of the hashed serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinTxInfo {
    #[serde(with = "hex::serde")]
    pub version: [u8; 4],
    #[serde(with = "hex::serde")]
    pub input_vector: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub output_vector: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub locktime: [u8; 4],
}

impl BitcoinTxInfo {
    /// Transaction hash (double SHA256, internal byte order)
    pub fn hash(&self) -> TxHash {
        let mut raw = Vec::with_capacity(8 + self.input_vector.len() + self.output_vector.len());
        raw.extend_from_slice(&self.version);
        raw.extend_from_slice(&self.input_vector);
        raw.extend_from_slice(&self.output_vector);
        raw.extend_from_slice(&self.locktime);
        TxHash(double_sha256(&raw))
    }

    /// Length of the serialization the hash is taken over
    pub fn serialized_len(&self) -> usize {
        8 + self.input_vector.len() + self.output_vector.len()
    }
}

impl From<&bitcoin::Transaction> for BitcoinTxInfo {
    fn from(tx: &bitcoin::Transaction) -> Self {
        Self {
            version: tx.version.0.to_le_bytes(),
            input_vector: bitcoin::consensus::encode::serialize(&tx.input),
            output_vector: bitcoin::consensus::encode::serialize(&tx.output),
            locktime: tx.lock_time.to_consensus_u32().to_le_bytes(),
        }
    }
}

/// Outpoint referenced by one input of an input vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInput {
    pub outpoint_tx_hash: TxHash,
    pub outpoint_index: u32,
    /// Total encoded length of this input; add to the offset to reach the next one
    pub input_length: usize,
}

// ============================================================================
// Decoding
// ============================================================================

/// Read `len` bytes starting at `offset`
fn slice_at(data: &[u8], offset: usize, len: usize) -> CodecResult<&[u8]> {
    let end = offset.checked_add(len).ok_or(CodecError::Truncated {
        offset,
        needed: len,
        available: data.len().saturating_sub(offset),
    })?;
    data.get(offset..end).ok_or(CodecError::Truncated {
        offset,
        needed: len,
        available: data.len().saturating_sub(offset),
    })
}

/// Parse a compact-size integer.
///
/// Returns the value and the byte length of the encoding itself (1, 3, 5 or 9).
pub fn parse_var_int(data: &[u8]) -> CodecResult<(u64, usize)> {
    let tag = *data.first().ok_or(CodecError::EmptyVarInt)?;

    let width = match tag {
        0..=0xfc => return Ok((tag as u64, 1)),
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
    };

    let body = slice_at(data, 1, width)?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(body);
    Ok((u64::from_le_bytes(buf), 1 + width))
}

/// Parse a compact-size integer located at `offset`
fn var_int_at(data: &[u8], offset: usize) -> CodecResult<(u64, usize)> {
    match data.get(offset..) {
        Some(rest) => parse_var_int(rest),
        None => Err(CodecError::Truncated {
            offset,
            needed: 1,
            available: 0,
        }),
    }
}

/// Convert a decoded length to `usize` without silent truncation
fn as_len(value: u64, offset: usize, available: usize) -> CodecResult<usize> {
    usize::try_from(value).map_err(|_| CodecError::Truncated {
        offset,
        needed: usize::MAX,
        available,
    })
}

/// Parse the input starting at `offset` (which must point past the count prefix)
pub fn parse_input_at(vector: &[u8], offset: usize) -> CodecResult<ParsedInput> {
    let outpoint = slice_at(vector, offset, 36)?;

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&outpoint[..32]);

    let mut index = [0u8; 4];
    index.copy_from_slice(&outpoint[32..36]);

    let script_len_offset = offset + 36;
    let (script_len, prefix_len) = var_int_at(vector, script_len_offset)?;
    let script_len = as_len(script_len, script_len_offset, vector.len())?;

    // script + 4-byte sequence
    let input_length = 36 + prefix_len + script_len + 4;
    slice_at(vector, offset, input_length)?;

    Ok(ParsedInput {
        outpoint_tx_hash: TxHash(hash),
        outpoint_index: u32::from_le_bytes(index),
        input_length,
    })
}

/// Number of inputs declared by the vector and the offset of the first input
pub fn input_count(vector: &[u8]) -> CodecResult<(u64, usize)> {
    parse_var_int(vector)
}

/// Number of outputs declared by the vector
pub fn output_count(vector: &[u8]) -> CodecResult<u64> {
    parse_var_int(vector).map(|(count, _)| count)
}

/// Length of the output starting at `offset`
fn output_length_at(vector: &[u8], offset: usize) -> CodecResult<usize> {
    slice_at(vector, offset, 8)?;
    let (script_len, prefix_len) = var_int_at(vector, offset + 8)?;
    let script_len = as_len(script_len, offset + 8, vector.len())?;
    let len = 8 + prefix_len + script_len;
    slice_at(vector, offset, len)?;
    Ok(len)
}

/// Extract the full encoding (value + script) of the output at `index`
pub fn extract_output_at(vector: &[u8], index: u64) -> CodecResult<&[u8]> {
    let (count, mut offset) = parse_var_int(vector)?;
    if index >= count {
        return Err(CodecError::OutputIndexOutOfRange { index, count });
    }

    for _ in 0..index {
        offset += output_length_at(vector, offset)?;
    }

    let len = output_length_at(vector, offset)?;
    slice_at(vector, offset, len)
}

/// Walk every output and require the vector to end exactly after the last one
pub fn validate_output_vector(vector: &[u8]) -> CodecResult<u64> {
    let (count, mut offset) = parse_var_int(vector)?;
    for _ in 0..count {
        offset += output_length_at(vector, offset)?;
    }
    if offset != vector.len() {
        return Err(CodecError::TrailingBytes {
            trailing: vector.len() - offset,
        });
    }
    Ok(count)
}

/// Value in satoshis of an extracted output
pub fn extract_value(output: &[u8]) -> CodecResult<u64> {
    let raw = slice_at(output, 0, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(u64::from_le_bytes(buf))
}

/// Script pubkey of an extracted output
pub fn extract_script(output: &[u8]) -> CodecResult<&[u8]> {
    let (len, prefix_len) = var_int_at(output, 8)?;
    let len = as_len(len, 8, output.len())?;
    slice_at(output, 8 + prefix_len, len)
}

/// 20-byte hash locked by a P2WPKH or P2PKH output
pub fn extract_pubkey_hash(output: &[u8]) -> CodecResult<PubKeyHash> {
    let script = extract_script(output)?;

    let hash = match script {
        // OP_0 PUSH20 <hash>
        [0x00, 0x14, rest @ ..] if rest.len() == 20 => rest,
        // OP_DUP OP_HASH160 PUSH20 <hash> OP_EQUALVERIFY OP_CHECKSIG
        [0x76, 0xa9, 0x14, rest @ .., 0x88, 0xac] if rest.len() == 20 => rest,
        _ => return Err(CodecError::UnsupportedOutputScript),
    };

    let mut out = [0u8; 20];
    out.copy_from_slice(hash);
    Ok(PubKeyHash(out))
}
