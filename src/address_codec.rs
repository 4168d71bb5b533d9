//! Stacks <-> Bridge Recipient Address Encoding
//!
//! The xReserve `depositToRemote` call takes the remote recipient as a
//! `bytes32`. Stacks principals are c32check strings, so they have to be
//! unpacked into their version byte and hash160 first.
//!
//! ## Bridge Recipient Format
//!
//! ```text
//! | Zero (11 bytes) | Version (1 byte) | Hash160 (20 bytes) |
//! ```
//!
//! ## Stacks Version Bytes
//!
//! - `SP` -> 22: mainnet single-sig
//! - `SM` -> 20: mainnet multi-sig
//! - `ST` -> 26: testnet single-sig
//! - `SN` -> 21: testnet multi-sig
//!
//! The reverse direction (Stacks -> Ethereum, used by the USDCx `burn` call)
//! only needs the raw 20 bytes of the Ethereum address.

use sha2::{Digest, Sha256};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Crockford-style base32 alphabet used by c32check (no I, L, O, U)
pub const C32_ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Version byte for mainnet single-sig addresses (`SP...`)
pub const VERSION_MAINNET_SINGLE_SIG: u8 = 22;

/// Version byte for mainnet multi-sig addresses (`SM...`)
pub const VERSION_MAINNET_MULTI_SIG: u8 = 20;

/// Version byte for testnet single-sig addresses (`ST...`)
pub const VERSION_TESTNET_SINGLE_SIG: u8 = 26;

/// Version byte for testnet multi-sig addresses (`SN...`)
pub const VERSION_TESTNET_MULTI_SIG: u8 = 21;

/// Length of the bridge recipient encoding
pub const BRIDGE_ADDRESS_LEN: usize = 32;

/// Offset of the version byte inside the bridge recipient
pub const VERSION_OFFSET: usize = 11;

/// Offset of the hash160 inside the bridge recipient
pub const HASH_OFFSET: usize = 12;

const HASH160_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;

// ============================================================================
// Errors and Policies
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown address prefix: {0}")]
    UnknownPrefix(String),

    #[error("Invalid c32 character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("Address body decodes to no bytes")]
    EmptyBody,

    #[error("Unexpected decoded length: expected {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("Checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("Invalid EVM address: {0}")]
    InvalidEvmAddress(String),
}

/// How the c32 decoder treats characters outside the alphabet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Reject any character outside the alphabet
    #[default]
    Strict,
    /// Skip characters outside the alphabet (legacy dashboard behavior)
    Lenient,
}

/// Whether the trailing c32check checksum is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Take the first 20 decoded bytes and discard the rest unverified.
    ///
    /// Leading zero bytes of the hash160 are lost by the plain numeric
    /// decode, so addresses whose hash starts with `0x00` come out shifted.
    Unchecked,
    /// Decode with c32check semantics and verify the double-SHA256 checksum
    #[default]
    Verified,
}

// ============================================================================
// c32 Decoding
// ============================================================================

fn c32_value(c: char) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    C32_ALPHABET
        .bytes()
        .position(|b| b as char == upper)
        .map(|p| p as u8)
}

/// Decode a c32 string into big-endian bytes.
///
/// The string is read as a base-32 numeral. Digits are accumulated into a
/// little-endian buffer by multiply-and-carry, then reversed. Leading zero
/// digits contribute nothing, so empty input (or, in lenient mode, input with
/// no valid characters) yields an empty vector. Callers must treat that as a
/// failure, not as a zero address.
pub fn c32_decode(input: &str, mode: DecodeMode) -> Result<Vec<u8>, CodecError> {
    let mut bytes: Vec<u8> = Vec::new();

    for (position, character) in input.chars().enumerate() {
        let value = match c32_value(character) {
            Some(v) => v,
            None => match mode {
                DecodeMode::Lenient => continue,
                DecodeMode::Strict => {
                    return Err(CodecError::InvalidCharacter {
                        character,
                        position,
                    })
                }
            },
        };

        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 32;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    bytes.reverse();
    Ok(bytes)
}

/// Lenient decode that never fails; invalid characters are skipped.
pub fn c32_decode_lenient(input: &str) -> Vec<u8> {
    c32_decode(input, DecodeMode::Lenient).unwrap_or_default()
}

/// c32check body decode: each leading `0` digit stands for one zero byte.
fn c32check_decode(body: &str, mode: DecodeMode) -> Result<Vec<u8>, CodecError> {
    let filtered: String = match mode {
        DecodeMode::Strict => body.to_string(),
        DecodeMode::Lenient => body.chars().filter(|c| c32_value(*c).is_some()).collect(),
    };

    let leading_zeros = filtered.chars().take_while(|c| *c == '0').count();
    let mut bytes = vec![0u8; leading_zeros];
    bytes.extend(c32_decode(&filtered[leading_zeros..], mode)?);
    Ok(bytes)
}

fn c32_checksum(version: u8, hash160: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    hasher.update(hash160);
    let first = hasher.finalize();
    let second = Sha256::digest(first);

    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&second[..CHECKSUM_LEN]);
    checksum
}

// ============================================================================
// Stacks -> Bridge Recipient
// ============================================================================

/// Map a two-character Stacks address prefix to its version byte
pub fn version_for_prefix(prefix: &str) -> Result<u8, CodecError> {
    match prefix {
        "SP" => Ok(VERSION_MAINNET_SINGLE_SIG),
        "SM" => Ok(VERSION_MAINNET_MULTI_SIG),
        "ST" => Ok(VERSION_TESTNET_SINGLE_SIG),
        "SN" => Ok(VERSION_TESTNET_MULTI_SIG),
        other => Err(CodecError::UnknownPrefix(other.to_string())),
    }
}

/// Encode a Stacks address into the 32-byte xReserve recipient format.
///
/// The output is always exactly 32 bytes: zeros, the version byte at offset
/// 11 and the hash160 at offsets 12..32.
pub fn stacks_address_to_bytes32(
    address: &str,
    mode: DecodeMode,
    checksum: ChecksumPolicy,
) -> Result<[u8; BRIDGE_ADDRESS_LEN], CodecError> {
    let prefix = address.get(..2).unwrap_or(address);
    let version = version_for_prefix(prefix)?;
    let body = &address[prefix.len()..];

    let hash160 = match checksum {
        ChecksumPolicy::Unchecked => {
            let decoded = c32_decode(body, mode)?;
            if decoded.is_empty() {
                return Err(CodecError::EmptyBody);
            }
            // Short bodies leave the tail of the hash zero-filled
            let mut hash = [0u8; HASH160_LEN];
            let take = decoded.len().min(HASH160_LEN);
            hash[..take].copy_from_slice(&decoded[..take]);
            hash
        }
        ChecksumPolicy::Verified => verified_hash160(version, body, mode)?,
    };

    let mut result = [0u8; BRIDGE_ADDRESS_LEN];
    result[VERSION_OFFSET] = version;
    result[HASH_OFFSET..].copy_from_slice(&hash160);
    Ok(result)
}

fn verified_hash160(
    version: u8,
    body: &str,
    mode: DecodeMode,
) -> Result<[u8; HASH160_LEN], CodecError> {
    let decoded = c32check_decode(body, mode)?;
    if decoded.is_empty() {
        return Err(CodecError::EmptyBody);
    }
    if decoded.len() != HASH160_LEN + CHECKSUM_LEN {
        return Err(CodecError::BadLength {
            expected: HASH160_LEN + CHECKSUM_LEN,
            got: decoded.len(),
        });
    }

    let (hash, expected) = decoded.split_at(HASH160_LEN);
    let computed = c32_checksum(version, hash);
    if expected != computed {
        return Err(CodecError::ChecksumMismatch {
            expected: hex::encode(expected),
            computed: hex::encode(computed),
        });
    }

    let mut hash160 = [0u8; HASH160_LEN];
    hash160.copy_from_slice(hash);
    Ok(hash160)
}

/// Encode a bridge recipient the way production submissions must:
/// strict alphabet, verified checksum.
pub fn encode_stacks_recipient(address: &str) -> Result<[u8; BRIDGE_ADDRESS_LEN], CodecError> {
    stacks_address_to_bytes32(address, DecodeMode::Strict, ChecksumPolicy::Verified)
}

/// Format 32 bytes as a 0x-prefixed hex string
pub fn bytes32_to_hex(bytes: &[u8; BRIDGE_ADDRESS_LEN]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================================================
// Ethereum -> Burn Recipient
// ============================================================================

/// Parse a 0x-prefixed Ethereum address into its 20 raw bytes
pub fn eth_address_to_bytes(address: &str) -> Result<[u8; 20], CodecError> {
    let hex_str = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);

    if hex_str.len() != 40 {
        return Err(CodecError::InvalidEvmAddress(format!(
            "expected 40 hex chars, got {}",
            hex_str.len()
        )));
    }

    let bytes =
        hex::decode(hex_str).map_err(|e| CodecError::InvalidEvmAddress(e.to_string()))?;

    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}
