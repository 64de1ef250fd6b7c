//! Contract calldata encoding.

use super::{Address, AnchorEntry};
use crate::error::ChainError;

use sha3::{Digest, Keccak256};

pub const LOG_TRANSACTION_SIG: &str = "logTransaction(address,uint256,bool,bytes32)";
pub const LOG_COUNT_SIG:       &str = "getTreasuryLogCount(address)";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(data);
    h.finalize().into()
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn word_address(a: &Address) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[12..].copy_from_slice(&a.0);
    w
}

fn word_u64(v: u64) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[24..].copy_from_slice(&v.to_be_bytes());
    w
}

/// `logTransaction(treasury, amount, isIncome, detailHash)` calldata.
pub fn encode_log_transaction(entry: &AnchorEntry) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * 4);
    data.extend_from_slice(&selector(LOG_TRANSACTION_SIG));
    data.extend_from_slice(&word_address(&entry.treasury));
    data.extend_from_slice(&word_u64(entry.amount));
    data.extend_from_slice(&word_u64(entry.is_income as u64));
    data.extend_from_slice(&entry.detail_hash);
    data
}

pub fn encode_log_count(treasury: &Address) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&selector(LOG_COUNT_SIG));
    data.extend_from_slice(&word_address(treasury));
    data
}

/// Reads a uint256 return word, refusing values that do not fit in u64.
pub fn decode_u64_word(ret: &[u8]) -> Result<u64, ChainError> {
    if ret.len() != 32 {
        return Err(ChainError::Malformed(format!("expected 32-byte word, got {} bytes", ret.len())));
    }
    if ret[..24].iter().any(|b| *b != 0) {
        return Err(ChainError::Malformed("uint256 does not fit in u64".into()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&ret[24..]);
    Ok(u64::from_be_bytes(tail))
}
