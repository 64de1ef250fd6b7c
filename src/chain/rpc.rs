//! Ethereum JSON-RPC transport.
//!
//! `unlocked` lets the node sign with an account it manages (local dev chain);
//! `signed` builds and signs legacy EIP-155 transactions locally and only needs
//! a plain RPC endpoint (public testnet).

use super::{
    abi::{self, keccak256},
    Address, AnchorEntry, ChainClient, Receipt,
};
use crate::{
    config::{ChainConfig, TransportKind},
    error::ChainError,
    utils::hex0x,
};

use anyhow::{bail, Context};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use reqwest::Client;
use rlp::RlpStream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

pub enum Transport {
    Unlocked { from: Address },
    Signed { key: SigningKey, from: Address, chain_id: u64 },
}

pub struct RpcChain {
    http:      Client,
    url:       String,
    contract:  Address,
    gas_limit: u64,
    timeout:   Duration,
    transport: Transport,
    ids:       AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error:  Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code:    i64,
    message: String,
}

/// Maps a node's error message onto transient / permanent classes.
pub fn classify_rpc_error(message: &str) -> ChainError {
    let m = message.to_ascii_lowercase();
    if ["nonce too low", "nonce too high", "already known", "replacement transaction underpriced"]
        .iter()
        .any(|p| m.contains(p))
    {
        ChainError::NonceRace(message.to_string())
    } else if m.contains("revert") {
        ChainError::Reverted(message.to_string())
    } else if ["invalid argument", "invalid params", "cannot unmarshal"]
        .iter()
        .any(|p| m.contains(p))
    {
        ChainError::Malformed(message.to_string())
    } else {
        ChainError::Unavailable(message.to_string())
    }
}

/// Hex quantity (`"0x1a"`) -> u64.
pub fn parse_quantity(v: &Value) -> Result<u64, ChainError> {
    let s = v
        .as_str()
        .ok_or_else(|| ChainError::Malformed(format!("expected hex quantity, got {v}")))?;
    let raw = s.strip_prefix("0x").unwrap_or(s);
    if raw.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(raw, 16)
        .map_err(|e| ChainError::Malformed(format!("bad quantity `{s}`: {e}")))
}

pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address(addr)
}

/// Pre-EIP-1559 transaction, replay-protected per EIP-155.
pub struct LegacyTx<'a> {
    pub nonce:     u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to:        Address,
    pub value:     u64,
    pub data:      &'a [u8],
}

/// Signature scalar as an RLP integer: big-endian without leading zeros.
fn scalar(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

impl LegacyTx<'_> {
    fn stream(&self, items: usize) -> RlpStream {
        let mut s = RlpStream::new_list(items);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        s.append(&self.to.0.to_vec());
        s.append(&self.value);
        s.append(&self.data.to_vec());
        s
    }

    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut s = self.stream(9);
        s.append(&chain_id);
        s.append(&0u8);
        s.append(&0u8);
        keccak256(&s.out())
    }

    /// Raw signed bytes for `eth_sendRawTransaction`.
    pub fn sign(&self, key: &SigningKey, chain_id: u64) -> Result<Vec<u8>, ChainError> {
        let hash = self.signing_hash(chain_id);
        let (sig, recid) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| ChainError::Malformed(format!("signing transaction: {e}")))?;
        let rs = sig.to_bytes();
        let v = chain_id * 2 + 35 + recid.to_byte() as u64;

        let mut s = self.stream(9);
        s.append(&v);
        s.append(&scalar(&rs[..32]));
        s.append(&scalar(&rs[32..]));
        Ok(s.out().to_vec())
    }
}

impl RpcChain {
    pub async fn connect(cfg: &ChainConfig) -> anyhow::Result<Self> {
        let contract: Address = cfg.contract_address
            .parse()
            .context("parsing chain.contract_address")?;
        let timeout = Duration::from_millis(cfg.rpc_timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;

        let mut chain = RpcChain {
            http,
            url: cfg.rpc_url.clone(),
            contract,
            gas_limit: cfg.gas_limit,
            timeout,
            transport: Transport::Unlocked { from: Address::default() },
            ids: AtomicU64::new(1),
        };

        chain.transport = match cfg.transport {
            TransportKind::Unlocked => {
                let from = cfg.sender_address
                    .as_deref()
                    .context("chain.sender_address is required for the unlocked transport")?
                    .parse()
                    .context("parsing chain.sender_address")?;
                Transport::Unlocked { from }
            }
            TransportKind::Signed => {
                let hex_key = std::env::var(&cfg.private_key_env)
                    .with_context(|| format!("reading private key from `{}`", cfg.private_key_env))?;
                let raw = hex::decode(hex_key.trim().trim_start_matches("0x"))
                    .context("decoding private key hex")?;
                let key = SigningKey::from_slice(&raw).context("invalid secp256k1 private key")?;
                let chain_id = match cfg.chain_id {
                    Some(id) => id,
                    None => parse_quantity(&chain.call("eth_chainId", json!([])).await?)?,
                };
                let from = address_of(&key);
                Transport::Signed { key, from, chain_id }
            }
            TransportKind::Memory => bail!("memory transport has no rpc client"),
        };

        tracing::info!(
            url      = %chain.url,
            contract = %chain.contract,
            sender   = %chain.sender(),
            "json-rpc chain client ready"
        );
        Ok(chain)
    }

    fn sender(&self) -> Address {
        match &self.transport {
            Transport::Unlocked { from } | Transport::Signed { from, .. } => *from,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "rpc call");

        let resp = self.http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout(self.timeout)
                } else {
                    ChainError::Unavailable(format!("{method}: {e}"))
                }
            })?;

        if resp.status().is_server_error() {
            return Err(ChainError::Unavailable(format!("{method}: http {}", resp.status())));
        }

        let decoded: RpcResponse = resp
            .json()
            .await
            .map_err(|e| ChainError::Malformed(format!("decoding {method} response: {e}")))?;

        if let Some(err) = decoded.error {
            debug!(method, code = err.code, message = %err.message, "rpc error");
            return Err(classify_rpc_error(&err.message));
        }
        Ok(decoded.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn log_transaction(&self, entry: &AnchorEntry) -> Result<String, ChainError> {
        let data = abi::encode_log_transaction(entry);

        let result = match &self.transport {
            Transport::Unlocked { from } => {
                self.call("eth_sendTransaction", json!([{
                    "from": from.to_string(),
                    "to":   self.contract.to_string(),
                    "gas":  format!("{:#x}", self.gas_limit),
                    "data": hex0x(&data),
                }]))
                .await?
            }
            Transport::Signed { key, from, chain_id } => {
                let nonce = parse_quantity(
                    &self.call("eth_getTransactionCount", json!([from.to_string(), "pending"])).await?,
                )?;
                let gas_price = parse_quantity(&self.call("eth_gasPrice", json!([])).await?)?;
                let raw = LegacyTx {
                    nonce,
                    gas_price,
                    gas_limit: self.gas_limit,
                    to:        self.contract,
                    value:     0,
                    data:      &data,
                }
                .sign(key, *chain_id)?;
                self.call("eth_sendRawTransaction", json!([hex0x(&raw)])).await?
            }
        };

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Malformed(format!("expected tx hash, got {result}")))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        let v = self.call("eth_getTransactionReceipt", json!([tx_hash])).await?;
        if v.is_null() {
            return Ok(None);
        }
        let field = |name: &str| parse_quantity(v.get(name).unwrap_or(&Value::Null));
        Ok(Some(Receipt {
            block_number: field("blockNumber")?,
            success:      field("status")? == 1,
            gas_used:     field("gasUsed")?,
        }))
    }

    async fn treasury_log_count(&self, treasury: &Address) -> Result<u64, ChainError> {
        let data = abi::encode_log_count(treasury);
        let v = self.call("eth_call", json!([
            { "to": self.contract.to_string(), "data": hex0x(&data) },
            "latest",
        ])).await?;
        let s = v
            .as_str()
            .ok_or_else(|| ChainError::Malformed(format!("expected hex data, got {v}")))?;
        let ret = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ChainError::Malformed(format!("eth_call result: {e}")))?;
        abi::decode_u64_word(&ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_node_errors() {
        assert!(matches!(classify_rpc_error("nonce too low"), ChainError::NonceRace(_)));
        assert!(matches!(classify_rpc_error("Already Known"), ChainError::NonceRace(_)));
        assert!(matches!(classify_rpc_error("execution reverted: paused"), ChainError::Reverted(_)));
        assert!(matches!(classify_rpc_error("invalid argument 0: hex string"), ChainError::Malformed(_)));
        assert!(matches!(classify_rpc_error("header not found"), ChainError::Unavailable(_)));
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity(&json!("0x1a")).unwrap(), 26);
        assert_eq!(parse_quantity(&json!("0x")).unwrap(), 0);
        assert!(parse_quantity(&json!(12)).is_err());
        assert!(parse_quantity(&json!("0xzz")).is_err());
    }

    #[test]
    fn address_of_known_key() {
        let mut raw = [0u8; 32];
        raw[31] = 1;
        let key = SigningKey::from_slice(&raw).unwrap();
        assert_eq!(
            address_of(&key).to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn legacy_signature_recovers_sender() {
        use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let tx = LegacyTx {
            nonce:     3,
            gas_price: 1_000_000_000,
            gas_limit: 100_000,
            to:        Address([0x55; 20]),
            value:     0,
            data:      &[0xde, 0xad],
        };
        let raw = tx.sign(&key, 11155111).unwrap();
        assert_eq!(raw, tx.sign(&key, 11155111).unwrap()); // RFC 6979
        assert!(raw[0] >= 0xc0);

        let hash = tx.signing_hash(11155111);
        let (sig, recid): (Signature, RecoveryId) = key.sign_prehash_recoverable(&hash).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&hash, &sig, recid).unwrap();
        assert_eq!(&recovered, key.verifying_key());
    }

    #[test]
    fn eip155_reference_transaction() {
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        let tx = LegacyTx {
            nonce:     9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to:        Address([0x35; 20]),
            value:     1_000_000_000_000_000_000,
            data:      &[],
        };
        assert_eq!(
            hex::encode(tx.signing_hash(1)),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
        assert_eq!(
            hex::encode(tx.sign(&key, 1).unwrap()),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a7640000\
             8025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f\
             761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn signature_scalars_drop_leading_zeros() {
        assert_eq!(scalar(&[0, 0, 1, 0]), vec![1, 0]);
        assert!(scalar(&[0; 4]).is_empty());
    }
}
