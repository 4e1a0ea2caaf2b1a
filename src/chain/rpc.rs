use std::sync::{atomic::{AtomicU64, Ordering}, Arc};

use serde_json::{json, Value};
use thiserror::Error;

use crate::{AppError, GetField};

/// Wallet error for "unrecognized chain"; the network has to be added first.
pub const UNKNOWN_CHAIN: i64 = 4902;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("node unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message} (code {code})")]
    Node { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(err) => {
                tracing::warn!("blockchain node unreachable: {err}");
                AppError::Unavailable("Blockchain node is unreachable".to_owned())
            }
            // reverts and wallet refusals are the caller's to fix
            RpcError::Node { message, .. } => AppError::Rejected(message),
            RpcError::Malformed(msg) => AppError::Internal(anyhow::anyhow!("malformed rpc response: {msg}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        tracing::debug!(%method, id, "rpc request");
        let response: Value = self.http.post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        parse_response(response)
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        parse_quantity(&self.request("eth_chainId", json!([])).await?)
    }

    pub async fn accounts(&self) -> Result<Vec<String>, RpcError> {
        let accounts = self.request("eth_accounts", json!([])).await?;
        serde_json::from_value(accounts).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    pub async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let result = self.request("eth_call", json!([{ "to": to, "data": hex_data(data) }, "latest"])).await?;
        parse_data(&result)
    }

    pub async fn send_transaction(&self, from: &str, to: &str, data: &[u8]) -> Result<String, RpcError> {
        let result = self.request("eth_sendTransaction", json!([{ "from": from, "to": to, "data": hex_data(data) }])).await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| RpcError::Malformed(format!("expected transaction hash, got {result}")))
    }

    pub async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, RpcError> {
        let result = self.request("eth_getTransactionReceipt", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }

    /// Asks the wallet to switch to `chain_id`, adding the network when it does not know it.
    pub async fn switch_network(&self, chain_id: u64, network_name: &str, rpc_url: &str) -> Result<(), RpcError> {
        let chain_id_hex = format!("0x{chain_id:x}");
        match self.request("wallet_switchEthereumChain", json!([{ "chainId": chain_id_hex }])).await {
            Ok(_) => Ok(()),
            Err(RpcError::Node { code: UNKNOWN_CHAIN, .. }) => {
                tracing::info!(chain_id, "adding network to wallet");
                self.request("wallet_addEthereumChain", json!([{
                    "chainId": chain_id_hex,
                    "chainName": network_name,
                    "rpcUrls": [rpc_url],
                    "nativeCurrency": { "name": "Ethereum", "symbol": "ETH", "decimals": 18 },
                }])).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

pub fn parse_response(mut response: Value) -> Result<Value, RpcError> {
    if let Ok(error) = response.get_obj_field("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get_str_field("message")
            .unwrap_or_else(|_| "unknown rpc error".to_owned());
        return Err(RpcError::Node { code, message });
    }

    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcError::Malformed(format!("no result in {response}"))),
    }
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub fn parse_quantity(value: &Value) -> Result<u64, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::Malformed(format!("expected hex quantity, got {value}")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Malformed(format!("quantity {text:?} is missing 0x")))?;
    u64::from_str_radix(if digits.is_empty() { "0" } else { digits }, 16)
        .map_err(|e| RpcError::Malformed(format!("quantity {text:?}: {e}")))
}

pub fn parse_data(value: &Value) -> Result<Vec<u8>, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::Malformed(format!("expected hex data, got {value}")))?;
    hex::decode(text.trim_start_matches("0x")).map_err(|e| RpcError::Malformed(format!("data {text:?}: {e}")))
}

fn parse_receipt(value: &Value) -> Result<Receipt, RpcError> {
    let field = |name: &str| {
        value
            .get_str_field(name)
            .map_err(|e| RpcError::Malformed(e.to_string()))
    };

    Ok(Receipt {
        transaction_hash: field("transactionHash")?,
        block_number: parse_quantity(&Value::String(field("blockNumber")?))?,
        success: parse_quantity(&Value::String(field("status")?))? == 1,
    })
}
