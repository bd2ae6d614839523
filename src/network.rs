//! Module for interacting with Ethereum node JSON-RPC APIs.

use crate::address::Address;
use crate::rlp::Bytes;
use crate::utils::unhex;
use ethereum_types::U256;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// Generic result of all asynchronous calls in this module.
pub type AResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Node-level errors (not related to HTTP failures).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The node rejected the call.
    RpcError {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable description from the node.
        message: String,
    },
    /// The node answered without a result payload.
    EmptyResult,
    /// No known node for the requested network name.
    UnsupportedNetwork(String),
    /// Receipt polling gave up.
    ReceiptTimeout,
}

impl std::error::Error for ValidationError {}
impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RpcError { code, message } => {
                write!(f, "Node returned error {code}: ")?;
                f.write_str(message.strip_suffix('\n').unwrap_or(message))
            }
            Self::EmptyResult => f.write_str("Node returned neither result nor error"),
            Self::UnsupportedNetwork(name) => write!(f, "Unsupported network {name:?}"),
            Self::ReceiptTimeout => f.write_str("Gave up waiting for the transaction receipt"),
        }
    }
}

/// A simple JSON-RPC client for an Ethereum node.
#[derive(Clone, Debug)]
pub struct EthNode {
    /// Node RPC endpoint.
    pub base_url: Url,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Call parameters for `eth_call` and `eth_estimateGas`.
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CallRequest {
    /// Caller address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Recipient; [`None`] for contract deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    /// Gas limit.
    #[serde_as(as = "Option<unhex::HexNum>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Gas price in wei.
    #[serde_as(as = "Option<unhex::HexNum>")]
    #[serde(rename = "gasPrice", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    /// Transferred wei.
    #[serde_as(as = "Option<unhex::HexNum>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    /// Call data.
    #[serde_as(as = "Option<unhex::Hex>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

/// Receipt of a mined transaction.
#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction hash.
    #[serde_as(as = "unhex::HexHash")]
    #[serde(rename = "transactionHash")]
    pub transaction_hash: U256,
    /// Number of the containing block.
    #[serde_as(as = "Option<unhex::HexNum>")]
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<u64>,
    /// Gas consumed by this transaction.
    #[serde_as(as = "unhex::HexNum")]
    #[serde(rename = "gasUsed")]
    pub gas_used: u64,
    /// Execution status: 1 for success, 0 for revert. Pre-Byzantium nodes
    /// omit it.
    #[serde_as(as = "Option<unhex::HexNum>")]
    #[serde(default)]
    pub status: Option<u64>,
    /// Deployed contract address, for deployment transactions.
    #[serde(rename = "contractAddress", default)]
    pub contract_address: Option<Address>,
}

impl TransactionReceipt {
    pub fn is_successful(&self) -> bool {
        //! Did the transaction execute without reverting?
        //!
        //! A receipt without a status field counts as failed.
        self.status == Some(1)
    }
}

/// How to poll for a transaction receipt.
#[derive(Clone, Debug)]
pub struct PollPolicy {
    /// Delay between consecutive receipt queries.
    pub interval: Duration,
    /// Emit a warning whenever this much time passes without a receipt.
    pub warn_after: Duration,
    /// Give up after this many queries; [`None`] polls until mined.
    pub max_attempts: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            warn_after: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

pub async fn wait_for_receipt_with<F, Fut>(
    mut fetch: F,
    policy: &PollPolicy,
) -> AResult<TransactionReceipt>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AResult<Option<TransactionReceipt>>>,
{
    //! Poll `fetch` until it yields a receipt, pacing and bounding the
    //! attempts according to `policy`.
    //!
    //! Transient query failures are absorbed and count as attempts: a
    //! submitted transaction must not be lost to one dropped connection.
    let mut attempts: u64 = 0;
    let mut last_warning = tokio::time::Instant::now();
    loop {
        match fetch().await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "receipt query failed, retrying");
            }
        }
        attempts += 1;
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(ValidationError::ReceiptTimeout.into());
        }
        if last_warning.elapsed() >= policy.warn_after {
            tracing::warn!(attempts, "transaction not mined yet, still waiting for the receipt");
            last_warning = tokio::time::Instant::now();
        }
        tokio::time::sleep(policy.interval).await;
    }
}

impl EthNode {
    /// Public mainnet node.
    pub const MAINNET_URL: &'static str = "https://mainnet.infura.io/ZQl920lU4Wyl6vyrND55";
    /// Public rinkeby (testnet) node.
    pub const RINKEBY_URL: &'static str = "https://rinkeby.infura.io/ZQl920lU4Wyl6vyrND55";
    /// First development network node.
    pub const DEV1_URL: &'static str = "https://dev1.devisechain.io";
    /// Second development network node.
    pub const DEV2_URL: &'static str = "https://dev2.devisechain.io";
    /// Local development node.
    pub const GANACHE_URL: &'static str = "http://localhost:8545";

    pub fn mainnet() -> Self {
        //! Mainnet parameters.
        Self {
            base_url: Self::MAINNET_URL.parse().expect("static url is valid"),
        }
    }

    pub fn for_network(name: &str) -> Result<Self, ValidationError> {
        //! Node for a network known by name (case-insensitive).
        let url = match name.to_uppercase().as_str() {
            "MAINNET" => Self::MAINNET_URL,
            "RINKEBY" => Self::RINKEBY_URL,
            "DEV1" => Self::DEV1_URL,
            "DEV2" => Self::DEV2_URL,
            "GANACHE" => Self::GANACHE_URL,
            _ => return Err(ValidationError::UnsupportedNetwork(name.to_string())),
        };
        Ok(Self {
            base_url: url.parse().expect("static url is valid"),
        })
    }

    pub fn with_url(base_url: Url) -> Self {
        //! Node at a custom endpoint.
        Self { base_url }
    }

    /// Name of the known network this node serves, if any.
    pub fn known_network(&self) -> Option<&'static str> {
        let url = self.base_url.as_str();
        let url = url.strip_suffix('/').unwrap_or(url);
        match url {
            Self::MAINNET_URL => Some("MAINNET"),
            Self::RINKEBY_URL => Some("RINKEBY"),
            Self::DEV1_URL => Some("DEV1"),
            Self::DEV2_URL => Some("DEV2"),
            Self::GANACHE_URL => Some("GANACHE"),
            _ => None,
        }
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AResult<T> {
        let client = Client::new();
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };
        let response: RpcResponse<T> = client
            .post(self.base_url.clone())
            .json(&request)
            .send()
            .await?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(ValidationError::RpcError {
                code: error.code,
                message: error.message,
            }
            .into());
        }
        Ok(response.result.ok_or(ValidationError::EmptyResult)?)
    }

    /// Same as [`EthNode::rpc`] for methods where the node may answer
    /// `result: null`.
    async fn rpc_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AResult<Option<T>> {
        match self.rpc(method, params).await {
            Err(err)
                if err
                    .downcast_ref::<ValidationError>()
                    .is_some_and(|e| *e == ValidationError::EmptyResult) =>
            {
                Ok(None)
            }
            other => other.map(Some),
        }
    }

    pub async fn network_id(&self) -> String {
        //! Identifier of the network the node serves.
        //!
        //! An unreachable node is treated as mainnet, with a warning.
        match self.rpc::<String>("net_version", serde_json::json!([])).await {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(
                    "could not query the node for the current network, assuming mainnet"
                );
                "1".to_string()
            }
        }
    }

    pub async fn block_number(&self) -> AResult<u64> {
        //! Number of the latest mined block.
        let raw: String = self.rpc("eth_blockNumber", serde_json::json!([])).await?;
        Ok(u64::from_str_radix(
            raw.strip_prefix("0x").unwrap_or(&raw),
            16,
        )?)
    }

    pub async fn transaction_count(&self, address: &Address) -> AResult<U256> {
        //! Number of transactions ever sent from `address` (its next nonce).
        let raw: String = self
            .rpc(
                "eth_getTransactionCount",
                serde_json::json!([address.to_hex(), "latest"]),
            )
            .await?;
        Ok(U256::from_str_radix(
            raw.strip_prefix("0x").unwrap_or(&raw),
            16,
        )?)
    }

    pub async fn gas_price(&self) -> AResult<U256> {
        //! Current gas price suggested by the node, in wei.
        let raw: String = self.rpc("eth_gasPrice", serde_json::json!([])).await?;
        Ok(U256::from_str_radix(
            raw.strip_prefix("0x").unwrap_or(&raw),
            16,
        )?)
    }

    pub async fn balance(&self, address: &Address) -> AResult<U256> {
        //! Ether balance of `address`, in wei.
        let raw: String = self
            .rpc(
                "eth_getBalance",
                serde_json::json!([address.to_hex(), "latest"]),
            )
            .await?;
        Ok(U256::from_str_radix(
            raw.strip_prefix("0x").unwrap_or(&raw),
            16,
        )?)
    }

    pub async fn estimate_gas(&self, call: &CallRequest) -> AResult<u64> {
        //! Ask the node how much gas the call would consume.
        let raw: String = self
            .rpc("eth_estimateGas", serde_json::json!([call]))
            .await?;
        Ok(u64::from_str_radix(
            raw.strip_prefix("0x").unwrap_or(&raw),
            16,
        )?)
    }

    pub async fn call(&self, call: &CallRequest) -> AResult<Bytes> {
        //! Execute a read-only contract call without a transaction.
        let raw: String = self
            .rpc("eth_call", serde_json::json!([call, "latest"]))
            .await?;
        let body = raw.strip_prefix("0x").unwrap_or(&raw);
        let decoded: Vec<u8> = rustc_hex::FromHex::from_hex(body)?;
        Ok(decoded.into())
    }

    pub async fn send_raw_transaction(&self, raw: &Bytes) -> AResult<U256> {
        //! Broadcast a signed transaction; returns its hash.
        let body: String = rustc_hex::ToHex::to_hex(raw.as_ref());
        let raw: String = self
            .rpc(
                "eth_sendRawTransaction",
                serde_json::json!([format!("0x{body}")]),
            )
            .await?;
        Ok(U256::from_str_radix(
            raw.strip_prefix("0x").unwrap_or(&raw),
            16,
        )?)
    }

    pub async fn transaction_receipt(
        &self,
        transaction_hash: U256,
    ) -> AResult<Option<TransactionReceipt>> {
        //! Receipt of a transaction, [`None`] while it is not mined.
        self.rpc_optional(
            "eth_getTransactionReceipt",
            serde_json::json!([format!("0x{transaction_hash:064x}")]),
        )
        .await
    }

    pub async fn wait_for_receipt(
        &self,
        transaction_hash: U256,
        policy: &PollPolicy,
    ) -> AResult<TransactionReceipt> {
        //! Block until the transaction is mined and return its receipt.
        wait_for_receipt_with(
            || {
                let node = self.clone();
                async move { node.transaction_receipt(transaction_hash).await }
            },
            policy,
        )
        .await
    }
}
