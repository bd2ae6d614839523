//! The Devise client: wallet, node and contracts wired together.

use crate::address::Address;
use crate::contracts::{Contract, DeployedContracts, RENTAL_ABI, TOKEN_ABI, TOKEN_SALE_ABI};
use crate::keystore::PasswordPrompt;
use crate::ledger::{DeviceTransport, HidTransport};
use crate::network::{AResult, CallRequest, EthNode, PollPolicy, TransactionReceipt};
use crate::transactions::Transaction;
use crate::wallet::{Credentials, Wallet};
use ethereum_types::U256;
use reqwest::Url;

/// Gas limit placeholder used while the real estimate is not known yet.
pub const GAS_PLACEHOLDER: u64 = 4_000_000;
/// Safety margin added on top of the network gas estimate.
pub const GAS_BUFFER: u64 = 100_000;
/// Token amounts are accounted in millionths of a DVZ.
pub const TOKEN_PRECISION: u64 = 1_000_000;
/// Wei per ether.
pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Default root of the rental web API.
pub const DEFAULT_API_ROOT: &str = "https://api.pit.ai";

/// Client-level failures that are not wallet, node or device faults.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ClientError {
    /// The contracts are not deployed on the connected network.
    ContractsNotDeployed(String),
    /// The escrow balance cannot cover the requested bid.
    InsufficientEscrow {
        /// Tokens needed for the bid, in micro-DVZ.
        required: U256,
        /// Tokens currently provisioned, in micro-DVZ.
        available: u64,
    },
    /// The purchase is below the sale's minimum order.
    BelowMinimumOrder {
        /// Minimal purchase in micro-DVZ.
        minimum_tokens: u64,
        /// Minimal purchase in wei.
        minimum_wei: U256,
    },
}

impl std::error::Error for ClientError {}
impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContractsNotDeployed(network_id) => write!(
                f,
                "The smart contracts are not deployed on network {network_id}. \
                 They will be available on the main network after the security audit."
            ),
            Self::InsufficientEscrow {
                required,
                available,
            } => write!(
                f,
                "Insufficient provisioned token balance: the bid needs {required} micro-DVZ \
                 but only {available} are in escrow. Please provision enough tokens to cover \
                 limit price * number of seats * total incremental usefulness."
            ),
            Self::BelowMinimumOrder {
                minimum_tokens,
                minimum_wei,
            } => write!(
                f,
                "Purchase is below the minimal order of {minimum_tokens} micro-DVZ \
                 ({minimum_wei} wei)"
            ),
        }
    }
}

/// Result of a submitted transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionOutcome {
    /// Hash the transaction was submitted under.
    pub transaction_hash: U256,
    /// Receipt collected once the transaction was mined.
    pub receipt: TransactionReceipt,
}

impl TransactionOutcome {
    /// Did the transaction execute without reverting?
    pub fn is_successful(&self) -> bool {
        self.receipt.is_successful()
    }
}

pub(crate) struct ContractSet {
    pub rental: Contract,
    pub token: Contract,
    pub token_sale: Contract,
}

impl ContractSet {
    pub(crate) fn load(node: &EthNode, deployed: DeployedContracts) -> AResult<Self> {
        Ok(Self {
            rental: Contract::new(node.clone(), deployed.rental, RENTAL_ABI)?,
            token: Contract::new(node.clone(), deployed.token, TOKEN_ABI)?,
            token_sale: Contract::new(node.clone(), deployed.token_sale, TOKEN_SALE_ABI)?,
        })
    }
}

/// A client for the data-rental marketplace.
///
/// Construct one through [`DeviseClient::builder`]. Read operations work
/// with any wallet; transacting operations need a wallet that can sign.
pub struct DeviseClient<T: DeviceTransport = HidTransport> {
    pub(crate) wallet: Wallet<T>,
    pub(crate) node: EthNode,
    pub(crate) contracts: ContractSet,
    pub(crate) poll: PollPolicy,
    pub(crate) api_root: String,
    pub(crate) chain_id: Option<u64>,
}

/// Configuration collected before connecting.
#[derive(Default)]
pub struct ClientBuilder {
    node_url: Option<Url>,
    network: Option<String>,
    credentials: Credentials,
    poll: Option<PollPolicy>,
    api_root: Option<String>,
    contracts: Option<DeployedContracts>,
    prompt: Option<Box<dyn PasswordPrompt>>,
}

impl DeviseClient<HidTransport> {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl ClientBuilder {
    /// Connect to a specific node endpoint.
    pub fn node_url(mut self, url: Url) -> Self {
        self.node_url = Some(url);
        self
    }
    /// Connect to a network known by name (mainnet, rinkeby, dev1, dev2,
    /// ganache).
    pub fn network<S: Into<String>>(mut self, name: S) -> Self {
        self.network = Some(name.into());
        self
    }
    /// Signing credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
    /// Receipt polling behavior.
    pub fn poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = Some(poll);
        self
    }
    /// Root URL of the rental web API.
    pub fn api_root<S: Into<String>>(mut self, root: S) -> Self {
        self.api_root = Some(root.into());
        self
    }
    /// Contract addresses, overriding the per-network address book.
    pub fn deployed_contracts(mut self, contracts: DeployedContracts) -> Self {
        self.contracts = Some(contracts);
        self
    }
    /// Password source for key file decryption.
    pub fn password_prompt(mut self, prompt: Box<dyn PasswordPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub async fn build(self) -> AResult<DeviseClient> {
        //! Resolve credentials, connect to the node and bind the contracts.
        let node = match (self.node_url, self.network) {
            (Some(url), _) => EthNode::with_url(url),
            (None, Some(name)) => EthNode::for_network(&name)?,
            (None, None) => {
                let name =
                    std::env::var("ETHEREUM_NETWORK").unwrap_or_else(|_| "mainnet".to_string());
                EthNode::for_network(&name)?
            }
        };

        match node.known_network() {
            Some("MAINNET") => tracing::warn!(
                "connected to the main Ethereum network, all transactions are final"
            ),
            Some(name) => tracing::info!(network = name, "connected to an Ethereum network"),
            None => tracing::warn!(
                url = %node.base_url,
                "connected to a custom Ethereum node, all transactions are final"
            ),
        }

        let mut wallet = Wallet::resolve(self.credentials).await?;
        if let Some(prompt) = self.prompt {
            wallet = wallet.with_prompt(prompt);
        }

        let network_id = node.network_id().await;
        let deployed = match self.contracts {
            Some(deployed) => deployed,
            None => DeployedContracts::for_network_id(&network_id)
                .ok_or_else(|| ClientError::ContractsNotDeployed(network_id.clone()))?,
        };

        let contracts = ContractSet::load(&node, deployed)?;
        Ok(DeviseClient {
            wallet,
            node,
            contracts,
            poll: self.poll.unwrap_or_default(),
            api_root: self
                .api_root
                .or_else(|| std::env::var("API_ROOT_URL").ok())
                .unwrap_or_else(|| DEFAULT_API_ROOT.to_string()),
            chain_id: network_id.parse().ok(),
        })
    }
}

pub(crate) fn buffered_gas_limit(estimate: u64) -> u64 {
    estimate.saturating_add(GAS_BUFFER)
}

pub(crate) fn effective_gas_price(network_price: U256, price_override: Option<U256>) -> U256 {
    price_override.unwrap_or(network_price)
}

impl<T: DeviceTransport> DeviseClient<T> {
    /// The address this client acts for.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// The node this client talks to.
    pub fn node(&self) -> &EthNode {
        &self.node
    }

    /// Can this client submit transactions?
    pub fn can_sign(&self) -> bool {
        self.wallet.can_sign()
    }

    pub(crate) async fn transact(&self, call: CallRequest) -> AResult<TransactionOutcome> {
        //! Build, sign, submit a state-changing call and wait for its
        //! receipt.
        //!
        //! Key material is resolved up front: a watch-only wallet or a bad
        //! key file password fails before the first node query. A gas price
        //! set on `call` overrides the network suggestion, but only after
        //! the estimation ran with the network price. The caller address
        //! never becomes part of the signed payload.
        let signer = self.wallet.signer()?;
        let address = self.address();
        let nonce = self.node.transaction_count(&address).await?;
        let network_price = self.node.gas_price().await?;

        let estimation = CallRequest {
            from: Some(address),
            gas: Some(GAS_PLACEHOLDER),
            gas_price: Some(network_price),
            ..call.clone()
        };
        let gas = buffered_gas_limit(self.node.estimate_gas(&estimation).await?);
        let gas_price = effective_gas_price(network_price, call.gas_price);

        let tx = Transaction {
            nonce,
            gas_price,
            gas,
            to: call.to,
            value: call.value.unwrap_or_default(),
            data: call.data.unwrap_or_default(),
            chain_id: self.chain_id,
            signature: None,
        };
        let signed = signer.sign_transaction(&tx).await?;
        let raw = signed.signed_rlp()?;

        let transaction_hash = self.node.send_raw_transaction(&raw).await?;
        tracing::info!(
            transaction_hash = format!("0x{transaction_hash:064x}"),
            "submitted transaction, waiting for the receipt"
        );
        let receipt = self.node.wait_for_receipt(transaction_hash, &self.poll).await?;
        tracing::info!(
            gas_used = receipt.gas_used,
            successful = receipt.is_successful(),
            "transaction mined"
        );
        Ok(TransactionOutcome {
            transaction_hash,
            receipt,
        })
    }

    pub async fn transfer_ether(&self, to: Address, wei: U256) -> AResult<TransactionOutcome> {
        //! Send plain ether to another address.
        self.transact(CallRequest {
            to: Some(to),
            value: Some(wei),
            ..CallRequest::default()
        })
        .await
    }

    pub async fn eth_balance(&self) -> AResult<U256> {
        //! Ether balance of the current account, in wei.
        self.node.balance(&self.address()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{generate_account_in, KeystoreError};
    use crate::wallet::WalletError;
    use tempfile::TempDir;

    #[test]
    fn test_gas_buffer_is_constant() {
        assert_eq!(buffered_gas_limit(21_000), 121_000);
        assert_eq!(buffered_gas_limit(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_gas_price_override_wins() {
        let network = U256::from(20_000_000_000u64);
        assert_eq!(effective_gas_price(network, None), network);
        let fixed = U256::from(1_000_000_000u64);
        assert_eq!(effective_gas_price(network, Some(fixed)), fixed);
    }

    /// Client wired to a dead node, so any accidental RPC surfaces as a
    /// connection error instead of the expected credential error.
    fn offline_client(credentials: Credentials) -> DeviseClient<HidTransport> {
        let node = EthNode::with_url("http://127.0.0.1:9".parse().unwrap());
        let deployed = DeployedContracts::for_network_id("4").unwrap();
        let contracts = ContractSet::load(&node, deployed).unwrap();
        DeviseClient {
            wallet: Wallet::resolve_local(credentials, Vec::new()).unwrap(),
            node,
            contracts,
            poll: PollPolicy::default(),
            api_root: DEFAULT_API_ROOT.to_string(),
            chain_id: Some(4),
        }
    }

    #[tokio::test]
    async fn test_watch_only_fails_before_any_node_query() {
        let client = offline_client(
            Credentials::new()
                .account("0x7567d83b7b8d80addcb281a71d54fc7b3364ffed".parse().unwrap()),
        );
        let err = client
            .transfer_ether(Address::ZERO, U256::from(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WalletError>(),
            Some(WalletError::WatchOnly(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_preset_password_fails_before_any_node_query() {
        let dir = TempDir::new().unwrap();
        let (path, _) = generate_account_in(dir.path(), "pw").unwrap();
        let client =
            offline_client(Credentials::new().key_file(&path).password("nope"));
        let err = client
            .transfer_ether(Address::ZERO, U256::from(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WalletError>(),
            Some(WalletError::Keystore(KeystoreError::WrongPassword))
        ));
    }
}
