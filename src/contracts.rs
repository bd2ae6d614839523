//! Thin facade over the deployed smart contracts.
//!
//! Call data is encoded and decoded with [`ethabi`] against the trimmed ABI
//! documents shipped under `src/abi/`. The facade stays dumb on purpose: it
//! knows function names and types, while unit conversions and business rules
//! live with the operations that use them.

use crate::address::Address;
use crate::network::{AResult, CallRequest, EthNode};
use crate::rlp::Bytes;
use ethereum_types::U256;

pub use ethabi::Token;

/// ABI document for the rental contract.
pub const RENTAL_ABI: &[u8] = include_bytes!("abi/devise_rental.json");
/// ABI document for the token contract.
pub const TOKEN_ABI: &[u8] = include_bytes!("abi/devise_token.json");
/// ABI document for the token sale contract.
pub const TOKEN_SALE_ABI: &[u8] = include_bytes!("abi/devise_token_sale.json");

/// Decoding failures for contract responses.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum AbiError {
    /// Response tokens do not match the expected shape.
    UnexpectedShape(&'static str),
}

impl std::error::Error for AbiError {}
impl std::fmt::Display for AbiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedShape(what) => {
                write!(f, "Contract response does not match the ABI: expected {what}")
            }
        }
    }
}

/// One deployed contract bound to a node.
#[derive(Clone, Debug)]
pub struct Contract {
    /// On-chain address of the deployment.
    pub address: Address,
    abi: ethabi::Contract,
    node: EthNode,
}

impl Contract {
    pub fn new(node: EthNode, address: Address, abi_json: &[u8]) -> Result<Self, ethabi::Error> {
        //! Bind an ABI document to a deployed address.
        Ok(Self {
            address,
            abi: ethabi::Contract::load(abi_json)?,
            node,
        })
    }

    pub fn encode_call(&self, function: &str, args: &[Token]) -> AResult<Bytes> {
        //! ABI-encode a call to a named function.
        let encoded = self.abi.function(function)?.encode_input(args)?;
        Ok(encoded.into())
    }

    pub fn call_request(&self, function: &str, args: &[Token]) -> AResult<CallRequest> {
        //! Call parameters targeting this contract, ready for estimation,
        //! signing or read-only execution.
        Ok(CallRequest {
            to: Some(self.address),
            data: Some(self.encode_call(function, args)?),
            ..CallRequest::default()
        })
    }

    pub async fn call(
        &self,
        function: &str,
        args: &[Token],
        caller: Option<Address>,
    ) -> AResult<Vec<Token>> {
        //! Execute a read-only function and decode its outputs.
        //!
        //! `caller` populates `msg.sender` for view functions that depend
        //! on it.
        let mut request = self.call_request(function, args)?;
        request.from = caller;
        let raw = self.node.call(&request).await?;
        Ok(self.abi.function(function)?.decode_output(&raw)?)
    }
}

/// Deployed contract addresses for one network.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeployedContracts {
    /// The rental contract (proxy).
    pub rental: Address,
    /// The token contract.
    pub token: Address,
    /// The token sale contract.
    pub token_sale: Address,
}

impl DeployedContracts {
    pub fn for_network_id(network_id: &str) -> Option<Self> {
        //! Look up the deployment for a network id, [`None`] where the
        //! contracts are not deployed (the main network, pending audit).
        let (rental, token, token_sale) = match network_id {
            // rinkeby
            "4" => (
                "0xA3A5387cD8177BA3f5F47696988b1B51A3331CBF",
                "0xF60Ef7D51a4Beb501bFcB380E1abbF49C042Ec53",
                "0x7e50014E03535a14F844DF56dB4847254754Bb7B",
            ),
            // ganache
            "7778454" => (
                "0xca5c8dC7C604590214c835463B41bC2cbC6deEd5",
                "0xD2AB5fA56D6d571De4d4B6531aD6F9147ddf058D",
                "0x0987eE274279c6707535FaEE0e2135857f3c3291",
            ),
            // dev1.devisechain.io
            "777666" => (
                "0x30Ca3a0917ABC23C3b38A9993d84a14e12cd71Cd",
                "0xC1844bbe0537cE51F95F9EC08c55D697fCcf3f17",
                "0xA76068c461716d34499cA221A037Cedb39067e26",
            ),
            _ => return None,
        };
        Some(Self {
            rental: rental.parse().expect("static address is valid"),
            token: token.parse().expect("static address is valid"),
            token_sale: token_sale.parse().expect("static address is valid"),
        })
    }
}

pub(crate) fn expect_uint(token: Option<&Token>) -> Result<U256, AbiError> {
    match token {
        Some(Token::Uint(value)) => Ok(*value),
        _ => Err(AbiError::UnexpectedShape("uint")),
    }
}

pub(crate) fn expect_u64(token: Option<&Token>) -> Result<u64, AbiError> {
    let value = expect_uint(token)?;
    if value > U256::from(u64::MAX) {
        return Err(AbiError::UnexpectedShape("uint within u64 range"));
    }
    Ok(value.as_u64())
}

pub(crate) fn expect_address(token: Option<&Token>) -> Result<Address, AbiError> {
    match token {
        Some(Token::Address(value)) => Ok(Address::from(*value)),
        _ => Err(AbiError::UnexpectedShape("address")),
    }
}

pub(crate) fn expect_bool(token: Option<&Token>) -> Result<bool, AbiError> {
    match token {
        Some(Token::Bool(value)) => Ok(*value),
        _ => Err(AbiError::UnexpectedShape("bool")),
    }
}

pub(crate) fn expect_fixed_bytes(token: Option<&Token>) -> Result<Vec<u8>, AbiError> {
    match token {
        Some(Token::FixedBytes(value)) => Ok(value.clone()),
        _ => Err(AbiError::UnexpectedShape("fixed bytes")),
    }
}
