#![doc(html_root_url = "https://docs.rs/devise-client/0.1.0")]
#![warn(rust_2018_idioms, missing_docs)]
#![deny(dead_code, unused_imports, unused_mut)]

//! Rust client library for the Devise data-rental marketplace: credentials
//! and signing (local keys, encrypted key files, Ledger hardware wallets),
//! Ethereum transaction building and submission, smart contract interfacing
//! and signed access to the rental web API.
//!
//! The library talks directly to an Ethereum node over JSON-RPC. Private
//! keys are only ever used locally to sign transactions and messages; they
//! are never transmitted.
//!
//! ## Usage
//!
//! Buy tokens, provision them into the rental contract and check the
//! escrow balance:
//!
//! ```no_run
//! use devise_client::client::TOKEN_PRECISION;
//! use devise_client::wallet::Credentials;
//! use devise_client::DeviseClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // The key file password is prompted for when a transaction
//!     // needs signing.
//!     let client = DeviseClient::builder()
//!         .network("rinkeby")
//!         .credentials(Credentials::new().key_file("/path/to/key-file.json"))
//!         .build()
//!         .await?;
//!
//!     client.buy_tokens(1_000 * TOKEN_PRECISION).await?;
//!     client.provision(1_000 * TOKEN_PRECISION).await?;
//!     println!("In escrow: {} micro-DVZ", client.escrow_balance().await?);
//!     Ok(())
//! }
//! ```
//!
//! A hardware wallet keeps the key on the device instead:
//!
//! ```no_run
//! use devise_client::wallet::{AuthKind, Credentials};
//! use devise_client::DeviseClient;
//!
//! # async fn connect() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = DeviseClient::builder()
//!     .network("rinkeby")
//!     .credentials(
//!         Credentials::new()
//!             .account("0x7567d83b7b8d80addcb281a71d54fc7b3364ffed".parse()?)
//!             .auth_kind(AuthKind::Ledger),
//!     )
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod address;
pub use address::{Address, AddressConvertible, PrivateKey, PublicKey};
pub mod apdu;
mod api;
pub mod client;
pub use client::{ClientBuilder, ClientError, DeviseClient, TransactionOutcome};
pub mod contracts;
pub mod keystore;
pub mod ledger;
pub mod network;
pub mod rental;
pub mod rlp;
mod token;
pub mod transactions;
mod utils;
pub use ethereum_types::{H256, U256};
pub use utils::{hash_message, keccak};
pub mod wallet;
